use std::collections::HashMap;

use tokio_postgres::{Client, Row, Statement};

use crate::api::{BookId, Review, ReviewId, Score, UpsertOutcome, UserId};
use crate::clock::now_millis;
use crate::postgres::{connect, PostgresConfig};
use crate::reviews_repository::{ReviewsRepository, ReviewsRepositoryError};
use crate::validation::ValidReview;

const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS reviews (
            id              SERIAL PRIMARY KEY,
            book_id         INTEGER NOT NULL,
            user_id         INTEGER NOT NULL,
            score           INTEGER NOT NULL,
            body            TEXT NOT NULL,
            created_at      BIGINT NOT NULL,
            UNIQUE (book_id, user_id)
            )
        ";

const REVIEW_COLUMNS: &str = "id, book_id, user_id, score, body, created_at";

pub struct PostgresReviewsRepository {
    client: Client,
}

impl PostgresReviewsRepository {
    pub async fn init(config: &PostgresConfig) -> anyhow::Result<Self> {
        let client = connect(config, SCHEMA).await?;
        Ok(Self { client })
    }
}

fn review_from_row(row: &Row) -> Result<Review, ReviewsRepositoryError> {
    Ok(Review {
        review_id: row.try_get(0)?,
        book_id: row.try_get(1)?,
        user_id: row.try_get(2)?,
        score: row.try_get(3)?,
        body: row.try_get(4)?,
        created_at: row.try_get(5)?,
    })
}

#[async_trait::async_trait]
impl ReviewsRepository for PostgresReviewsRepository {
    async fn upsert_review(
        &self,
        book_id: BookId,
        user_id: UserId,
        review: ValidReview,
    ) -> Result<UpsertOutcome, ReviewsRepositoryError> {
        // xmax is 0 only for freshly inserted rows
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO reviews (book_id, user_id, score, body, created_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (book_id, user_id) \
                 DO UPDATE SET score = EXCLUDED.score, body = EXCLUDED.body \
                 RETURNING id, (xmax = 0) AS inserted",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[&book_id, &user_id, &review.score, &review.body, &now_millis()],
            )
            .await?;

        let row = rows
            .first()
            .ok_or_else(|| ReviewsRepositoryError::Other("Id not returned".to_string()))?;

        Ok(UpsertOutcome {
            review_id: row.try_get(0)?,
            created: row.try_get(1)?,
        })
    }

    async fn get_review(&self, review_id: ReviewId) -> Result<Review, ReviewsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
            .await?;
        let rows = self.client.query(&stmt, &[&review_id]).await?;
        review_from_row(
            rows.first()
                .ok_or(ReviewsRepositoryError::NotFound(review_id))?,
        )
    }

    async fn delete_review(&self, review_id: ReviewId) -> Result<bool, ReviewsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM reviews WHERE id = $1")
            .await?;
        Ok(self.client.execute(&stmt, &[&review_id]).await? > 0)
    }

    async fn list_reviews(&self, book_id: BookId) -> Result<Vec<Review>, ReviewsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews WHERE book_id = $1 \
                 ORDER BY created_at DESC, id DESC"
            ))
            .await?;
        let rows = self.client.query(&stmt, &[&book_id]).await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn list_scores(
        &self,
        book_ids: &[BookId],
    ) -> Result<HashMap<BookId, Vec<Score>>, ReviewsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT book_id, score FROM reviews WHERE book_id = ANY($1)")
            .await?;
        let rows = self.client.query(&stmt, &[&book_ids]).await?;

        let mut scores: HashMap<BookId, Vec<Score>> = HashMap::new();
        for row in rows.iter() {
            let book_id: BookId = row.try_get(0)?;
            scores.entry(book_id).or_default().push(row.try_get(1)?);
        }
        Ok(scores)
    }

    async fn delete_reviews_of_book(&self, book_id: BookId) -> Result<u64, ReviewsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM reviews WHERE book_id = $1")
            .await?;
        Ok(self.client.execute(&stmt, &[&book_id]).await?)
    }
}
