use serde_json::json;
use tokio_postgres::{Client, Row, Statement};

use crate::api::{Book, BookDetails, BookDetailsPatch, BookId};
use crate::books_repository::{BookRepository, BookRepositoryError};
use crate::clock::now_millis;
use crate::postgres::{connect, PostgresConfig};
use crate::search::like_pattern;

const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            created_at      BIGINT NOT NULL,
            params          JSONB NOT NULL
            )
        ";

pub struct PostgresBooksRepository {
    client: Client,
}

impl PostgresBooksRepository {
    pub async fn init(config: &PostgresConfig) -> anyhow::Result<Self> {
        let client = connect(config, SCHEMA).await?;
        Ok(Self { client })
    }
}

fn book_from_row(row: &Row) -> Result<Book, BookRepositoryError> {
    let details: serde_json::Value = row.try_get(2)?;
    Ok(Book {
        book_id: row.try_get(0)?,
        created_at: row.try_get(1)?,
        details: serde_json::from_value(details)?,
    })
}

#[async_trait::async_trait]
impl BookRepository for PostgresBooksRepository {
    async fn add_book(&self, details: BookDetails) -> Result<BookId, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO books (created_at, params) VALUES ($1, $2) RETURNING id")
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&now_millis(), &json!(details)])
            .await?;

        let book_id: BookId = rows
            .first()
            .ok_or_else(|| BookRepositoryError::Other("Id not returned".to_string()))?
            .try_get(0)?;

        Ok(book_id)
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookDetailsPatch,
    ) -> Result<bool, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("UPDATE books SET params = params || ($1)::JSONB WHERE id = ($2) RETURNING id")
            .await?;

        let rows = self.client.query(&stmt, &[&json!(patch), &book_id]).await?;
        Ok(!rows.is_empty())
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, created_at, params FROM books WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;

        book_from_row(
            rows.first()
                .ok_or(BookRepositoryError::NotFound(book_id))?,
        )
    }

    async fn delete_book(&self, book_id: BookId) -> Result<bool, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = ($1)")
            .await?;
        Ok(self.client.execute(&stmt, &[&book_id]).await? > 0)
    }

    async fn search_books(&self, keyword: Option<&str>) -> Result<Vec<Book>, BookRepositoryError> {
        let rows = match keyword {
            Some(keyword) => {
                let stmt: Statement = self
                    .client
                    .prepare(
                        "SELECT id, created_at, params FROM books \
                         WHERE params->>'title' ILIKE ($1) OR params->'tags' ? ($2) \
                         ORDER BY created_at DESC, id DESC",
                    )
                    .await?;
                self.client
                    .query(&stmt, &[&like_pattern(keyword), &keyword])
                    .await?
            }
            None => {
                let stmt: Statement = self
                    .client
                    .prepare("SELECT id, created_at, params FROM books ORDER BY created_at DESC, id DESC")
                    .await?;
                self.client.query(&stmt, &[]).await?
            }
        };

        rows.iter().map(book_from_row).collect()
    }
}
