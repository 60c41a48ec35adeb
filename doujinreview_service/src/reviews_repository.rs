use std::collections::HashMap;

pub use in_memory_reviews_repository::InMemoryReviewsRepository;
pub use postgres_reviews_repository::PostgresReviewsRepository;

use crate::api::{BookId, Review, ReviewId, Score, UpsertOutcome, UserId};
use crate::validation::ValidReview;

mod in_memory_reviews_repository;
mod postgres_reviews_repository;

#[derive(Debug, thiserror::Error)]
pub enum ReviewsRepositoryError {
    #[error("Review {0} not found")]
    NotFound(ReviewId),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait ReviewsRepository: Send + Sync {
    /// Stores the review of the user for the book.
    /// An existing review of the same user for the same book is overwritten in place.
    async fn upsert_review(
        &self,
        book_id: BookId,
        user_id: UserId,
        review: ValidReview,
    ) -> Result<UpsertOutcome, ReviewsRepositoryError>;

    async fn get_review(&self, review_id: ReviewId) -> Result<Review, ReviewsRepositoryError>;

    /// Returns false if the review was not found
    async fn delete_review(&self, review_id: ReviewId) -> Result<bool, ReviewsRepositoryError>;

    /// Reviews of the book, newest first
    async fn list_reviews(&self, book_id: BookId) -> Result<Vec<Review>, ReviewsRepositoryError>;

    /// Scores of all reviews of the given books. Books without reviews are absent from the map.
    async fn list_scores(
        &self,
        book_ids: &[BookId],
    ) -> Result<HashMap<BookId, Vec<Score>>, ReviewsRepositoryError>;

    /// Returns number of removed reviews
    async fn delete_reviews_of_book(&self, book_id: BookId) -> Result<u64, ReviewsRepositoryError>;
}
