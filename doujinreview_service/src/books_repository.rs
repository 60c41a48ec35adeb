pub use in_memory_books_repository::InMemoryBookRepository;
pub use postgres_books_repository::PostgresBooksRepository;

use crate::api::{Book, BookDetails, BookDetailsPatch, BookId};

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BookRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BookRepository: Send + Sync {
    /// Adds book to repository, returns an id assigned to the book
    async fn add_book(&self, details: BookDetails) -> Result<BookId, BookRepositoryError>;
    /// Updates book in the repository, returns true if book was updated and false if it was not found
    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookDetailsPatch,
    ) -> Result<bool, BookRepositoryError>;
    /// Retrieves the book from repository
    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError>;
    /// Removes the book, returns false if it was not found
    async fn delete_book(&self, book_id: BookId) -> Result<bool, BookRepositoryError>;
    /// Lists books newest first, filtered by title substring or exact tag when keyword is given
    async fn search_books(&self, keyword: Option<&str>) -> Result<Vec<Book>, BookRepositoryError>;
}
