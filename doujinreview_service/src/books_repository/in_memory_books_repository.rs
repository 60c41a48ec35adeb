use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use serde_json::json;

use crate::api::{Book, BookDetails, BookDetailsPatch, BookId};
use crate::books_repository::{BookRepository, BookRepositoryError};
use crate::clock::now_millis;
use crate::search::matches_keyword;

pub struct InMemoryBookRepository {
    book_sequence_generator: AtomicI32,
    books: parking_lot::RwLock<HashMap<BookId, Book>>,
}

impl Default for InMemoryBookRepository {
    fn default() -> Self {
        Self {
            book_sequence_generator: AtomicI32::new(1),
            books: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn add_book(&self, details: BookDetails) -> Result<BookId, BookRepositoryError> {
        let book_id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed);
        self.books.write().insert(
            book_id,
            Book {
                book_id,
                created_at: now_millis(),
                details,
            },
        );
        Ok(book_id)
    }

    async fn update_book(
        &self,
        book_id: BookId,
        patch: BookDetailsPatch,
    ) -> Result<bool, BookRepositoryError> {
        let mut locked_books = self.books.write();
        if let Some(book) = locked_books.get_mut(&book_id) {
            let mut result_details = json!(book.details);
            json_patch::merge(&mut result_details, &json!(patch));
            book.details = serde_json::from_value(result_details)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BookRepositoryError> {
        self.books
            .read()
            .get(&book_id)
            .cloned()
            .ok_or(BookRepositoryError::NotFound(book_id))
    }

    async fn delete_book(&self, book_id: BookId) -> Result<bool, BookRepositoryError> {
        Ok(self.books.write().remove(&book_id).is_some())
    }

    async fn search_books(&self, keyword: Option<&str>) -> Result<Vec<Book>, BookRepositoryError> {
        let mut found: Vec<Book> = self
            .books
            .read()
            .values()
            .filter(|book| {
                keyword
                    .map(|keyword| matches_keyword(&book.details.title, &book.details.tags, keyword))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        found.sort_by_key(|book| Reverse((book.created_at, book.book_id)));
        Ok(found)
    }
}
