use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::api::{BookId, Review, ReviewId, Score, UpsertOutcome, UserId};
use crate::clock::now_millis;
use crate::reviews_repository::{ReviewsRepository, ReviewsRepositoryError};
use crate::validation::ValidReview;

#[derive(Default)]
struct ReviewsState {
    last_review_id: ReviewId,
    reviews: HashMap<ReviewId, Review>,
    // (book, author) -> review, keeps one review per user and book
    by_book_and_author: HashMap<(BookId, UserId), ReviewId>,
}

#[derive(Default)]
pub struct InMemoryReviewsRepository {
    state: parking_lot::RwLock<ReviewsState>,
}

#[async_trait::async_trait]
impl ReviewsRepository for InMemoryReviewsRepository {
    async fn upsert_review(
        &self,
        book_id: BookId,
        user_id: UserId,
        review: ValidReview,
    ) -> Result<UpsertOutcome, ReviewsRepositoryError> {
        let mut state = self.state.write();
        let ReviewsState {
            last_review_id,
            reviews,
            by_book_and_author,
        } = &mut *state;

        match by_book_and_author.entry((book_id, user_id)) {
            Entry::Occupied(existing) => {
                let review_id = *existing.get();
                let stored = reviews.get_mut(&review_id).ok_or_else(|| {
                    ReviewsRepositoryError::Other(format!("Review {review_id} missing from index"))
                })?;
                stored.score = review.score;
                stored.body = review.body;
                Ok(UpsertOutcome {
                    review_id,
                    created: false,
                })
            }
            Entry::Vacant(entry) => {
                *last_review_id += 1;
                let review_id = *last_review_id;
                entry.insert(review_id);
                reviews.insert(
                    review_id,
                    Review {
                        review_id,
                        book_id,
                        user_id,
                        score: review.score,
                        body: review.body,
                        created_at: now_millis(),
                    },
                );
                Ok(UpsertOutcome {
                    review_id,
                    created: true,
                })
            }
        }
    }

    async fn get_review(&self, review_id: ReviewId) -> Result<Review, ReviewsRepositoryError> {
        self.state
            .read()
            .reviews
            .get(&review_id)
            .cloned()
            .ok_or(ReviewsRepositoryError::NotFound(review_id))
    }

    async fn delete_review(&self, review_id: ReviewId) -> Result<bool, ReviewsRepositoryError> {
        let mut state = self.state.write();
        match state.reviews.remove(&review_id) {
            Some(review) => {
                state
                    .by_book_and_author
                    .remove(&(review.book_id, review.user_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_reviews(&self, book_id: BookId) -> Result<Vec<Review>, ReviewsRepositoryError> {
        let mut reviews: Vec<Review> = self
            .state
            .read()
            .reviews
            .values()
            .filter(|review| review.book_id == book_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|review| Reverse((review.created_at, review.review_id)));
        Ok(reviews)
    }

    async fn list_scores(
        &self,
        book_ids: &[BookId],
    ) -> Result<HashMap<BookId, Vec<Score>>, ReviewsRepositoryError> {
        let state = self.state.read();
        let mut scores: HashMap<BookId, Vec<Score>> = HashMap::new();
        for review in state
            .reviews
            .values()
            .filter(|review| book_ids.contains(&review.book_id))
        {
            scores.entry(review.book_id).or_default().push(review.score);
        }
        Ok(scores)
    }

    async fn delete_reviews_of_book(&self, book_id: BookId) -> Result<u64, ReviewsRepositoryError> {
        let mut state = self.state.write();
        let before = state.reviews.len();
        state.reviews.retain(|_, review| review.book_id != book_id);
        state
            .by_book_and_author
            .retain(|(reviewed_book, _), _| *reviewed_book != book_id);
        Ok((before - state.reviews.len()) as u64)
    }
}
