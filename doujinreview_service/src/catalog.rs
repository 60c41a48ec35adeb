use std::cmp::Reverse;

use itertools::Itertools;

use crate::api::{Book, BookSummary, CatalogPage, Score, SortOrder};

pub const PAGE_SIZE: usize = 10;

/// Rounded (half up) average of the scores, None when there are no scores
pub fn average_score(scores: &[Score]) -> Option<Score> {
    if scores.is_empty() {
        return None;
    }
    let total: i64 = scores.iter().map(|&score| i64::from(score)).sum();
    let average = total as f64 / scores.len() as f64;
    Some((average + 0.5).floor() as Score)
}

pub fn total_pages(total_items: usize) -> usize {
    total_items.div_ceil(PAGE_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Book together with the scores of all its reviews
pub struct CatalogEntry {
    pub book: Book,
    pub scores: Vec<Score>,
}

impl CatalogEntry {
    pub fn summary(&self) -> BookSummary {
        BookSummary {
            book_id: self.book.book_id,
            title: self.book.details.title.clone(),
            cover_url: self.book.details.cover_url.clone(),
            tags: self.book.details.tags.clone(),
            created_at: self.book.created_at,
            review_count: self.scores.len(),
            average_score: average_score(&self.scores),
        }
    }
}

/// Ordered, paginated view over a fetched set of books.
/// Replacing the books or changing the order always goes back to the first page.
#[derive(Debug, Clone)]
pub struct CatalogListing {
    entries: Vec<CatalogEntry>,
    sort: SortOrder,
    current_page: usize,
}

impl CatalogListing {
    pub fn new(entries: Vec<CatalogEntry>, sort: SortOrder) -> Self {
        Self {
            entries: sort_entries(entries, sort),
            sort,
            current_page: 1,
        }
    }

    pub fn refresh(&mut self, entries: Vec<CatalogEntry>) {
        self.entries = sort_entries(entries, self.sort);
        self.current_page = 1;
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.entries = sort_entries(std::mem::take(&mut self.entries), sort);
        self.current_page = 1;
    }

    /// Pages are 1-based, 0 is treated as the first page.
    /// Pages past the end are allowed and are empty.
    pub fn go_to_page(&mut self, page: usize) {
        self.current_page = page.max(1);
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        total_pages(self.entries.len())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn page_entries(&self) -> &[CatalogEntry] {
        let start = (self.current_page - 1).saturating_mul(PAGE_SIZE);
        if start >= self.entries.len() {
            return &[];
        }
        let end = (start + PAGE_SIZE).min(self.entries.len());
        &self.entries[start..end]
    }

    pub fn to_page(&self) -> CatalogPage {
        CatalogPage {
            books: self.page_entries().iter().map(CatalogEntry::summary).collect(),
            page: self.current_page,
            total_pages: self.total_pages(),
            total_books: self.entries.len(),
        }
    }
}

fn sort_entries(entries: Vec<CatalogEntry>, sort: SortOrder) -> Vec<CatalogEntry> {
    match sort {
        SortOrder::Newest => entries
            .into_iter()
            .sorted_by_key(|entry| Reverse((entry.book.created_at, entry.book.book_id)))
            .collect(),
        SortOrder::Reviews => entries
            .into_iter()
            .sorted_by_key(|entry| {
                Reverse((
                    entry.scores.len(),
                    entry.book.created_at,
                    entry.book.book_id,
                ))
            })
            .collect(),
    }
}
