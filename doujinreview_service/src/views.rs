use std::sync::Arc;

use crate::access::{can_delete_review, can_edit_profile, can_manage_catalog};
use crate::api::{
    BookDetailView, BookId, CatalogPage, CatalogQuery, Profile, Review, ReviewId, SessionContext,
    SortOrder, UserId,
};
use crate::client::DoujinReviewClient;

/// Catalog list state: keyword, order and page of the last fetch.
/// Every new search, order change or refresh starts again from page 1.
pub struct CatalogBrowser {
    client: Arc<DoujinReviewClient>,
    keyword: Option<String>,
    sort: SortOrder,
    page: usize,
    current: Option<CatalogPage>,
}

impl CatalogBrowser {
    pub fn new(client: Arc<DoujinReviewClient>) -> Self {
        Self {
            client,
            keyword: None,
            sort: SortOrder::default(),
            page: 1,
            current: None,
        }
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn current(&self) -> Option<&CatalogPage> {
        self.current.as_ref()
    }

    async fn fetch(&mut self) -> anyhow::Result<&CatalogPage> {
        let page = self
            .client
            .list_books(&CatalogQuery {
                keyword: self.keyword.clone(),
                sort: Some(self.sort),
                page: Some(self.page),
            })
            .await?;
        Ok(&*self.current.insert(page))
    }

    pub async fn refresh(&mut self) -> anyhow::Result<&CatalogPage> {
        self.page = 1;
        self.fetch().await
    }

    /// Blank keyword clears the filter
    pub async fn search(&mut self, keyword: &str) -> anyhow::Result<&CatalogPage> {
        let keyword = keyword.trim();
        self.keyword = (!keyword.is_empty()).then(|| keyword.to_string());
        self.refresh().await
    }

    /// Clicking a tag searches for it
    pub async fn search_tag(&mut self, tag: &str) -> anyhow::Result<&CatalogPage> {
        self.search(tag).await
    }

    pub async fn set_sort(&mut self, sort: SortOrder) -> anyhow::Result<&CatalogPage> {
        self.sort = sort;
        self.refresh().await
    }

    pub async fn go_to_page(&mut self, page: usize) -> anyhow::Result<&CatalogPage> {
        self.page = page.max(1);
        self.fetch().await
    }
}

/// Book detail as seen by the signed in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookViewState {
    pub detail: BookDetailView,
    /// Review of the current user, pre-fills the review form
    pub my_review: Option<Review>,
    pub can_edit_book: bool,
    pub deletable_reviews: Vec<ReviewId>,
}

pub async fn load_book_view(
    client: &DoujinReviewClient,
    book_id: BookId,
    session: &SessionContext,
) -> anyhow::Result<Option<BookViewState>> {
    let Some(detail) = client.get_book(book_id).await? else {
        return Ok(None);
    };
    let my_review = detail
        .reviews
        .iter()
        .find(|entry| entry.review.user_id == session.user_id)
        .map(|entry| entry.review.clone());
    let deletable_reviews = detail
        .reviews
        .iter()
        .filter(|entry| can_delete_review(session, entry.review.user_id))
        .map(|entry| entry.review.review_id)
        .collect();
    Ok(Some(BookViewState {
        my_review,
        can_edit_book: can_manage_catalog(session),
        deletable_reviews,
        detail,
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileViewState {
    pub profile: Profile,
    /// Edit form is offered only on the own profile
    pub is_own_profile: bool,
}

/// Loads the profile together with the current session
pub async fn load_profile_view(
    client: &DoujinReviewClient,
    user_id: UserId,
) -> anyhow::Result<Option<ProfileViewState>> {
    let (session, profile) =
        futures_util::try_join!(client.session(), client.get_profile(user_id))?;
    Ok(profile.map(|profile| ProfileViewState {
        is_own_profile: session
            .as_ref()
            .is_some_and(|session| can_edit_profile(session, profile.user_id)),
        profile,
    }))
}
