use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type BookId = i32;
pub type ReviewId = i32;
pub type UserId = i32;
pub type Score = i32;
/// Unix time in milliseconds
pub type Timestamp = i64;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Struct representing editable details of the book
pub struct BookDetails {
    pub title: String,
    pub cover_url: String,
    pub tags: Vec<String>,
    /// Score given by the catalog editor, independent of user reviews
    #[serde(default)]
    pub editor_score: Option<Score>,
    #[serde(default)]
    pub editor_note: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Struct representing a patch to book details. Allows to specify only a few fields and patch the current details
pub struct BookDetailsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// `null` clears the editor score, a missing field keeps it
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub editor_score: Option<Option<Score>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub editor_note: Option<Option<String>>,
}

/// Tells a field sent as `null` (`Some(None)`) apart from a missing one (`None`)
fn present_field<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct Book {
    pub book_id: BookId,
    pub created_at: Timestamp,
    pub details: BookDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Request body of book registration
pub struct NewBook {
    pub title: String,
    pub cover_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Descending creation time
    #[default]
    Newest,
    /// Descending number of reviews
    Reviews,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct CatalogQuery {
    /// Matches title substring (case-insensitive) or exact tag
    pub keyword: Option<String>,
    pub sort: Option<SortOrder>,
    /// 1-based page number
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct BookSummary {
    pub book_id: BookId,
    pub title: String,
    pub cover_url: String,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub review_count: usize,
    /// Rounded average of review scores, null when the book has no reviews
    pub average_score: Option<Score>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct CatalogPage {
    pub books: Vec<BookSummary>,
    pub page: usize,
    pub total_pages: usize,
    pub total_books: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct Review {
    pub review_id: ReviewId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub score: Score,
    pub body: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct ReviewWithAuthor {
    pub review: Review,
    /// Display name of the author, empty if the profile is gone
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct BookDetailView {
    pub book: Book,
    /// Newest first
    pub reviews: Vec<ReviewWithAuthor>,
    pub average_score: Option<Score>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Review as typed by the user
pub struct ReviewSubmission {
    pub score: Option<Score>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct UpsertOutcome {
    pub review_id: ReviewId,
    /// false if an existing review of the same user was overwritten
    pub created: bool,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Apiv2Schema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Fields of the profile the owner may change. Role is deliberately absent.
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct SignUpResponse {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct SessionToken {
    pub token: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Identity of the signed-in user, resolved by the server on every request
pub struct SessionContext {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct CoverUpload {
    /// Original file name, only its extension is kept
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct CoverUploadResponse {
    pub public_url: String,
}
