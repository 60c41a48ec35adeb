use crate::api::{
    BookDetailsPatch, NewBook, ProfilePatch, ReviewSubmission, Score, SignUpRequest,
};

pub const MIN_SCORE: Score = 0;
pub const MAX_SCORE: Score = 100;
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Score is required")]
    MissingScore,

    #[error("Score {0} is outside of 0-100")]
    ScoreOutOfRange(Score),

    #[error("Review text is required")]
    EmptyReviewBody,

    #[error("Display name is required")]
    EmptyDisplayName,

    #[error("Invalid e-mail address")]
    InvalidEmail,

    #[error("Password must have at least 6 characters")]
    PasswordTooShort,

    #[error("Title is required")]
    EmptyTitle,

    #[error("Cover image is required")]
    MissingCover,
}

/// Review ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidReview {
    pub score: Score,
    pub body: String,
}

pub fn validate_review(submission: &ReviewSubmission) -> Result<ValidReview, ValidationError> {
    let score = submission.score.ok_or(ValidationError::MissingScore)?;
    if submission.body.trim().is_empty() {
        return Err(ValidationError::EmptyReviewBody);
    }
    Ok(ValidReview {
        score: validate_score(score)?,
        body: submission.body.clone(),
    })
}

fn validate_score(score: Score) -> Result<Score, ValidationError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(ValidationError::ScoreOutOfRange(score))
    }
}

pub fn validate_sign_up(request: &SignUpRequest) -> Result<(), ValidationError> {
    if request.display_name.trim().is_empty() {
        return Err(ValidationError::EmptyDisplayName);
    }
    validate_email(&request.email)?;
    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail),
    }
}

/// Lowercased and trimmed, so that lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_new_book(book: &NewBook) -> Result<(), ValidationError> {
    if book.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if book.cover_url.trim().is_empty() {
        return Err(ValidationError::MissingCover);
    }
    Ok(())
}

pub fn validate_book_patch(patch: &BookDetailsPatch) -> Result<(), ValidationError> {
    if matches!(&patch.title, Some(title) if title.trim().is_empty()) {
        return Err(ValidationError::EmptyTitle);
    }
    if matches!(&patch.cover_url, Some(url) if url.trim().is_empty()) {
        return Err(ValidationError::MissingCover);
    }
    if let Some(Some(score)) = patch.editor_score {
        validate_score(score)?;
    }
    Ok(())
}

pub fn validate_profile_patch(patch: &ProfilePatch) -> Result<(), ValidationError> {
    if matches!(&patch.display_name, Some(name) if name.trim().is_empty()) {
        return Err(ValidationError::EmptyDisplayName);
    }
    Ok(())
}

/// Splits comma separated tags typed by the user, dropping blanks
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
