use std::collections::HashMap;

use actix_web::http::header::{AUTHORIZATION, LOCATION};
use actix_web::web::Data;
use actix_web::{Error, HttpRequest, HttpResponse};
use base64::Engine;
use paperclip::actix::{api_v2_operation, web};

use crate::access::{can_delete_review, can_edit_profile, can_manage_catalog};
use crate::api::{
    BookDetailView, BookDetails, BookDetailsPatch, BookId, CatalogQuery, CoverUpload,
    CoverUploadResponse, NewBook, ProfilePatch, ReviewId, ReviewSubmission, ReviewWithAuthor,
    Score, SessionContext, SignInRequest, SignUpRequest, SignUpResponse, UserId,
};
use crate::auth::AuthError;
use crate::books_repository::BookRepositoryError;
use crate::catalog::{average_score, CatalogEntry, CatalogListing};
use crate::cover_storage::{content_type_for, stored_cover_name, CoverStorageError};
use crate::profiles_repository::ProfilesRepositoryError;
use crate::reviews_repository::ReviewsRepositoryError;
use crate::search::normalize_keyword;
use crate::state::AppState;
use crate::validation::{
    validate_book_patch, validate_new_book, validate_profile_patch, validate_review,
};

fn bearer_token(request: &HttpRequest) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Resolves the session behind the bearer token.
/// The error is the response that should be returned right away.
async fn authenticate(
    state: &AppState,
    request: &HttpRequest,
) -> Result<SessionContext, HttpResponse> {
    let Some(token) = bearer_token(request) else {
        return Err(HttpResponse::Unauthorized().json("Not signed in"));
    };
    match state.auth.resolve(token).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(HttpResponse::Unauthorized().json("Session expired")),
        Err(err) => {
            tracing::error!("Resolving session failed {}", err);
            Err(HttpResponse::InternalServerError().finish())
        }
    }
}

async fn authenticate_admin(
    state: &AppState,
    request: &HttpRequest,
) -> Result<SessionContext, HttpResponse> {
    let session = authenticate(state, request).await?;
    if can_manage_catalog(&session) {
        Ok(session)
    } else {
        Err(HttpResponse::Forbidden().json("Admin role required"))
    }
}

fn auth_error_response(action: &str, err: AuthError) -> HttpResponse {
    match err {
        AuthError::Validation(err) => HttpResponse::BadRequest().json(err.to_string()),
        AuthError::EmailTaken(_) => HttpResponse::Conflict().json(err.to_string()),
        AuthError::InvalidCredentials => HttpResponse::Unauthorized().json(err.to_string()),
        err => {
            tracing::error!("{} failed {}", action, err);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn sign_up(
    state: Data<AppState>,
    request: web::Json<SignUpRequest>,
) -> Result<HttpResponse, Error> {
    Ok(match state.auth.sign_up(request.into_inner()).await {
        Ok(user_id) => HttpResponse::Ok()
            .append_header((LOCATION, format!("/api/profile/{}", user_id)))
            .json(SignUpResponse { user_id }),
        Err(err) => auth_error_response("Sign up", err),
    })
}

#[api_v2_operation]
pub async fn sign_in(
    state: Data<AppState>,
    request: web::Json<SignInRequest>,
) -> Result<HttpResponse, Error> {
    Ok(match state.auth.sign_in(request.into_inner()).await {
        Ok(session) => HttpResponse::Ok().json(session),
        Err(err) => auth_error_response("Sign in", err),
    })
}

#[api_v2_operation]
pub async fn sign_out(state: Data<AppState>, request: HttpRequest) -> Result<HttpResponse, Error> {
    Ok(match bearer_token(&request) {
        Some(token) => {
            if !state.auth.sign_out(token) {
                tracing::debug!("Sign out of unknown session");
            }
            HttpResponse::Ok().finish()
        }
        None => HttpResponse::Unauthorized().json("Not signed in"),
    })
}

#[api_v2_operation]
pub async fn get_session(
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, Error> {
    Ok(match authenticate(&state, &request).await {
        Ok(session) => HttpResponse::Ok().json(session),
        Err(response) => response,
    })
}

#[api_v2_operation]
pub async fn list_books(
    state: Data<AppState>,
    query: web::Query<CatalogQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    let books = match state
        .books
        .search_books(normalize_keyword(query.keyword.as_deref()))
        .await
    {
        Ok(books) => books,
        Err(err) => {
            tracing::error!("Search books failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let book_ids: Vec<BookId> = books.iter().map(|book| book.book_id).collect();
    let mut scores = match state.reviews.list_scores(&book_ids).await {
        Ok(scores) => scores,
        Err(err) => {
            tracing::error!("List scores failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let entries = books
        .into_iter()
        .map(|book| CatalogEntry {
            scores: scores.remove(&book.book_id).unwrap_or_default(),
            book,
        })
        .collect();
    let mut listing = CatalogListing::new(entries, query.sort.unwrap_or_default());
    listing.go_to_page(query.page.unwrap_or(1));
    Ok(HttpResponse::Ok().json(listing.to_page()))
}

#[api_v2_operation]
pub async fn add_book(
    state: Data<AppState>,
    request: HttpRequest,
    new_book: web::Json<NewBook>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = authenticate_admin(&state, &request).await {
        return Ok(response);
    }
    let new_book = new_book.into_inner();
    if let Err(err) = validate_new_book(&new_book) {
        return Ok(HttpResponse::BadRequest().json(err.to_string()));
    }

    let details = BookDetails {
        title: new_book.title.trim().to_string(),
        cover_url: new_book.cover_url,
        tags: new_book.tags,
        editor_score: None,
        editor_note: None,
    };
    Ok(match state.books.add_book(details).await {
        Ok(book_id) => HttpResponse::Ok()
            .append_header((LOCATION, format!("/api/book/{}", book_id)))
            .finish(),
        Err(err) => {
            tracing::error!("Add book failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_book(
    state: Data<AppState>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    let book = match state.books.get_book(book_id).await {
        Ok(book) => book,
        Err(BookRepositoryError::NotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(format!("Book {} not found", book_id)))
        }
        Err(err) => {
            tracing::error!("Get book failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let reviews = match state.reviews.list_reviews(book_id).await {
        Ok(reviews) => reviews,
        Err(err) => {
            tracing::error!("List reviews failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };
    let author_ids: Vec<UserId> = reviews.iter().map(|review| review.user_id).collect();
    let author_names = match state.profiles.display_names(&author_ids).await {
        Ok(names) => names,
        Err(err) => {
            tracing::error!("Display names lookup failed {}", err);
            HashMap::new()
        }
    };

    let scores: Vec<Score> = reviews.iter().map(|review| review.score).collect();
    let reviews = reviews
        .into_iter()
        .map(|review| ReviewWithAuthor {
            author_name: author_names.get(&review.user_id).cloned().unwrap_or_default(),
            review,
        })
        .collect();

    Ok(HttpResponse::Ok().json(BookDetailView {
        book,
        reviews,
        average_score: average_score(&scores),
    }))
}

#[api_v2_operation]
pub async fn update_book(
    state: Data<AppState>,
    request: HttpRequest,
    book_id: web::Path<BookId>,
    patch: web::Json<BookDetailsPatch>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = authenticate_admin(&state, &request).await {
        return Ok(response);
    }
    let patch = patch.into_inner();
    if let Err(err) = validate_book_patch(&patch) {
        return Ok(HttpResponse::BadRequest().json(err.to_string()));
    }

    let book_id = book_id.into_inner();
    Ok(match state.books.update_book(book_id, patch).await {
        Ok(true) => HttpResponse::Ok().finish(),
        Ok(false) | Err(BookRepositoryError::NotFound(_)) => {
            HttpResponse::NotFound().json(format!("Book {} not found", book_id))
        }
        Err(err) => {
            tracing::error!("Update book failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn delete_book(
    state: Data<AppState>,
    request: HttpRequest,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = authenticate_admin(&state, &request).await {
        return Ok(response);
    }
    let book_id = book_id.into_inner();
    match state.books.delete_book(book_id).await {
        Ok(true) => {}
        Ok(false) => return Ok(HttpResponse::NotFound().json(format!("Book {} not found", book_id))),
        Err(err) => {
            tracing::error!("Delete book failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }

    // the book is gone already, reviews left behind are unreachable from the catalog
    match state.reviews.delete_reviews_of_book(book_id).await {
        Ok(removed) => tracing::info!("Deleted book {} with {} reviews", book_id, removed),
        Err(err) => tracing::error!(
            "Deleted book {}, its reviews were left behind {}",
            book_id,
            err
        ),
    }
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn upsert_review(
    state: Data<AppState>,
    request: HttpRequest,
    book_id: web::Path<BookId>,
    submission: web::Json<ReviewSubmission>,
) -> Result<HttpResponse, Error> {
    let session = match authenticate(&state, &request).await {
        Ok(session) => session,
        Err(response) => return Ok(response),
    };
    let review = match validate_review(&submission) {
        Ok(review) => review,
        Err(err) => return Ok(HttpResponse::BadRequest().json(err.to_string())),
    };

    let book_id = book_id.into_inner();
    match state.books.get_book(book_id).await {
        Ok(_) => {}
        Err(BookRepositoryError::NotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(format!("Book {} not found", book_id)))
        }
        Err(err) => {
            tracing::error!("Get book failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }

    let outcome = match state
        .reviews
        .upsert_review(book_id, session.user_id, review)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!("Upsert review failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    // the book may have been deleted while the review was written
    match state.books.get_book(book_id).await {
        Ok(_) => {}
        Err(BookRepositoryError::NotFound(_)) => {
            if let Err(err) = state.reviews.delete_review(outcome.review_id).await {
                tracing::error!(
                    "Removing review {} of deleted book {} failed {}",
                    outcome.review_id,
                    book_id,
                    err
                );
            }
            return Ok(HttpResponse::NotFound().json(format!("Book {} not found", book_id)));
        }
        Err(err) => tracing::error!("Get book failed {}", err),
    }

    Ok(if outcome.created {
        HttpResponse::Created().json(outcome)
    } else {
        HttpResponse::Ok().json(outcome)
    })
}

#[api_v2_operation]
pub async fn delete_review(
    state: Data<AppState>,
    request: HttpRequest,
    review_id: web::Path<ReviewId>,
) -> Result<HttpResponse, Error> {
    let session = match authenticate(&state, &request).await {
        Ok(session) => session,
        Err(response) => return Ok(response),
    };
    let review_id = review_id.into_inner();
    let review = match state.reviews.get_review(review_id).await {
        Ok(review) => review,
        Err(ReviewsRepositoryError::NotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(format!("Review {} not found", review_id)))
        }
        Err(err) => {
            tracing::error!("Get review failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    if !can_delete_review(&session, review.user_id) {
        return Ok(HttpResponse::Forbidden().json("Only the author or an admin can delete a review"));
    }

    Ok(match state.reviews.delete_review(review_id).await {
        Ok(true) => HttpResponse::Ok().finish(),
        Ok(false) => HttpResponse::NotFound().json(format!("Review {} not found", review_id)),
        Err(err) => {
            tracing::error!("Delete review failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_profile(
    state: Data<AppState>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, Error> {
    let user_id = user_id.into_inner();
    Ok(match state.profiles.get_profile(user_id).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(ProfilesRepositoryError::NotFound(_)) => {
            HttpResponse::NotFound().json(format!("Profile {} not found", user_id))
        }
        Err(err) => {
            tracing::error!("Get profile failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn update_profile(
    state: Data<AppState>,
    request: HttpRequest,
    user_id: web::Path<UserId>,
    patch: web::Json<ProfilePatch>,
) -> Result<HttpResponse, Error> {
    let session = match authenticate(&state, &request).await {
        Ok(session) => session,
        Err(response) => return Ok(response),
    };
    let user_id = user_id.into_inner();
    if !can_edit_profile(&session, user_id) {
        return Ok(HttpResponse::Forbidden().json("Only the owner can edit a profile"));
    }
    let mut patch = patch.into_inner();
    if let Err(err) = validate_profile_patch(&patch) {
        return Ok(HttpResponse::BadRequest().json(err.to_string()));
    }
    patch.display_name = patch.display_name.map(|name| name.trim().to_string());

    match state.profiles.update_profile(user_id, patch).await {
        Ok(true) => {}
        Ok(false) => {
            return Ok(HttpResponse::NotFound().json(format!("Profile {} not found", user_id)))
        }
        Err(err) => {
            tracing::error!("Update profile failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }
    Ok(match state.profiles.get_profile(user_id).await {
        Ok(profile) => HttpResponse::Ok().json(profile),
        Err(err) => {
            tracing::error!("Get profile failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn upload_cover(
    state: Data<AppState>,
    request: HttpRequest,
    upload: web::Json<CoverUpload>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = authenticate_admin(&state, &request).await {
        return Ok(response);
    }
    let content = match base64::engine::general_purpose::STANDARD.decode(&upload.content_base64) {
        Ok(content) => content,
        Err(err) => {
            return Ok(HttpResponse::BadRequest().json(format!("Invalid cover content: {}", err)))
        }
    };
    if content.is_empty() {
        return Ok(HttpResponse::BadRequest().json("Cover image is required"));
    }

    let name = stored_cover_name(&upload.file_name);
    Ok(match state.covers.upload(&name, content).await {
        Ok(public_url) => HttpResponse::Ok().json(CoverUploadResponse { public_url }),
        Err(err) => {
            tracing::error!("Cover upload failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_cover(
    state: Data<AppState>,
    name: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let name = name.into_inner();
    Ok(match state.covers.read(&name).await {
        Ok(content) => HttpResponse::Ok()
            .content_type(content_type_for(&name))
            .body(content),
        Err(err @ CoverStorageError::InvalidName(_)) => {
            HttpResponse::BadRequest().json(err.to_string())
        }
        Err(err @ CoverStorageError::NotFound(_)) => HttpResponse::NotFound().json(err.to_string()),
        Err(err) => {
            tracing::error!("Cover read failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[cfg(test)]
mod handler_tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use config::Environment;
    use paperclip::actix::OpenApiExt;

    use crate::api::{
        BookDetailView, CatalogPage, Profile, Review, Role, SessionToken, UpsertOutcome,
    };
    use crate::app_config::config_app;
    use crate::books_repository::BookRepository;
    use crate::reviews_repository::{InMemoryReviewsRepository, ReviewsRepository};
    use crate::settings::Settings;
    use crate::validation::ValidReview;

    use super::*;

    const ADMIN_EMAIL: &str = "editor@example.com";

    fn test_state() -> AppState {
        let mut variables = config::Map::new();
        variables.insert("ADMIN_EMAILS".to_string(), ADMIN_EMAIL.to_string());
        variables.insert("PUBLIC_URL".to_string(), "http://covers.test".to_string());
        let settings =
            Settings::from_environment(Environment::default().source(Some(variables))).unwrap();
        AppState::in_memory(&settings)
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .wrap_api()
                    .app_data(Data::new($state.clone()))
                    .configure(config_app)
                    .build(),
            )
            .await
        };
    }

    async fn signed_in(state: &AppState, email: &str, display_name: &str) -> SessionToken {
        state
            .auth
            .sign_up(SignUpRequest {
                email: email.to_string(),
                password: "secret123".to_string(),
                display_name: display_name.to_string(),
            })
            .await
            .unwrap();
        state
            .auth
            .sign_in(SignInRequest {
                email: email.to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap()
    }

    async fn stored_book(state: &AppState, title: &str, tags: &[&str]) -> BookId {
        state
            .books
            .add_book(BookDetails {
                title: title.to_string(),
                cover_url: "http://covers.test/covers/1.png".to_string(),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                editor_score: None,
                editor_note: None,
            })
            .await
            .unwrap()
    }

    fn bearer(session: &SessionToken) -> (actix_web::http::header::HeaderName, String) {
        (AUTHORIZATION, format!("Bearer {}", session.token))
    }

    fn review_request(
        session: &SessionToken,
        book_id: BookId,
        score: Option<Score>,
        body: &str,
    ) -> test::TestRequest {
        test::TestRequest::put()
            .uri(&format!("/api/book/{}/review", book_id))
            .insert_header(bearer(session))
            .set_json(ReviewSubmission {
                score,
                body: body.to_string(),
            })
    }

    /// In-memory reviews with injected trouble: books that disappear right after
    /// a review is written, and a cascade delete that always fails
    #[derive(Default)]
    struct TroubledReviews {
        inner: InMemoryReviewsRepository,
        vanishing_books: Option<Arc<dyn BookRepository>>,
        failing_cascade: bool,
    }

    #[async_trait::async_trait]
    impl ReviewsRepository for TroubledReviews {
        async fn upsert_review(
            &self,
            book_id: BookId,
            user_id: UserId,
            review: ValidReview,
        ) -> Result<UpsertOutcome, ReviewsRepositoryError> {
            let outcome = self.inner.upsert_review(book_id, user_id, review).await?;
            if let Some(books) = &self.vanishing_books {
                books.delete_book(book_id).await.unwrap();
            }
            Ok(outcome)
        }

        async fn get_review(&self, review_id: ReviewId) -> Result<Review, ReviewsRepositoryError> {
            self.inner.get_review(review_id).await
        }

        async fn delete_review(&self, review_id: ReviewId) -> Result<bool, ReviewsRepositoryError> {
            self.inner.delete_review(review_id).await
        }

        async fn list_reviews(
            &self,
            book_id: BookId,
        ) -> Result<Vec<Review>, ReviewsRepositoryError> {
            self.inner.list_reviews(book_id).await
        }

        async fn list_scores(
            &self,
            book_ids: &[BookId],
        ) -> Result<HashMap<BookId, Vec<Score>>, ReviewsRepositoryError> {
            self.inner.list_scores(book_ids).await
        }

        async fn delete_reviews_of_book(
            &self,
            book_id: BookId,
        ) -> Result<u64, ReviewsRepositoryError> {
            if self.failing_cascade {
                return Err(ReviewsRepositoryError::Other("connection lost".to_string()));
            }
            self.inner.delete_reviews_of_book(book_id).await
        }
    }

    #[actix_web::test]
    async fn sign_up_sign_in_and_session() {
        let state = test_state();
        let app = init_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/auth/sign_up")
            .set_json(SignUpRequest {
                email: ADMIN_EMAIL.to_string(),
                password: "secret123".to_string(),
                display_name: "editor".to_string(),
            })
            .to_request();
        let signed_up: SignUpResponse = test::call_and_read_body_json(&app, request).await;

        let request = test::TestRequest::post()
            .uri("/api/auth/sign_in")
            .set_json(SignInRequest {
                email: ADMIN_EMAIL.to_string(),
                password: "secret123".to_string(),
            })
            .to_request();
        let session: SessionToken = test::call_and_read_body_json(&app, request).await;
        assert_eq!(session.user_id, signed_up.user_id);

        let request = test::TestRequest::get()
            .uri("/api/session")
            .insert_header(bearer(&session))
            .to_request();
        let context: SessionContext = test::call_and_read_body_json(&app, request).await;
        assert_eq!(context.role, Role::Admin);
        assert_eq!(context.display_name, "editor");

        let request = test::TestRequest::post()
            .uri("/api/auth/sign_out")
            .insert_header(bearer(&session))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let request = test::TestRequest::get()
            .uri("/api/session")
            .insert_header(bearer(&session))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn sign_up_errors_map_to_statuses() {
        let state = test_state();
        let app = init_app!(state);
        signed_in(&state, "reader@example.com", "reader").await;

        let request = test::TestRequest::post()
            .uri("/api/auth/sign_up")
            .set_json(SignUpRequest {
                email: "new@example.com".to_string(),
                password: "secret123".to_string(),
                display_name: "  ".to_string(),
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::BAD_REQUEST
        );

        let request = test::TestRequest::post()
            .uri("/api/auth/sign_up")
            .set_json(SignUpRequest {
                email: "Reader@example.com".to_string(),
                password: "secret123".to_string(),
                display_name: "other".to_string(),
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CONFLICT
        );

        let request = test::TestRequest::post()
            .uri("/api/auth/sign_in")
            .set_json(SignInRequest {
                email: "reader@example.com".to_string(),
                password: "not-the-password".to_string(),
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn only_admin_manages_books() {
        let state = test_state();
        let app = init_app!(state);
        let admin = signed_in(&state, ADMIN_EMAIL, "editor").await;
        let reader = signed_in(&state, "reader@example.com", "reader").await;

        let new_book = NewBook {
            title: " Star Drift ".to_string(),
            cover_url: "http://covers.test/covers/1.png".to_string(),
            tags: vec!["SF".to_string()],
        };
        let request = test::TestRequest::post()
            .uri("/api/book")
            .insert_header(bearer(&reader))
            .set_json(new_book.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::FORBIDDEN
        );

        let request = test::TestRequest::post()
            .uri("/api/book")
            .set_json(new_book.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let request = test::TestRequest::post()
            .uri("/api/book")
            .insert_header(bearer(&admin))
            .set_json(new_book)
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let book_id: BookId = response
            .headers()
            .get(LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .strip_prefix("/api/book/")
            .unwrap()
            .parse()
            .unwrap();

        let request = test::TestRequest::patch()
            .uri(&format!("/api/book/{}", book_id))
            .insert_header(bearer(&admin))
            .set_json(BookDetailsPatch {
                editor_score: Some(Some(90)),
                editor_note: Some(Some("A classic".to_string())),
                ..Default::default()
            })
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let request = test::TestRequest::get()
            .uri(&format!("/api/book/{}", book_id))
            .to_request();
        let view: BookDetailView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(view.book.details.title, "Star Drift");
        assert_eq!(view.book.details.tags, vec!["SF".to_string()]);
        assert_eq!(view.book.details.editor_score, Some(90));
        assert_eq!(view.average_score, None);

        let request = test::TestRequest::patch()
            .uri(&format!("/api/book/{}", book_id))
            .insert_header(bearer(&admin))
            .set_json(serde_json::json!({ "editor_score": null }))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let request = test::TestRequest::get()
            .uri(&format!("/api/book/{}", book_id))
            .to_request();
        let view: BookDetailView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(view.book.details.editor_score, None);
        assert_eq!(view.book.details.editor_note.as_deref(), Some("A classic"));

        let request = test::TestRequest::patch()
            .uri(&format!("/api/book/{}", book_id + 100))
            .insert_header(bearer(&admin))
            .set_json(BookDetailsPatch {
                title: Some("Other".to_string()),
                ..Default::default()
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn resubmitted_review_is_overwritten() {
        let state = test_state();
        let app = init_app!(state);
        let reader = signed_in(&state, "reader@example.com", "reader").await;
        let book_id = stored_book(&state, "Star Drift", &[]).await;

        let response =
            test::call_service(&app, review_request(&reader, book_id, Some(80), "good").to_request())
                .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let first: UpsertOutcome = test::read_body_json(response).await;

        let response = test::call_service(
            &app,
            review_request(&reader, book_id, Some(90), "even better").to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let second: UpsertOutcome = test::read_body_json(response).await;
        assert_eq!(first.review_id, second.review_id);
        assert!(!second.created);

        let request = test::TestRequest::get()
            .uri(&format!("/api/book/{}", book_id))
            .to_request();
        let view: BookDetailView = test::call_and_read_body_json(&app, request).await;
        assert_eq!(view.reviews.len(), 1);
        assert_eq!(view.reviews[0].review.score, 90);
        assert_eq!(view.reviews[0].review.body, "even better");
        assert_eq!(view.reviews[0].author_name, "reader");
        assert_eq!(view.average_score, Some(90));
    }

    #[actix_web::test]
    async fn invalid_review_and_missing_book() {
        let state = test_state();
        let app = init_app!(state);
        let reader = signed_in(&state, "reader@example.com", "reader").await;
        let book_id = stored_book(&state, "Star Drift", &[]).await;

        for (target, score, body, expected) in [
            (book_id, None, "no score", StatusCode::BAD_REQUEST),
            (book_id, Some(50), " ", StatusCode::BAD_REQUEST),
            (book_id, Some(101), "too much", StatusCode::BAD_REQUEST),
            (book_id + 100, Some(50), "where", StatusCode::NOT_FOUND),
        ] {
            let request = review_request(&reader, target, score, body).to_request();
            assert_eq!(test::call_service(&app, request).await.status(), expected);
        }

        let request = test::TestRequest::put()
            .uri(&format!("/api/book/{}/review", book_id))
            .set_json(ReviewSubmission {
                score: Some(50),
                body: "anonymous".to_string(),
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn review_deletion_by_author_or_admin_only() {
        let state = test_state();
        let app = init_app!(state);
        let admin = signed_in(&state, ADMIN_EMAIL, "editor").await;
        let author = signed_in(&state, "author@example.com", "author").await;
        let stranger = signed_in(&state, "stranger@example.com", "stranger").await;
        let book_id = stored_book(&state, "Star Drift", &[]).await;

        let first: UpsertOutcome = test::call_and_read_body_json(
            &app,
            review_request(&author, book_id, Some(70), "fine").to_request(),
        )
        .await;
        let second: UpsertOutcome = test::call_and_read_body_json(
            &app,
            review_request(&stranger, book_id, Some(20), "meh").to_request(),
        )
        .await;

        let delete = |review_id: ReviewId, session: &SessionToken| {
            test::TestRequest::delete()
                .uri(&format!("/api/review/{}", review_id))
                .insert_header(bearer(session))
                .to_request()
        };

        let response = test::call_service(&app, delete(first.review_id, &stranger)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = test::call_service(&app, delete(first.review_id, &author)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = test::call_service(&app, delete(second.review_id, &admin)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = test::call_service(&app, delete(second.review_id, &admin)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn catalog_search_sort_and_pages() {
        let state = test_state();
        let app = init_app!(state);
        let reader = signed_in(&state, "reader@example.com", "reader").await;

        let tagged = stored_book(&state, "Romance", &["SF"]).await;
        let titled = stored_book(&state, "Galactic sfx", &[]).await;
        stored_book(&state, "Cooking", &["SF-short"]).await;
        for n in 0..10 {
            stored_book(&state, &format!("Filler {}", n), &[]).await;
        }
        let request = review_request(&reader, tagged, Some(80), "nice").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CREATED
        );

        let request = test::TestRequest::get()
            .uri("/api/books?keyword=SF")
            .to_request();
        let page: CatalogPage = test::call_and_read_body_json(&app, request).await;
        let mut found: Vec<BookId> = page.books.iter().map(|book| book.book_id).collect();
        found.sort();
        assert_eq!(found, vec![tagged, titled]);

        let request = test::TestRequest::get().uri("/api/books").to_request();
        let page: CatalogPage = test::call_and_read_body_json(&app, request).await;
        assert_eq!(page.total_books, 13);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.books.len(), 10);

        let request = test::TestRequest::get()
            .uri("/api/books?page=2")
            .to_request();
        let page: CatalogPage = test::call_and_read_body_json(&app, request).await;
        assert_eq!(page.page, 2);
        assert_eq!(page.books.len(), 3);

        let request = test::TestRequest::get()
            .uri("/api/books?sort=reviews")
            .to_request();
        let page: CatalogPage = test::call_and_read_body_json(&app, request).await;
        assert_eq!(page.books[0].book_id, tagged);
        assert_eq!(page.books[0].review_count, 1);
        assert_eq!(page.books[0].average_score, Some(80));
        assert_eq!(page.books[1].average_score, None);
    }

    #[actix_web::test]
    async fn deleting_book_removes_its_reviews() {
        let state = test_state();
        let app = init_app!(state);
        let admin = signed_in(&state, ADMIN_EMAIL, "editor").await;
        let reader = signed_in(&state, "reader@example.com", "reader").await;
        let book_id = stored_book(&state, "Short lived", &[]).await;
        let outcome: UpsertOutcome = test::call_and_read_body_json(
            &app,
            review_request(&reader, book_id, Some(60), "ok").to_request(),
        )
        .await;

        let request = test::TestRequest::delete()
            .uri(&format!("/api/book/{}", book_id))
            .insert_header(bearer(&reader))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::FORBIDDEN
        );

        let request = test::TestRequest::delete()
            .uri(&format!("/api/book/{}", book_id))
            .insert_header(bearer(&admin))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let request = test::TestRequest::get()
            .uri(&format!("/api/book/{}", book_id))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );
        assert!(matches!(
            state.reviews.get_review(outcome.review_id).await,
            Err(ReviewsRepositoryError::NotFound(..))
        ));
    }

    #[actix_web::test]
    async fn profile_is_edited_by_owner_only() {
        let state = test_state();
        let app = init_app!(state);
        let admin = signed_in(&state, ADMIN_EMAIL, "editor").await;
        let reader = signed_in(&state, "reader@example.com", "reader").await;

        let patch = ProfilePatch {
            display_name: Some(" New name ".to_string()),
            bio: Some("Likes SF".to_string()),
        };
        let request = test::TestRequest::patch()
            .uri(&format!("/api/profile/{}", reader.user_id))
            .insert_header(bearer(&admin))
            .set_json(patch.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::FORBIDDEN
        );

        let request = test::TestRequest::patch()
            .uri(&format!("/api/profile/{}", reader.user_id))
            .insert_header(bearer(&reader))
            .set_json(patch)
            .to_request();
        let profile: Profile = test::call_and_read_body_json(&app, request).await;
        assert_eq!(profile.display_name, "New name");
        assert_eq!(profile.bio, "Likes SF");
        assert_eq!(profile.role, Role::User);

        let request = test::TestRequest::patch()
            .uri(&format!("/api/profile/{}", reader.user_id))
            .insert_header(bearer(&reader))
            .set_json(ProfilePatch {
                display_name: Some(String::new()),
                bio: None,
            })
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::BAD_REQUEST
        );

        let request = test::TestRequest::get()
            .uri(&format!("/api/profile/{}", reader.user_id))
            .to_request();
        let profile: Profile = test::call_and_read_body_json(&app, request).await;
        assert_eq!(profile.display_name, "New name");
    }

    #[actix_web::test]
    async fn uploaded_cover_is_served() {
        let state = test_state();
        let app = init_app!(state);
        let admin = signed_in(&state, ADMIN_EMAIL, "editor").await;
        let reader = signed_in(&state, "reader@example.com", "reader").await;
        let upload = CoverUpload {
            file_name: "cover.PNG".to_string(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(b"png-bytes"),
        };

        let request = test::TestRequest::post()
            .uri("/api/covers")
            .insert_header(bearer(&reader))
            .set_json(upload.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::FORBIDDEN
        );

        let request = test::TestRequest::post()
            .uri("/api/covers")
            .insert_header(bearer(&admin))
            .set_json(upload)
            .to_request();
        let response: CoverUploadResponse = test::call_and_read_body_json(&app, request).await;
        let path = response
            .public_url
            .strip_prefix("http://covers.test")
            .unwrap()
            .to_string();
        assert!(path.starts_with("/covers/"));
        assert!(path.ends_with(".png"));

        let request = test::TestRequest::get().uri(&path).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
        assert_eq!(test::read_body(response).await, "png-bytes".as_bytes());

        let request = test::TestRequest::get()
            .uri("/covers/missing.png")
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn deleted_book_stays_deleted_when_review_cleanup_fails() {
        let state = AppState {
            reviews: Arc::new(TroubledReviews {
                failing_cascade: true,
                ..TroubledReviews::default()
            }),
            ..test_state()
        };
        let app = init_app!(state);
        let admin = signed_in(&state, ADMIN_EMAIL, "editor").await;
        let reader = signed_in(&state, "reader@example.com", "reader").await;
        let book_id = stored_book(&state, "Short lived", &[]).await;
        let request = review_request(&reader, book_id, Some(60), "ok").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CREATED
        );

        let request = test::TestRequest::delete()
            .uri(&format!("/api/book/{}", book_id))
            .insert_header(bearer(&admin))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);

        let request = test::TestRequest::get()
            .uri(&format!("/api/book/{}", book_id))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );
        let request = test::TestRequest::get().uri("/api/books").to_request();
        let page: CatalogPage = test::call_and_read_body_json(&app, request).await;
        assert_eq!(page.total_books, 0);
    }

    #[actix_web::test]
    async fn review_of_book_deleted_meanwhile_is_discarded() {
        let base = test_state();
        let reviews = Arc::new(TroubledReviews {
            vanishing_books: Some(base.books.clone()),
            ..TroubledReviews::default()
        });
        let state = AppState {
            reviews: reviews.clone(),
            ..base
        };
        let app = init_app!(state);
        let reader = signed_in(&state, "reader@example.com", "reader").await;
        let book_id = stored_book(&state, "Short lived", &[]).await;

        let request = review_request(&reader, book_id, Some(60), "ok").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::NOT_FOUND
        );
        assert!(reviews.inner.list_reviews(book_id).await.unwrap().is_empty());
    }
}
