use anyhow::{bail, Context};
use base64::Engine;
use reqwest::header::{AUTHORIZATION, LOCATION};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    BookDetailView, BookDetailsPatch, BookId, CatalogPage, CatalogQuery, CoverUpload,
    CoverUploadResponse, NewBook, Profile, ProfilePatch, ReviewId, ReviewSubmission,
    SessionContext, SessionToken, SignInRequest, SignUpRequest, SignUpResponse, UpsertOutcome,
    UserId,
};
use crate::validation::{
    parse_tags, validate_book_patch, validate_new_book, validate_profile_patch, validate_review,
    validate_sign_up, ValidationError,
};

/// Typed client of the review service.
/// Holds the bearer token of the signed in user, requests are validated locally first.
pub struct DoujinReviewClient {
    url: String,
    client: ClientWithMiddleware,
    token: parking_lot::RwLock<Option<String>>,
}

impl DoujinReviewClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            token: Default::default(),
        })
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.read().is_some()
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_ref() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Calls POST /api/auth/sign_up endpoint.
    /// Invalid input (e.g. empty display name) fails before anything is sent.
    pub async fn sign_up(&self, request: &SignUpRequest) -> anyhow::Result<UserId> {
        validate_sign_up(request)?;
        let response = self
            .client
            .post(format!("{}/api/auth/sign_up", self.url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to sign up {}", error)
        }
        let signed_up: SignUpResponse = response.json().await?;
        Ok(signed_up.user_id)
    }

    /// Calls POST /api/auth/sign_in endpoint, keeps the token for later calls
    pub async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<SessionToken> {
        let response = self
            .client
            .post(format!("{}/api/auth/sign_in", self.url))
            .json(&SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to sign in {}", error)
        }
        let session: SessionToken = response.json().await?;
        *self.token.write() = Some(session.token.clone());
        Ok(session)
    }

    /// Calls POST /api/auth/sign_out endpoint if there is a session, forgets the token either way
    pub async fn sign_out(&self) -> anyhow::Result<()> {
        let Some(token) = self.token.write().take() else {
            return Ok(());
        };
        let response = self
            .client
            .post(format!("{}/api/auth/sign_out", self.url))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;
        if !response.status().is_success() {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to sign out {}", error)
        }
        Ok(())
    }

    /// Calls GET /api/session endpoint
    /// None when not signed in or the session is no longer valid
    pub async fn session(&self) -> anyhow::Result<Option<SessionContext>> {
        if !self.is_signed_in() {
            return Ok(None);
        }
        let response = self
            .authorized(self.client.get(format!("{}/api/session", self.url)))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            *self.token.write() = None;
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to get session {}", error)
        }
    }

    /// Calls GET /api/books endpoint
    pub async fn list_books(&self, query: &CatalogQuery) -> anyhow::Result<CatalogPage> {
        let response = self
            .client
            .get(format!("{}/api/books", self.url))
            .query(query)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to list books {}", error)
        }
    }

    /// Calls GET /api/book/{book_id} endpoint
    /// None if the book is not in the catalog
    pub async fn get_book(&self, book_id: BookId) -> anyhow::Result<Option<BookDetailView>> {
        let response = self
            .client
            .get(format!("{}/api/book/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to get book {}", error)
        }
    }

    /// Calls POST /api/book endpoint
    /// Returns id of the registered book
    pub async fn add_book(&self, new_book: &NewBook) -> anyhow::Result<BookId> {
        validate_new_book(new_book)?;
        let response = self
            .authorized(self.client.post(format!("{}/api/book", self.url)))
            .json(new_book)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to add book {}", error)
        }

        let location_header = response
            .headers()
            .get(LOCATION)
            .context("No location header")?;

        location_header
            .to_str()
            .context("Failed to convert header to str")?
            .strip_prefix("/api/book/")
            .context("Invalid location header")?
            .parse()
            .context("Failed to parse book id")
    }

    /// Uploads the cover and registers the book pointing at it.
    /// Tags are given as typed by the user, comma separated.
    pub async fn register_book(
        &self,
        title: &str,
        tags_input: &str,
        cover_file_name: &str,
        cover_content: &[u8],
    ) -> anyhow::Result<BookId> {
        if title.trim().is_empty() {
            bail!(ValidationError::EmptyTitle)
        }
        if cover_content.is_empty() {
            bail!(ValidationError::MissingCover)
        }
        let cover_url = self.upload_cover(cover_file_name, cover_content).await?;
        self.add_book(&NewBook {
            title: title.trim().to_string(),
            cover_url,
            tags: parse_tags(tags_input),
        })
        .await
    }

    /// Calls PATCH /api/book/{book_id} endpoint
    /// Returns false if the book was not found
    pub async fn update_book(
        &self,
        book_id: BookId,
        patch: &BookDetailsPatch,
    ) -> anyhow::Result<bool> {
        validate_book_patch(patch)?;
        let response = self
            .authorized(
                self.client
                    .patch(format!("{}/api/book/{}", self.url, book_id)),
            )
            .json(patch)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to update book {}", error)
        }
    }

    /// Calls DELETE /api/book/{book_id} endpoint once `confirm` agrees.
    /// Returns false if not confirmed or the book was not found.
    pub async fn delete_book(
        &self,
        book_id: BookId,
        confirm: impl FnOnce() -> bool,
    ) -> anyhow::Result<bool> {
        if !confirm() {
            return Ok(false);
        }
        let response = self
            .authorized(
                self.client
                    .delete(format!("{}/api/book/{}", self.url, book_id)),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to delete book {}", error)
        }
    }

    /// Calls PUT /api/book/{book_id}/review endpoint
    /// Creates the review of the signed in user or overwrites the existing one
    pub async fn submit_review(
        &self,
        book_id: BookId,
        submission: &ReviewSubmission,
    ) -> anyhow::Result<UpsertOutcome> {
        validate_review(submission)?;
        let response = self
            .authorized(
                self.client
                    .put(format!("{}/api/book/{}/review", self.url, book_id)),
            )
            .json(submission)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to submit review {}", error)
        }
    }

    /// Calls DELETE /api/review/{review_id} endpoint once `confirm` agrees.
    /// Returns false if not confirmed or the review was not found.
    pub async fn delete_review(
        &self,
        review_id: ReviewId,
        confirm: impl FnOnce() -> bool,
    ) -> anyhow::Result<bool> {
        if !confirm() {
            return Ok(false);
        }
        let response = self
            .authorized(
                self.client
                    .delete(format!("{}/api/review/{}", self.url, review_id)),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to delete review {}", error)
        }
    }

    /// Calls GET /api/profile/{user_id} endpoint
    pub async fn get_profile(&self, user_id: UserId) -> anyhow::Result<Option<Profile>> {
        let response = self
            .client
            .get(format!("{}/api/profile/{}", self.url, user_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to get profile {}", error)
        }
    }

    /// Calls PATCH /api/profile/{user_id} endpoint, returns the updated profile
    pub async fn update_profile(
        &self,
        user_id: UserId,
        patch: &ProfilePatch,
    ) -> anyhow::Result<Profile> {
        validate_profile_patch(patch)?;
        let response = self
            .authorized(
                self.client
                    .patch(format!("{}/api/profile/{}", self.url, user_id)),
            )
            .json(patch)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to update profile {}", error)
        }
    }

    /// Calls POST /api/covers endpoint, returns public URL of the stored image
    pub async fn upload_cover(&self, file_name: &str, content: &[u8]) -> anyhow::Result<String> {
        let upload = CoverUpload {
            file_name: file_name.to_string(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(content),
        };
        let response = self
            .authorized(self.client.post(format!("{}/api/covers", self.url)))
            .json(&upload)
            .send()
            .await?;
        if response.status().is_success() {
            let uploaded: CoverUploadResponse = response.json().await?;
            Ok(uploaded.public_url)
        } else {
            let error: String = response.json().await.unwrap_or_default();
            bail!("Failed to upload cover {}", error)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use actix_web::web::Data;
    use actix_web::{App, HttpServer};
    use config::Environment;
    use paperclip::actix::OpenApiExt;

    use crate::app_config::config_app;
    use crate::settings::Settings;
    use crate::state::AppState;

    pub const ADMIN_EMAIL: &str = "editor@example.com";
    pub const PASSWORD: &str = "secret123";

    /// Serves the full API from in-memory state on a free local port, returns its URL
    pub fn spawn_test_server() -> (String, AppState) {
        let mut variables = config::Map::new();
        variables.insert("ADMIN_EMAILS".to_string(), ADMIN_EMAIL.to_string());
        let settings =
            Settings::from_environment(Environment::default().source(Some(variables))).unwrap();
        let state = AppState::in_memory(&settings);

        let app_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .wrap_api()
                .app_data(Data::new(app_state.clone()))
                .configure(config_app)
                .build()
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let port = server.addrs()[0].port();
        actix_web::rt::spawn(server.run());
        (format!("http://127.0.0.1:{}", port), state)
    }
}
