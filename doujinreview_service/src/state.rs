use std::sync::Arc;

use crate::accounts_repository::{
    AccountsRepository, InMemoryAccountsRepository, PostgresAccountsRepository,
};
use crate::auth::AuthService;
use crate::books_repository::{BookRepository, InMemoryBookRepository, PostgresBooksRepository};
use crate::cover_storage::{CoverStorage, InMemoryCoverStorage, LocalCoverStorage};
use crate::profiles_repository::{
    InMemoryProfilesRepository, PostgresProfilesRepository, ProfilesRepository,
};
use crate::reviews_repository::{
    InMemoryReviewsRepository, PostgresReviewsRepository, ReviewsRepository,
};
use crate::settings::Settings;

/// Everything the handlers need, shared between the actix workers
#[derive(Clone)]
pub struct AppState {
    pub books: Arc<dyn BookRepository>,
    pub reviews: Arc<dyn ReviewsRepository>,
    pub profiles: Arc<dyn ProfilesRepository>,
    pub covers: Arc<dyn CoverStorage>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Fully in-memory state, covers included
    pub fn in_memory(settings: &Settings) -> Self {
        let profiles: Arc<dyn ProfilesRepository> = Arc::new(InMemoryProfilesRepository::default());
        let accounts: Arc<dyn AccountsRepository> = Arc::new(InMemoryAccountsRepository::default());
        Self {
            books: Arc::new(InMemoryBookRepository::default()),
            reviews: Arc::new(InMemoryReviewsRepository::default()),
            auth: Arc::new(AuthService::new(
                accounts,
                profiles.clone(),
                &settings.admin_emails,
            )),
            profiles,
            covers: Arc::new(InMemoryCoverStorage::new(&settings.public_url)),
        }
    }

    /// Repositories selected by `use_in_memory_db`, covers kept in `covers_dir`
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let covers: Arc<dyn CoverStorage> = Arc::new(
            LocalCoverStorage::init(settings.covers_dir.clone(), &settings.public_url).await?,
        );
        if settings.use_in_memory_db {
            tracing::info!("Using in-memory repositories");
            return Ok(Self {
                covers,
                ..Self::in_memory(settings)
            });
        }

        let postgres_config = settings.postgres_config();
        let profiles: Arc<dyn ProfilesRepository> =
            Arc::new(PostgresProfilesRepository::init(&postgres_config).await?);
        let accounts: Arc<dyn AccountsRepository> =
            Arc::new(PostgresAccountsRepository::init(&postgres_config).await?);
        Ok(Self {
            books: Arc::new(PostgresBooksRepository::init(&postgres_config).await?),
            reviews: Arc::new(PostgresReviewsRepository::init(&postgres_config).await?),
            auth: Arc::new(AuthService::new(
                accounts,
                profiles.clone(),
                &settings.admin_emails,
            )),
            profiles,
            covers,
        })
    }
}
