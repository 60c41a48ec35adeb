use std::collections::HashMap;

pub use in_memory_profiles_repository::InMemoryProfilesRepository;
pub use postgres_profiles_repository::PostgresProfilesRepository;

use crate::api::{Profile, ProfilePatch, UserId};

mod in_memory_profiles_repository;
mod postgres_profiles_repository;

#[derive(Debug, thiserror::Error)]
pub enum ProfilesRepositoryError {
    #[error("Profile {0} not found")]
    NotFound(UserId),

    #[error("Profile {0} already exists")]
    AlreadyExists(UserId),

    #[error("Stored role is invalid: {0}")]
    InvalidRole(String),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),
}

#[async_trait::async_trait]
pub trait ProfilesRepository: Send + Sync {
    async fn create_profile(&self, profile: Profile) -> Result<(), ProfilesRepositoryError>;

    async fn get_profile(&self, user_id: UserId) -> Result<Profile, ProfilesRepositoryError>;

    /// Returns false if the profile was not found
    async fn update_profile(
        &self,
        user_id: UserId,
        patch: ProfilePatch,
    ) -> Result<bool, ProfilesRepositoryError>;

    /// Display names of the given users, unknown users are skipped
    async fn display_names(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, ProfilesRepositoryError>;
}
