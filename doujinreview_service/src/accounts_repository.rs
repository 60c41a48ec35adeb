pub use in_memory_accounts_repository::InMemoryAccountsRepository;
pub use postgres_accounts_repository::PostgresAccountsRepository;

use crate::api::UserId;

mod in_memory_accounts_repository;
mod postgres_accounts_repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    /// Normalized (trimmed, lowercase)
    pub email: String,
    /// Argon2 hash in PHC string format, salt and parameters included
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountsRepositoryError {
    #[error("Account with e-mail {0} already exists")]
    EmailTaken(String),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait AccountsRepository: Send + Sync {
    /// Creates an account, returns the id that is shared with the profile
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserId, AccountsRepositoryError>;

    async fn find_account(&self, email: &str) -> Result<Option<Account>, AccountsRepositoryError>;

    /// Returns false if there was no such account
    async fn delete_account(&self, user_id: UserId) -> Result<bool, AccountsRepositoryError>;
}
