use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Statement};

use crate::accounts_repository::{Account, AccountsRepository, AccountsRepositoryError};
use crate::api::UserId;
use crate::postgres::{connect, PostgresConfig};

const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS accounts (
            id              SERIAL PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL
            )
        ";

pub struct PostgresAccountsRepository {
    client: Client,
}

impl PostgresAccountsRepository {
    pub async fn init(config: &PostgresConfig) -> anyhow::Result<Self> {
        let client = connect(config, SCHEMA).await?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl AccountsRepository for PostgresAccountsRepository {
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserId, AccountsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO accounts (email, password_hash) VALUES ($1, $2) RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&email, &password_hash])
            .await;

        match rows {
            Ok(rows) => Ok(rows
                .first()
                .ok_or_else(|| AccountsRepositoryError::Other("Id not returned".to_string()))?
                .try_get(0)?),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(AccountsRepositoryError::EmailTaken(email.to_string()))
            }
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, AccountsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, password_hash FROM accounts WHERE email = $1")
            .await?;
        let rows = self.client.query(&stmt, &[&email]).await?;

        rows.first()
            .map(|row| {
                Ok(Account {
                    user_id: row.try_get(0)?,
                    email: email.to_string(),
                    password_hash: row.try_get(1)?,
                })
            })
            .transpose()
    }

    async fn delete_account(&self, user_id: UserId) -> Result<bool, AccountsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM accounts WHERE id = $1")
            .await?;
        Ok(self.client.execute(&stmt, &[&user_id]).await? > 0)
    }
}
