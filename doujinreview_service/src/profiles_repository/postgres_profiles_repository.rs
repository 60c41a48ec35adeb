use std::collections::HashMap;

use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Statement};

use crate::api::{Profile, ProfilePatch, Role, UserId};
use crate::postgres::{connect, PostgresConfig};
use crate::profiles_repository::{ProfilesRepository, ProfilesRepositoryError};

const SCHEMA: &str = "
        CREATE TABLE IF NOT EXISTS profiles (
            id              INTEGER PRIMARY KEY,
            display_name    TEXT NOT NULL,
            bio             TEXT NOT NULL DEFAULT '',
            role            TEXT NOT NULL DEFAULT 'user'
            )
        ";

pub struct PostgresProfilesRepository {
    client: Client,
}

impl PostgresProfilesRepository {
    pub async fn init(config: &PostgresConfig) -> anyhow::Result<Self> {
        let client = connect(config, SCHEMA).await?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ProfilesRepository for PostgresProfilesRepository {
    async fn create_profile(&self, profile: Profile) -> Result<(), ProfilesRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO profiles (id, display_name, bio, role) VALUES ($1, $2, $3, $4)")
            .await?;

        let result = self
            .client
            .execute(
                &stmt,
                &[
                    &profile.user_id,
                    &profile.display_name,
                    &profile.bio,
                    &profile.role.as_str(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(ProfilesRepositoryError::AlreadyExists(profile.user_id))
            }
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Profile, ProfilesRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT display_name, bio, role FROM profiles WHERE id = $1")
            .await?;
        let rows = self.client.query(&stmt, &[&user_id]).await?;
        let row = rows
            .first()
            .ok_or(ProfilesRepositoryError::NotFound(user_id))?;

        let role: String = row.try_get(2)?;
        Ok(Profile {
            user_id,
            display_name: row.try_get(0)?,
            bio: row.try_get(1)?,
            role: role
                .parse::<Role>()
                .map_err(ProfilesRepositoryError::InvalidRole)?,
        })
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        patch: ProfilePatch,
    ) -> Result<bool, ProfilesRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE profiles SET \
                 display_name = COALESCE($1, display_name), \
                 bio = COALESCE($2, bio) \
                 WHERE id = $3",
            )
            .await?;
        let updated = self
            .client
            .execute(&stmt, &[&patch.display_name, &patch.bio, &user_id])
            .await?;
        Ok(updated > 0)
    }

    async fn display_names(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, ProfilesRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT id, display_name FROM profiles WHERE id = ANY($1)")
            .await?;
        let rows = self.client.query(&stmt, &[&user_ids]).await?;
        rows.iter()
            .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
            .collect()
    }
}
