use std::path::PathBuf;

use anyhow::Context;
use config::{Config, Environment};
use serde::Deserialize;

use crate::postgres::PostgresConfig;

/// Service settings read from environment variables (`PORT`, `DB_HOST`, `ADMIN_EMAILS`...)
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    pub use_in_memory_db: bool,
    pub db_host: String,
    pub db_username: String,
    pub db_password: String,
    pub covers_dir: PathBuf,
    /// Base of the URLs handed out for uploaded covers
    pub public_url: String,
    /// Accounts signing up with one of these e-mails get the admin role
    pub admin_emails: Vec<String>,
    pub jaeger_enabled: bool,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_environment(Environment::default())
    }

    pub fn from_environment(environment: Environment) -> anyhow::Result<Self> {
        Config::builder()
            .set_default("bind_address", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("use_in_memory_db", false)?
            .set_default("db_host", "127.0.0.1")?
            .set_default("db_username", "postgres")?
            .set_default("db_password", "postgres")?
            .set_default("covers_dir", "./covers")?
            .set_default("public_url", "http://localhost:8080")?
            .set_default("admin_emails", Vec::<String>::new())?
            .set_default("jaeger_enabled", false)?
            .add_source(
                environment
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admin_emails"),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            hostname: self.db_host.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
        }
    }
}
