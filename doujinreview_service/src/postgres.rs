use anyhow::Context;
use tokio_postgres::{Client, NoTls};

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

/// Connects and runs the schema setup of a repository
pub async fn connect(config: &PostgresConfig, schema: &str) -> anyhow::Result<Client> {
    let connection_str = format!(
        "postgresql://{}:{}@{}",
        config.username, config.password, config.hostname
    );
    tracing::info!(
        "Connecting to postgres at {} as {}",
        config.hostname,
        config.username
    );
    let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
        .await
        .context("Failed to start postgres")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Postgres connection error: {}", e);
        }
    });

    client
        .batch_execute(schema)
        .await
        .context("Failed to setup tables")?;
    Ok(client)
}
