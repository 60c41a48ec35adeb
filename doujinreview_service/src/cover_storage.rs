use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;

use crate::clock::now_millis;

#[derive(Debug, thiserror::Error)]
pub enum CoverStorageError {
    #[error("Invalid cover name {0}")]
    InvalidName(String),

    #[error("Cover {0} not found")]
    NotFound(String),

    #[error("Cover storage io failure {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
pub trait CoverStorage: Send + Sync {
    /// Stores the blob under the given name, returns its public URL
    async fn upload(&self, name: &str, content: Vec<u8>) -> Result<String, CoverStorageError>;

    async fn read(&self, name: &str) -> Result<Vec<u8>, CoverStorageError>;
}

/// Name the cover is stored under: upload time plus the extension of the original file
pub fn stored_cover_name(original_file_name: &str) -> String {
    let extension = original_file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_lowercase())
        .filter(|extension| {
            !extension.is_empty() && extension.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", now_millis(), extension)
}

pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, extension)| extension) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn check_name(name: &str) -> Result<(), CoverStorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(CoverStorageError::InvalidName(name.to_string()))
    }
}

fn public_url(public_base_url: &str, name: &str) -> String {
    format!("{}/covers/{}", public_base_url.trim_end_matches('/'), name)
}

pub struct InMemoryCoverStorage {
    public_base_url: String,
    covers: parking_lot::RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryCoverStorage {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            public_base_url: public_base_url.to_string(),
            covers: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl CoverStorage for InMemoryCoverStorage {
    async fn upload(&self, name: &str, content: Vec<u8>) -> Result<String, CoverStorageError> {
        check_name(name)?;
        self.covers.write().insert(name.to_string(), content);
        Ok(public_url(&self.public_base_url, name))
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, CoverStorageError> {
        check_name(name)?;
        self.covers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoverStorageError::NotFound(name.to_string()))
    }
}

/// Keeps covers as files in a local directory
pub struct LocalCoverStorage {
    directory: PathBuf,
    public_base_url: String,
}

impl LocalCoverStorage {
    pub async fn init(directory: PathBuf, public_base_url: &str) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Failed to create covers directory {}", directory.display()))?;
        Ok(Self {
            directory,
            public_base_url: public_base_url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl CoverStorage for LocalCoverStorage {
    async fn upload(&self, name: &str, content: Vec<u8>) -> Result<String, CoverStorageError> {
        check_name(name)?;
        tokio::fs::write(self.directory.join(name), content).await?;
        tracing::info!("Stored cover {}", name);
        Ok(public_url(&self.public_base_url, name))
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, CoverStorageError> {
        check_name(name)?;
        match tokio::fs::read(self.directory.join(name)).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CoverStorageError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod cover_storage_tests {
    use super::*;

    #[test]
    fn stored_name_keeps_extension_only() {
        let name = stored_cover_name("My Cover.PNG");
        assert!(name.ends_with(".png"));
        assert!(name.trim_end_matches(".png").chars().all(|c| c.is_ascii_digit()));

        assert!(stored_cover_name("no_extension").ends_with(".bin"));
        assert!(stored_cover_name("../../etc/passwd").ends_with(".bin"));
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("1.jpg"), "image/jpeg");
        assert_eq!(content_type_for("1.webp"), "image/webp");
        assert_eq!(content_type_for("1.bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn in_memory_upload_and_read() {
        let storage = InMemoryCoverStorage::new("http://localhost:8080/");
        let url = storage.upload("1.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(url, "http://localhost:8080/covers/1.png");
        assert_eq!(storage.read("1.png").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            storage.read("2.png").await,
            Err(CoverStorageError::NotFound(..))
        ));
        assert!(matches!(
            storage.upload("../x.png", vec![]).await,
            Err(CoverStorageError::InvalidName(..))
        ));
    }

    #[tokio::test]
    async fn local_directory_upload_and_read() {
        let directory = std::env::temp_dir().join(format!("covers-{}", uuid::Uuid::new_v4()));
        let storage = LocalCoverStorage::init(directory.clone(), "http://covers.local")
            .await
            .unwrap();

        let url = storage.upload("7.jpg", b"jpeg".to_vec()).await.unwrap();
        assert_eq!(url, "http://covers.local/covers/7.jpg");
        assert_eq!(storage.read("7.jpg").await.unwrap(), b"jpeg".to_vec());
        assert!(matches!(
            storage.read("8.jpg").await,
            Err(CoverStorageError::NotFound(..))
        ));

        tokio::fs::remove_dir_all(directory).await.unwrap();
    }
}
