pub mod inline;
pub mod s3_service;

use async_trait::async_trait;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

pub use inline::InlineStore;
pub use s3_service::S3Service;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Invalid object URL: {0}")]
    InvalidUrl(String),
}

/// Logical namespace inside the one configured store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Folder {
    Scans,
    Profiles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn put(
        &self,
        bytes: &[u8],
        mime_type: &str,
        folder: Folder,
    ) -> Result<StoredObject, StorageError>;

    /// Best-effort removal; failures are logged and swallowed.
    async fn delete(&self, url: &str);

    fn name(&self) -> &str;
}

/// `folder/<uuid><ext>`; a fresh v4 id per call keeps keys unique without locking.
pub fn generate_object_key(folder: Folder, extension: &str) -> String {
    format!("{}/{}{}", folder, Uuid::new_v4(), extension)
}
