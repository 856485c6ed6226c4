use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{Folder, StorageAdapter, StorageError, StoredObject, generate_object_key};
use crate::upload::extension_for;

/// Keeps images inside the record itself as `data:` URLs.
#[derive(Debug, Clone, Default)]
pub struct InlineStore;

impl InlineStore {
    pub fn new() -> Self {
        Self
    }

    pub fn data_url(bytes: &[u8], mime_type: &str) -> String {
        format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
    }
}

#[async_trait]
impl StorageAdapter for InlineStore {
    async fn put(
        &self,
        bytes: &[u8],
        mime_type: &str,
        folder: Folder,
    ) -> Result<StoredObject, StorageError> {
        Ok(StoredObject {
            key: generate_object_key(folder, extension_for(mime_type)),
            url: Self::data_url(bytes, mime_type),
        })
    }

    async fn delete(&self, _url: &str) {
        log::debug!("Inline store has nothing to delete");
    }

    fn name(&self) -> &str {
        "inline"
    }
}
