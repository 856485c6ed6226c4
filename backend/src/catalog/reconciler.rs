use std::sync::Arc;

use crate::db::{DiseaseCatalog, RepositoryError};
use crate::models::Disease;

/// Maps a raw classifier label onto a curated disease by exact `modelLabel`.
#[derive(Clone)]
pub struct DiseaseReconciler {
    catalog: Arc<dyn DiseaseCatalog>,
}

impl DiseaseReconciler {
    pub fn new(catalog: Arc<dyn DiseaseCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn resolve(&self, raw_label: &str) -> Result<Option<Disease>, RepositoryError> {
        if raw_label.is_empty() {
            return Ok(None);
        }
        self.catalog.find_by_model_label(raw_label).await
    }
}
