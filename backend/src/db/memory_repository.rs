use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    DetectionStore, DiseaseCatalog, HistoryPage, PageRequest, RepositoryError, paginate,
};
use crate::models::{Detection, Disease, NewDetection};

/// Process-local store for development runs and tests.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    detections: Arc<RwLock<Vec<Detection>>>,
    diseases: Arc<RwLock<Vec<Disease>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diseases(diseases: Vec<Disease>) -> Self {
        Self {
            detections: Arc::default(),
            diseases: Arc::new(RwLock::new(diseases)),
        }
    }

    pub async fn insert_disease(&self, disease: Disease) {
        self.diseases.write().await.push(disease);
    }

    pub async fn detection_count(&self) -> usize {
        self.detections.read().await.len()
    }
}

#[async_trait]
impl DetectionStore for InMemoryRepository {
    async fn create(&self, detection: NewDetection) -> Result<Detection, RepositoryError> {
        let detection = detection.into_detection(Uuid::new_v4(), Utc::now());
        self.detections.write().await.push(detection.clone());
        Ok(detection)
    }

    async fn history(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<HistoryPage, RepositoryError> {
        let owned = self
            .detections
            .read()
            .await
            .iter()
            .rev()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        Ok(paginate(owned, request))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Detection>, RepositoryError> {
        Ok(self
            .detections
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }
}

#[async_trait]
impl DiseaseCatalog for InMemoryRepository {
    async fn find_by_model_label(&self, label: &str) -> Result<Option<Disease>, RepositoryError> {
        Ok(self
            .diseases
            .read()
            .await
            .iter()
            .find(|d| d.model_label == label)
            .cloned())
    }

    async fn get_disease(&self, id: Uuid) -> Result<Option<Disease>, RepositoryError> {
        Ok(self
            .diseases
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }
}
