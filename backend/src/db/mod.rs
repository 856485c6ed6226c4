pub mod dynamodb_repository;
pub mod memory_repository;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Detection, Disease, NewDetection};

pub use dynamodb_repository::DynamoDbRepository;
pub use memory_repository::InMemoryRepository;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Page coordinates after falling back to defaults for missing or
/// non-positive input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let positive = |value: Option<i64>, default: u32| {
            value
                .filter(|v| *v > 0)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default)
        };
        Self {
            page: positive(page, DEFAULT_PAGE),
            page_size: positive(page_size, DEFAULT_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.page_size as usize)
    }

    /// Rows a newest-first reader must fetch to cover this page.
    pub fn window_end(&self) -> usize {
        self.offset().saturating_add(self.page_size as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub items: Vec<Detection>,
    pub total: u64,
    pub page: u32,
    pub pages: u32,
}

/// Sorts newest first and cuts out the requested page.
pub fn paginate(mut detections: Vec<Detection>, request: PageRequest) -> HistoryPage {
    // Stable sort keeps later inserts ahead on timestamp ties when the input
    // is newest-insert first.
    detections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = detections.len() as u64;
    page_window(detections, total, request)
}

/// Cuts the requested page out of the leading rows of an already
/// newest-first listing whose full length is `total`.
pub fn page_window(newest_first: Vec<Detection>, total: u64, request: PageRequest) -> HistoryPage {
    let pages = total.div_ceil(request.page_size as u64) as u32;
    let items = newest_first
        .into_iter()
        .skip(request.offset())
        .take(request.page_size as usize)
        .collect();

    HistoryPage {
        items,
        total,
        page: request.page,
        pages,
    }
}

#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Assigns id and creation time, then persists.
    async fn create(&self, detection: NewDetection) -> Result<Detection, RepositoryError>;

    async fn history(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<HistoryPage, RepositoryError>;

    /// Ownership is the caller's concern.
    async fn get(&self, id: Uuid) -> Result<Option<Detection>, RepositoryError>;
}

#[async_trait]
pub trait DiseaseCatalog: Send + Sync {
    async fn find_by_model_label(&self, label: &str) -> Result<Option<Disease>, RepositoryError>;

    async fn get_disease(&self, id: Uuid) -> Result<Option<Disease>, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_falls_back_to_defaults() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, page_size: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(-3)), PageRequest { page: 1, page_size: 10 });
        assert_eq!(PageRequest::new(Some(2), Some(5)), PageRequest { page: 2, page_size: 5 });
        assert_eq!(PageRequest::new(Some(2), Some(5)).offset(), 5);
        assert_eq!(PageRequest::new(Some(2), Some(5)).window_end(), 10);
    }

    fn scans(count: usize) -> Vec<Detection> {
        let user_id = Uuid::new_v4();
        let start = chrono::Utc::now();
        (0..count)
            .map(|i| Detection {
                id: Uuid::new_v4(),
                user_id,
                image_url: String::new(),
                image_hash: String::new(),
                predicted_label: format!("scan-{i}"),
                predicted_disease: None,
                confidence: 0.5,
                status: shared::DetectionStatus::Unknown,
                predictions: vec![],
                crop_id: None,
                notes: None,
                location: None,
                platform: shared::Platform::Web,
                created_at: start + chrono::Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn leading_window_pages_like_the_full_listing() {
        let request = PageRequest::new(Some(2), Some(5));
        let full = paginate(scans(12), request);

        let mut newest_first = scans(12);
        newest_first.reverse();
        let window: Vec<_> = newest_first.into_iter().take(request.window_end()).collect();
        let labels = |page: &HistoryPage| {
            page.items
                .iter()
                .map(|d| d.predicted_label.clone())
                .collect::<Vec<_>>()
        };

        let windowed = page_window(window, 12, request);
        assert_eq!(labels(&windowed), labels(&full));
        assert_eq!(labels(&windowed), ["scan-6", "scan-5", "scan-4", "scan-3", "scan-2"]);
        assert_eq!((windowed.total, windowed.pages), (12, 3));
    }

    #[test]
    fn window_past_the_end_is_empty_but_keeps_totals() {
        let page = page_window(scans(3), 12, PageRequest::new(Some(4), Some(5)));
        assert!(page.items.is_empty());
        assert_eq!((page.total, page.page, page.pages), (12, 4, 3));
    }
}
