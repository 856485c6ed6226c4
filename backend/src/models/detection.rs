use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{DetectionStatus, GeoLocation, Platform, Prediction};
use uuid::Uuid;

/// One scan attempt and its outcome. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_url: String,
    pub image_hash: String,
    pub predicted_label: String,
    /// Weak reference; resolve through the disease catalog.
    pub predicted_disease: Option<Uuid>,
    pub confidence: f64,
    pub status: DetectionStatus,
    pub predictions: Vec<Prediction>,
    pub crop_id: Option<Uuid>,
    pub notes: Option<String>,
    pub location: Option<GeoLocation>,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
}

/// A detection before the store has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    pub user_id: Uuid,
    pub image_url: String,
    pub image_hash: String,
    pub predicted_label: String,
    pub predicted_disease: Option<Uuid>,
    pub confidence: f64,
    pub status: DetectionStatus,
    pub predictions: Vec<Prediction>,
    pub crop_id: Option<Uuid>,
    pub notes: Option<String>,
    pub location: Option<GeoLocation>,
    pub platform: Platform,
}

impl NewDetection {
    pub fn into_detection(self, id: Uuid, created_at: DateTime<Utc>) -> Detection {
        Detection {
            id,
            user_id: self.user_id,
            image_url: self.image_url,
            image_hash: self.image_hash,
            predicted_label: self.predicted_label,
            predicted_disease: self.predicted_disease,
            confidence: self.confidence.clamp(0.0, 1.0),
            status: self.status,
            predictions: self.predictions,
            crop_id: self.crop_id,
            notes: self.notes,
            location: self.location,
            platform: self.platform,
            created_at,
        }
    }
}

impl Detection {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}
