use serde::Serialize;
use shared::{DetectionStatus, Prediction};

use crate::models::{Detection, Disease, DiseaseSummary, Medicine, Severity};

/// What the classifier said, whether or not it matched the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Findings {
    pub disease: String,
    pub confidence: f64,
    pub status: DetectionStatus,
    pub predictions: Vec<Prediction>,
}

/// Knowledge-base projection attached to a matched label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrichment {
    pub recommendations: Vec<String>,
    pub medicines: Vec<Medicine>,
    pub severity: Severity,
    pub symptoms: Vec<String>,
}

impl From<&Disease> for Enrichment {
    fn from(disease: &Disease) -> Self {
        Self {
            recommendations: disease.prevention.clone(),
            medicines: disease.medicines(),
            severity: disease.severity,
            symptoms: disease.symptoms.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectionResult {
    Matched {
        #[serde(flatten)]
        findings: Findings,
        #[serde(flatten)]
        enrichment: Enrichment,
    },
    Unmatched {
        #[serde(flatten)]
        findings: Findings,
    },
}

impl DetectionResult {
    pub fn findings(&self) -> &Findings {
        match self {
            DetectionResult::Matched { findings, .. } | DetectionResult::Unmatched { findings } => {
                findings
            }
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, DetectionResult::Matched { .. })
    }
}

/// Body of a completed `POST /detect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResponse {
    pub success: bool,
    pub data: Detection,
    #[serde(flatten)]
    pub result: DetectionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub detection: Detection,
    pub disease: Option<DiseaseSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub total: u64,
    pub page: u32,
    pub pages: u32,
    pub data: Vec<HistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResponse {
    pub success: bool,
    pub data: Detection,
    pub disease: Option<Disease>,
}
