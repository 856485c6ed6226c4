use std::path::PathBuf;
use std::sync::Arc;

use shared::{ClassifierOutput, DetectionStatus, GeoLocation, Platform};
use strum_macros::Display;
use uuid::Uuid;

use super::response::{DetectionResult, Enrichment, Findings, ScanResponse};
use crate::catalog::DiseaseReconciler;
use crate::db::{DetectionStore, RepositoryError};
use crate::inference::{Classifier, InferenceError, InferenceOutcome, ScopedTempFile};
use crate::models::{Disease, NewDetection};
use crate::storage::{Folder, StorageAdapter, StorageError};
use crate::upload::AcceptedImage;

pub const PENDING_ANALYSIS: &str = "Pending analysis";
pub const MODEL_MISSING_MESSAGE: &str =
    "AI model not loaded. Place the model file at the configured MODEL_PATH to enable predictions.";
pub const INFERENCE_FAILED_MESSAGE: &str =
    "The image was saved but could not be analysed yet. It is marked as pending analysis.";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image upload failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to save detection: {0}")]
    Persistence(#[source] RepositoryError),
}

/// Whether a disease's `confidence_threshold` gates the reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    #[default]
    Ignore,
    /// Below-threshold matches are reported as `unknown`.
    Enforce,
}

impl ThresholdPolicy {
    pub fn from_flag(enforce: bool) -> Self {
        if enforce {
            ThresholdPolicy::Enforce
        } else {
            ThresholdPolicy::Ignore
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum PipelineStage {
    Accepted,
    Uploading,
    Inferring,
    InferenceSkipped,
    Reconciling,
    Persisting,
    Responded,
}

/// Forward-only stage tracking for one run.
struct Progress {
    scan_id: Uuid,
    stage: PipelineStage,
}

impl Progress {
    fn start(scan_id: Uuid) -> Self {
        log::debug!("scan {}: {}", scan_id, PipelineStage::Accepted);
        Self {
            scan_id,
            stage: PipelineStage::Accepted,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(next > self.stage, "{} -> {}", self.stage, next);
        log::debug!("scan {}: {} -> {}", self.scan_id, self.stage, next);
        self.stage = next;
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub user_id: Uuid,
    pub image: AcceptedImage,
    pub platform: Platform,
    pub location: Option<GeoLocation>,
    pub notes: Option<String>,
    pub crop_id: Option<Uuid>,
}

enum Analysis {
    Predicted(ClassifierOutput),
    Skipped,
    Failed,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    storage: Arc<dyn StorageAdapter>,
    classifier: Arc<dyn Classifier>,
    reconciler: DiseaseReconciler,
    store: Arc<dyn DetectionStore>,
    threshold_policy: ThresholdPolicy,
    temp_dir: PathBuf,
}

impl DetectionPipeline {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        classifier: Arc<dyn Classifier>,
        reconciler: DiseaseReconciler,
        store: Arc<dyn DetectionStore>,
    ) -> Self {
        Self {
            storage,
            classifier,
            reconciler,
            store,
            threshold_policy: ThresholdPolicy::default(),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_threshold_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.threshold_policy = policy;
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    pub async fn run(&self, request: ScanRequest) -> Result<ScanResponse, PipelineError> {
        let mut progress = Progress::start(Uuid::new_v4());
        let image = &request.image;

        progress.advance(PipelineStage::Uploading);
        let stored = self
            .storage
            .put(&image.bytes, &image.mime_type, Folder::Scans)
            .await
            .map_err(|e| {
                log::error!("Upload to {} store failed for user {}: {}", self.storage.name(), request.user_id, e);
                e
            })?;

        let analysis = self.analyze(image, &mut progress).await;

        progress.advance(PipelineStage::Reconciling);
        let disease = match &analysis {
            Analysis::Predicted(output) => self.reconcile(&output.disease).await,
            Analysis::Skipped | Analysis::Failed => None,
        };

        let (findings, message) = match &analysis {
            Analysis::Predicted(output) => (self.findings(output, disease.as_ref()), None),
            Analysis::Skipped => (pending_findings(), Some(MODEL_MISSING_MESSAGE)),
            Analysis::Failed => (pending_findings(), Some(INFERENCE_FAILED_MESSAGE)),
        };

        progress.advance(PipelineStage::Persisting);
        let new_detection = NewDetection {
            user_id: request.user_id,
            image_url: stored.url.clone(),
            image_hash: image.sha256_hex(),
            predicted_label: match &analysis {
                Analysis::Predicted(output) => output.disease.clone(),
                _ => String::new(),
            },
            predicted_disease: disease.as_ref().map(|d| d.id),
            confidence: findings.confidence,
            status: findings.status,
            predictions: findings.predictions.clone(),
            crop_id: request.crop_id,
            notes: request.notes.clone(),
            location: request.location,
            platform: request.platform,
        };

        let detection = match self.store.create(new_detection).await {
            Ok(detection) => detection,
            Err(e) => {
                log::error!("Failed to persist detection for user {}: {}", request.user_id, e);
                self.storage.delete(&stored.url).await;
                return Err(PipelineError::Persistence(e));
            }
        };

        progress.advance(PipelineStage::Responded);
        let result = match disease {
            Some(disease) => DetectionResult::Matched {
                findings,
                enrichment: Enrichment::from(&disease),
            },
            None => DetectionResult::Unmatched { findings },
        };

        Ok(ScanResponse {
            success: true,
            data: detection,
            result,
            message: message.map(str::to_string),
        })
    }

    /// Stages the bytes on disk and runs the classifier. Every failure here is
    /// absorbed; the temp file is gone by the time this returns.
    async fn analyze(&self, image: &AcceptedImage, progress: &mut Progress) -> Analysis {
        let staged = match ScopedTempFile::write(&self.temp_dir, image.extension, &image.bytes).await {
            Ok(staged) => staged,
            Err(e) => {
                progress.advance(PipelineStage::InferenceSkipped);
                log::warn!("scan {}: {}", progress.scan_id, InferenceError::Staging(e));
                return Analysis::Failed;
            }
        };

        progress.advance(PipelineStage::Inferring);
        match self.classifier.predict(staged.path()).await {
            Ok(InferenceOutcome::Predicted(output)) => Analysis::Predicted(output),
            Ok(InferenceOutcome::ModelMissing) => {
                progress.advance(PipelineStage::InferenceSkipped);
                Analysis::Skipped
            }
            Err(e) => {
                log::warn!("scan {}: inference failed, recording as pending: {}", progress.scan_id, e);
                Analysis::Failed
            }
        }
    }

    async fn reconcile(&self, label: &str) -> Option<Disease> {
        match self.reconciler.resolve(label).await {
            Ok(disease) => disease,
            Err(e) => {
                log::warn!("Disease lookup for label {:?} failed, continuing unmatched: {}", label, e);
                None
            }
        }
    }

    fn findings(&self, output: &ClassifierOutput, disease: Option<&Disease>) -> Findings {
        let mut status = output.status;
        if let (ThresholdPolicy::Enforce, Some(disease)) = (self.threshold_policy, disease) {
            if output.confidence < disease.confidence_threshold {
                log::info!(
                    "Confidence {:.4} below {} threshold {:.2}, reporting unknown",
                    output.confidence,
                    disease.model_label,
                    disease.confidence_threshold
                );
                status = DetectionStatus::Unknown;
            }
        }

        Findings {
            disease: if output.disease.is_empty() {
                PENDING_ANALYSIS.to_string()
            } else {
                output.disease.clone()
            },
            confidence: output.confidence,
            status,
            predictions: output.predictions.clone(),
        }
    }
}

fn pending_findings() -> Findings {
    Findings {
        disease: PENDING_ANALYSIS.to_string(),
        confidence: 0.0,
        status: DetectionStatus::Unknown,
        predictions: Vec::new(),
    }
}
