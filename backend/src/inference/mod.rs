pub mod invoker;
pub mod temp_file;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use shared::ClassifierOutput;

pub use invoker::SubprocessClassifier;
pub use temp_file::ScopedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to invoke classifier: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{message}")]
    Exit { code: Option<i32>, message: String },
    #[error("Malformed classifier output: {raw}")]
    Malformed { raw: String },
    #[error("{0}")]
    Reported(String),
    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to stage image for classifier: {0}")]
    Staging(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub enum InferenceOutcome {
    Predicted(ClassifierOutput),
    /// No model artifact on disk; nothing was run.
    ModelMissing,
}

/// Path in, payload out. The pipeline only sees this seam.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, image_path: &Path) -> Result<InferenceOutcome, InferenceError>;
}
