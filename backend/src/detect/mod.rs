pub mod pipeline;
pub mod response;

pub use pipeline::{DetectionPipeline, PipelineError, PipelineStage, ScanRequest, ThresholdPolicy};
pub use response::{DetectionResponse, DetectionResult, HistoryItem, HistoryResponse, ScanResponse};
