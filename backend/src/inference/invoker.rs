use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared::ClassifierOutput;
use tokio::process::Command;
use tokio::sync::Semaphore;

use super::{Classifier, InferenceError, InferenceOutcome};
use crate::config::InferenceSettings;

/// Runs the external classifier as `<program> [args..] <absolute-image-path>`,
/// one process per call. The semaphore bounds how many run at once.
#[derive(Clone)]
pub struct SubprocessClassifier {
    program: String,
    args: Vec<String>,
    model_path: PathBuf,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl SubprocessClassifier {
    pub fn new(settings: &InferenceSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            model_path: settings.model_path.clone(),
            timeout: settings.timeout,
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    async fn model_present(&self) -> bool {
        tokio::fs::try_exists(&self.model_path).await.unwrap_or(false)
    }
}

#[async_trait]
impl Classifier for SubprocessClassifier {
    async fn predict(&self, image_path: &Path) -> Result<InferenceOutcome, InferenceError> {
        if !self.model_present().await {
            log::info!(
                "Model artifact {} not found, skipping inference",
                self.model_path.display()
            );
            return Ok(InferenceOutcome::ModelMissing);
        }

        let image_path = std::path::absolute(image_path).unwrap_or_else(|_| image_path.to_path_buf());

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| InferenceError::Spawn(std::io::Error::other("inference queue closed")))?;

        log::debug!("Spawning classifier {} for {}", self.program, image_path.display());
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&image_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(InferenceError::Spawn)?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| InferenceError::Timeout(self.timeout))?
            .map_err(InferenceError::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        interpret_output(output.status.success(), output.status.code(), &stdout, &stderr)
            .map(InferenceOutcome::Predicted)
    }
}

/// Applies the classifier's exit/output contract.
pub fn interpret_output(
    success: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<ClassifierOutput, InferenceError> {
    let stdout = stdout.trim();

    if !success {
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return Err(InferenceError::Exit {
                code,
                message: stderr.to_string(),
            });
        }
        let reported = serde_json::from_str::<serde_json::Value>(stdout)
            .ok()
            .and_then(|value| reported_error(&value));
        if let Some(reported) = reported {
            return Err(InferenceError::Reported(reported));
        }
        let message = match code {
            Some(code) => format!("classifier exited with code {}", code),
            None => "classifier terminated by signal".to_string(),
        };
        return Err(InferenceError::Exit { code, message });
    }

    let value: serde_json::Value = serde_json::from_str(stdout).map_err(|_| malformed(stdout))?;
    if let Some(reported) = reported_error(&value) {
        return Err(InferenceError::Reported(reported));
    }

    let mut output: ClassifierOutput = serde_json::from_value(value).map_err(|_| malformed(stdout))?;
    let in_range = |c: f64| (0.0..=1.0).contains(&c);
    if !in_range(output.confidence) || !output.predictions.iter().all(|p| in_range(p.confidence)) {
        return Err(malformed(stdout));
    }
    output
        .predictions
        .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Ok(output)
}

fn reported_error(value: &serde_json::Value) -> Option<String> {
    match value.get("error")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn malformed(raw: &str) -> InferenceError {
    InferenceError::Malformed {
        raw: raw.to_string(),
    }
}
