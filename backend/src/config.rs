use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use strum_macros::{Display, EnumString};

use crate::upload::UploadGate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Where uploaded images end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Inline,
}

impl StorageBackend {
    /// Upload limit tied to the backend; inline data URLs end up inside
    /// the detection record so they stay smaller.
    pub fn max_upload_bytes(&self) -> usize {
        match self {
            StorageBackend::S3 => 10 * 1024 * 1024,
            StorageBackend::Inline => 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PersistenceBackend {
    DynamoDb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct DynamoDbSettings {
    pub detections_table: String,
    pub diseases_table: String,
    pub user_index: String,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub program: String,
    pub args: Vec<String>,
    pub model_path: PathBuf,
    pub timeout: Duration,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub base_url: String,
    pub cors_allowed_origin: Option<String>,
    pub jwt_secret: String,
    pub storage: StorageBackend,
    pub s3: Option<S3Settings>,
    pub persistence: PersistenceBackend,
    pub dynamodb: Option<DynamoDbSettings>,
    pub knowledge_base_path: Option<PathBuf>,
    pub inference: InferenceSettings,
    pub enforce_confidence_threshold: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = parse_or(&get, "PORT", 8081u16)?;
        let base_url = get("BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));
        let storage = parse_backend(&get, "IMAGE_STORAGE", StorageBackend::Inline)?;
        let persistence = parse_backend(&get, "PERSISTENCE_BACKEND", PersistenceBackend::Memory)?;

        let s3 = match storage {
            StorageBackend::S3 => Some(S3Settings {
                bucket: require("AWS_S3_BUCKET")?,
                region: require("AWS_REGION")?,
            }),
            StorageBackend::Inline => None,
        };

        let dynamodb = match persistence {
            PersistenceBackend::DynamoDb => Some(DynamoDbSettings {
                detections_table: require("DYNAMODB_DETECTIONS_TABLE")?,
                diseases_table: require("DYNAMODB_DISEASES_TABLE")?,
                user_index: get("DYNAMODB_DETECTIONS_USER_INDEX")
                    .unwrap_or_else(|| "user_id-created_at-index".to_string()),
            }),
            PersistenceBackend::Memory => None,
        };

        let inference = InferenceSettings {
            program: get("INFERENCE_PROGRAM").unwrap_or_else(|| "python".to_string()),
            args: get("INFERENCE_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            model_path: get("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ml_models/plant_disease_model.pt")),
            timeout: Duration::from_secs(parse_or(&get, "INFERENCE_TIMEOUT_SECS", 120u64)?),
            max_concurrent: parse_or(&get, "MAX_CONCURRENT_INFERENCES", 4usize)?.max(1),
        };

        Ok(Self {
            port,
            base_url,
            cors_allowed_origin: get("CORS_ALLOWED_ORIGIN"),
            jwt_secret: require("JWT_SECRET")?,
            storage,
            s3,
            persistence,
            dynamodb,
            knowledge_base_path: get("KNOWLEDGE_BASE_PATH").map(PathBuf::from),
            inference,
            enforce_confidence_threshold: parse_or(&get, "ENFORCE_CONFIDENCE_THRESHOLD", false)?,
        })
    }

    pub fn upload_gate(&self) -> UploadGate {
        UploadGate::new(self.storage.max_upload_bytes())
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_backend<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
