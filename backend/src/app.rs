use std::sync::Arc;

use actix_web::web;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;

use crate::auth::JwtService;
use crate::catalog::{self, DiseaseReconciler, KnowledgeBaseError};
use crate::config::{AppConfig, PersistenceBackend, StorageBackend};
use crate::db::{DetectionStore, DiseaseCatalog, DynamoDbRepository, InMemoryRepository};
use crate::detect::{DetectionPipeline, ThresholdPolicy};
use crate::inference::{Classifier, SubprocessClassifier};
use crate::storage::{InlineStore, S3Service, StorageAdapter};
use crate::upload::UploadGate;

const BUNDLED_KNOWLEDGE_BASE: &str = include_str!("../config/diseases.yaml");

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{0} settings are missing")]
    MissingSettings(&'static str),
    #[error("Failed to load knowledge base: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),
}

/// Everything the HTTP layer shares between workers.
#[derive(Clone)]
pub struct AppServices {
    pub pipeline: web::Data<DetectionPipeline>,
    pub detections: web::Data<dyn DetectionStore>,
    pub catalog: web::Data<dyn DiseaseCatalog>,
    pub gate: UploadGate,
    pub jwt: JwtService,
}

impl AppServices {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        classifier: Arc<dyn Classifier>,
        detections: Arc<dyn DetectionStore>,
        catalog: Arc<dyn DiseaseCatalog>,
        gate: UploadGate,
        jwt: JwtService,
        threshold_policy: ThresholdPolicy,
    ) -> Self {
        let pipeline = DetectionPipeline::new(
            storage,
            classifier,
            DiseaseReconciler::new(catalog.clone()),
            detections.clone(),
        )
        .with_threshold_policy(threshold_policy);

        Self {
            pipeline: web::Data::new(pipeline),
            detections: web::Data::from(detections),
            catalog: web::Data::from(catalog),
            gate,
            jwt,
        }
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let aws_config = match (config.storage, config.persistence) {
        (StorageBackend::Inline, PersistenceBackend::Memory) => None,
        _ => {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(s3) = &config.s3 {
                loader = loader.region(Region::new(s3.region.clone()));
            }
            Some(loader.load().await)
        }
    };

    let storage: Arc<dyn StorageAdapter> = match (config.storage, &aws_config) {
        (StorageBackend::S3, Some(aws)) => {
            let s3 = config.s3.as_ref().ok_or(StartupError::MissingSettings("S3"))?;
            Arc::new(S3Service::new(
                S3Client::new(aws),
                s3.bucket.clone(),
                s3.region.clone(),
            ))
        }
        _ => Arc::new(InlineStore::new()),
    };
    log::info!("Image storage: {}", storage.name());

    let (detections, catalog): (Arc<dyn DetectionStore>, Arc<dyn DiseaseCatalog>) =
        match (config.persistence, &aws_config) {
            (PersistenceBackend::DynamoDb, Some(aws)) => {
                let settings = config
                    .dynamodb
                    .as_ref()
                    .ok_or(StartupError::MissingSettings("DynamoDB"))?;
                let repo = Arc::new(DynamoDbRepository::new(DynamoDbClient::new(aws), settings));
                log::info!(
                    "Persistence: DynamoDB ({}, {})",
                    settings.detections_table,
                    settings.diseases_table
                );
                (repo.clone(), repo)
            }
            _ => {
                let diseases = match &config.knowledge_base_path {
                    Some(path) => {
                        log::info!("Loading knowledge base from {}", path.display());
                        catalog::load_knowledge_base(path)?
                    }
                    None => catalog::parse_knowledge_base(BUNDLED_KNOWLEDGE_BASE)?,
                };
                log::info!("Persistence: in-memory ({} diseases)", diseases.len());
                let repo = Arc::new(InMemoryRepository::with_diseases(diseases));
                (repo.clone(), repo)
            }
        };

    let classifier = SubprocessClassifier::new(&config.inference);
    if !classifier.model_path().exists() {
        log::warn!(
            "Model file not found at {}; scans will be stored as pending analysis",
            classifier.model_path().display()
        );
    }

    let threshold_policy = ThresholdPolicy::from_flag(config.enforce_confidence_threshold);
    log::info!("Confidence threshold policy: {:?}", threshold_policy);

    Ok(AppServices::new(
        storage,
        Arc::new(classifier),
        detections,
        catalog,
        config.upload_gate(),
        JwtService::new(&config.jwt_secret),
        threshold_policy,
    ))
}
