//! End-to-end tests for the `/api/v1/detect` surface.
//!
//! Each test wires the real HTTP routes to an in-memory repository, the inline
//! image store, and a `sh -c` stand-in for the classifier process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use agro_backend::app::AppServices;
use agro_backend::auth::JwtService;
use agro_backend::catalog::{DiseaseReconciler, parse_knowledge_base};
use agro_backend::config::{InferenceSettings, StorageBackend};
use agro_backend::db::{DetectionStore, InMemoryRepository};
use agro_backend::detect::DetectionPipeline;
use agro_backend::inference::SubprocessClassifier;
use agro_backend::models::NewDetection;
use agro_backend::routes::configure_routes;
use agro_backend::storage::InlineStore;
use agro_backend::upload::UploadGate;
use serde_json::Value;
use shared::{DetectionStatus, Platform};
use uuid::Uuid;

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "----agroscanboundary";
const LATE_BLIGHT: &str = r#"{"disease":"Tomato___Late_blight","confidence":0.91,"status":"infected","predictions":[{"label":"Tomato___Early_blight","confidence":0.05},{"label":"Tomato___Late_blight","confidence":0.91}]}"#;

struct Harness {
    dir: PathBuf,
    repo: InMemoryRepository,
    services: AppServices,
}

impl Harness {
    /// `script` runs under `sh -c`; `None` leaves the model file absent.
    fn new(script: Option<&str>) -> Self {
        let dir = std::env::temp_dir().join(format!("agro_http_{}", Uuid::new_v4()));
        let scratch = dir.join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        if script.is_some() {
            std::fs::write(dir.join("model.pt"), b"weights").unwrap();
        }

        let diseases = parse_knowledge_base(include_str!("../config/diseases.yaml")).unwrap();
        let repo = InMemoryRepository::with_diseases(diseases);
        let classifier = SubprocessClassifier::new(&InferenceSettings {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                script.unwrap_or("exit 1").to_string(),
                "classifier".to_string(),
            ],
            model_path: dir.join("model.pt"),
            timeout: Duration::from_secs(10),
            max_concurrent: 2,
        });

        let store = Arc::new(repo.clone());
        let pipeline = DetectionPipeline::new(
            Arc::new(InlineStore::new()),
            Arc::new(classifier),
            DiseaseReconciler::new(store.clone()),
            store.clone(),
        )
        .with_temp_dir(scratch);

        let services = AppServices {
            pipeline: web::Data::new(pipeline),
            detections: web::Data::from(store.clone() as Arc<dyn DetectionStore>),
            catalog: web::Data::from(store as Arc<dyn agro_backend::db::DiseaseCatalog>),
            gate: UploadGate::new(StorageBackend::Inline.max_upload_bytes()),
            jwt: JwtService::new(SECRET),
        };

        Self {
            dir,
            repo,
            services,
        }
    }

    fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.dir.join("scratch")).unwrap().count()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn bearer(user_id: Uuid) -> (&'static str, String) {
    let token = JwtService::new(SECRET)
        .generate_token(user_id, chrono::Duration::hours(1))
        .unwrap();
    ("Authorization", format!("Bearer {}", token))
}

fn multipart(image: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((mime, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"leaf\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn scan(user_id: Uuid, body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/detect")
        .insert_header(bearer(user_id))
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

fn record(user_id: Uuid, label: &str) -> NewDetection {
    NewDetection {
        user_id,
        image_url: "data:image/png;base64,AA==".to_string(),
        image_hash: String::new(),
        predicted_label: label.to_string(),
        predicted_disease: None,
        confidence: 0.5,
        status: DetectionStatus::Unknown,
        predictions: vec![],
        crop_id: None,
        notes: None,
        location: None,
        platform: Platform::Web,
    }
}

macro_rules! app {
    ($harness:expr) => {{
        let services = $harness.services.clone();
        test::init_service(App::new().configure(move |cfg| configure_routes(cfg, &services))).await
    }};
}

#[actix_web::test]
async fn health_check_is_public() {
    let harness = Harness::new(None);
    let app = app!(harness);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["version"].is_string());
}

#[actix_web::test]
async fn scan_without_token_is_unauthorized() {
    let harness = Harness::new(None);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/v1/detect")
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart(Some(("image/jpeg", b"leaf")), &[]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(harness.repo.detection_count().await, 0);
}

#[actix_web::test]
async fn disallowed_type_is_rejected_before_anything_is_stored() {
    let harness = Harness::new(Some(&format!("printf '{LATE_BLIGHT}'")));
    let app = app!(harness);

    let req = scan(Uuid::new_v4(), multipart(Some(("image/gif", b"GIF89a")), &[])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(harness.repo.detection_count().await, 0);
}

#[actix_web::test]
async fn missing_image_is_a_bad_request() {
    let harness = Harness::new(None);
    let app = app!(harness);

    let req = scan(Uuid::new_v4(), multipart(None, &[("notes", "no photo")])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn missing_model_records_a_pending_scan() {
    let harness = Harness::new(None);
    let app = app!(harness);
    let user = Uuid::new_v4();

    let req = scan(
        user,
        multipart(
            Some(("image/png", b"png-bytes")),
            &[("platform", "mobile"), ("latitude", "6.5"), ("longitude", "3.4")],
        ),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["disease"], "Pending analysis");
    assert_eq!(body["status"], "unknown");
    assert_eq!(body["confidence"], 0.0);
    assert!(body["message"].is_string());
    assert!(body.get("medicines").is_none());
    assert_eq!(body["data"]["userId"], user.to_string());
    assert_eq!(body["data"]["platform"], "mobile");
    assert_eq!(body["data"]["location"]["latitude"], 6.5);
    assert!(
        body["data"]["imageUrl"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
    assert_eq!(harness.repo.detection_count().await, 1);
}

#[actix_web::test]
async fn classifier_error_is_absorbed_and_temp_file_removed() {
    let harness = Harness::new(Some(r#"printf '{"error":"File not found"}'"#));
    let app = app!(harness);

    let req = scan(Uuid::new_v4(), multipart(Some(("image/jpeg", b"jpeg")), &[])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "unknown");
    assert_eq!(body["data"]["predictedLabel"], "");
    assert!(body["message"].is_string());
    assert_eq!(harness.scratch_entries(), 0);
}

#[actix_web::test]
async fn matched_label_is_enriched_from_the_knowledge_base() {
    let harness = Harness::new(Some(&format!("printf '{LATE_BLIGHT}'")));
    let app = app!(harness);
    let user = Uuid::new_v4();

    let req = scan(user, multipart(Some(("image/jpeg", b"jpeg")), &[])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["disease"], "Tomato___Late_blight");
    assert_eq!(body["status"], "infected");
    assert_eq!(body["severity"], "High");
    assert_eq!(body["predictions"][0]["label"], "Tomato___Late_blight");
    let medicines = body["medicines"].as_array().unwrap();
    assert!(!medicines.is_empty());
    assert!(medicines.iter().all(|m| m["type"] == "chemical" || m["type"] == "organic"));
    assert!(body["data"]["predictedDisease"].is_string());
    assert_eq!(harness.scratch_entries(), 0);

    let id = body["data"]["id"].as_str().unwrap().to_string();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/detect/{id}"))
        .insert_header(bearer(user))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["disease"]["modelLabel"], "Tomato___Late_blight");
}

#[actix_web::test]
async fn history_is_paginated_newest_first() {
    let harness = Harness::new(None);
    let user = Uuid::new_v4();
    for i in 0..12 {
        harness
            .repo
            .create(record(user, &format!("scan-{i}")))
            .await
            .unwrap();
    }
    harness
        .repo
        .create(record(Uuid::new_v4(), "someone-else"))
        .await
        .unwrap();
    let app = app!(harness);

    let req = test::TestRequest::get()
        .uri("/api/v1/detect/history?page=2&limit=5")
        .insert_header(bearer(user))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 5);
    assert_eq!(body["total"], 12);
    assert_eq!(body["page"], 2);
    assert_eq!(body["pages"], 3);
    let labels: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["predictedLabel"].as_str().unwrap())
        .collect();
    assert_eq!(labels, ["scan-6", "scan-5", "scan-4", "scan-3", "scan-2"]);
}

#[actix_web::test]
async fn history_defaults_garbage_query_values() {
    let harness = Harness::new(None);
    let user = Uuid::new_v4();
    harness.repo.create(record(user, "only")).await.unwrap();
    let app = app!(harness);

    let req = test::TestRequest::get()
        .uri("/api/v1/detect/history?page=abc&limit=-3")
        .insert_header(bearer(user))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["page"], 1);
    assert_eq!(body["count"], 1);
}

#[actix_web::test]
async fn reading_someone_elses_detection_is_forbidden() {
    let harness = Harness::new(None);
    let owner = Uuid::new_v4();
    let detection = harness.repo.create(record(owner, "mine")).await.unwrap();
    let app = app!(harness);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/detect/{}", detection.id))
        .insert_header(bearer(Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn unknown_or_malformed_ids_are_not_found() {
    let harness = Harness::new(None);
    let app = app!(harness);
    let user = Uuid::new_v4();

    for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/detect/{id}"))
            .insert_header(bearer(user))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{id}");
    }
}
