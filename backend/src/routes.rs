use std::collections::HashMap;
use std::str::FromStr;

use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::json;
use shared::{GeoLocation, Platform};
use uuid::Uuid;

use crate::app::AppServices;
use crate::auth::{AuthMiddleware, AuthenticatedUser};
use crate::db::{DetectionStore, DiseaseCatalog, PageRequest};
use crate::detect::{DetectionPipeline, DetectionResponse, HistoryItem, HistoryResponse, ScanRequest};
use crate::error::ApiError;
use crate::models::DiseaseSummary;
use crate::upload::{UploadError, UploadGate};

const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig, services: &AppServices) {
    cfg.app_data(services.pipeline.clone())
        .app_data(services.detections.clone())
        .app_data(services.catalog.clone())
        .app_data(web::Data::new(services.gate))
        .service(web::resource("/").route(web::get().to(health)))
        .service(
            web::scope("/api/v1")
                .wrap(AuthMiddleware::new(services.jwt.clone()))
                .service(web::resource("/detect").route(web::post().to(handle_detect)))
                .service(web::resource("/detect/history").route(web::get().to(detection_history)))
                .service(web::resource("/detect/{id}").route(web::get().to(get_detection))),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Agro AI Health API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Default)]
struct ScanForm {
    image: Option<(Vec<u8>, String)>,
    text: HashMap<String, String>,
}

async fn read_scan_form(mut payload: Multipart, gate: &UploadGate) -> Result<ScanForm, ApiError> {
    let mut form = ScanForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let mime_type = field
                    .content_type()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_default();
                // Reject before buffering anything we would refuse anyway.
                if !UploadGate::is_allowed_type(&mime_type) {
                    return Err(UploadError::UnsupportedType(mime_type).into());
                }
                let mut image_data = Vec::new();
                while let Some(chunk) = field.next().await {
                    let data = chunk?;
                    gate.check_size(image_data.len() + data.len())?;
                    image_data.extend_from_slice(&data);
                }
                form.image = Some((image_data, mime_type));
            }
            "platform" | "latitude" | "longitude" | "notes" | "cropId" => {
                let value = read_text_field(&mut field, &name).await?;
                form.text.insert(name, value);
            }
            _ => {
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    Ok(form)
}

async fn read_text_field(field: &mut Field, name: &str) -> Result<String, ApiError> {
    let mut raw = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk?;
        if raw.len() + data.len() > MAX_TEXT_FIELD_BYTES {
            return Err(ApiError::BadRequest(format!("Field {} is too long", name)));
        }
        raw.extend_from_slice(&data);
    }
    String::from_utf8(raw).map_err(|_| ApiError::BadRequest(format!("Field {} is not valid UTF-8", name)))
}

fn text<'a>(form: &'a ScanForm, name: &str) -> Option<&'a str> {
    form.text.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_coordinate(raw: &str, name: &str, bound: f64) -> Result<f64, ApiError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= bound)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {}", name)))
}

fn scan_request(user_id: Uuid, form: ScanForm, gate: &UploadGate) -> Result<ScanRequest, ApiError> {
    let platform = match text(&form, "platform") {
        Some(raw) => Platform::from_str(&raw.to_ascii_lowercase())
            .map_err(|_| ApiError::BadRequest("platform must be web or mobile".to_string()))?,
        None => Platform::default(),
    };

    let latitude = text(&form, "latitude")
        .map(|raw| parse_coordinate(raw, "latitude", 90.0))
        .transpose()?;
    let longitude = text(&form, "longitude")
        .map(|raw| parse_coordinate(raw, "longitude", 180.0))
        .transpose()?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoLocation {
            latitude,
            longitude,
        }),
        _ => None,
    };

    let crop_id = text(&form, "cropId")
        .map(|raw| Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid cropId".to_string())))
        .transpose()?;
    let notes = text(&form, "notes").map(str::to_string);

    let (bytes, mime_type) = form.image.ok_or(UploadError::Missing)?;
    let size = bytes.len();
    let image = gate.accept(bytes, &mime_type, size)?;

    Ok(ScanRequest {
        user_id,
        image,
        platform,
        location,
        notes,
        crop_id,
    })
}

async fn handle_detect(
    user: AuthenticatedUser,
    payload: Multipart,
    gate: web::Data<UploadGate>,
    pipeline: web::Data<DetectionPipeline>,
) -> Result<HttpResponse, ApiError> {
    let form = read_scan_form(payload, &gate).await?;
    let request = scan_request(user.0, form, &gate)?;

    log::info!(
        "Scan from user {} ({} bytes, {})",
        user.0,
        request.image.size(),
        request.image.mime_type
    );
    let response = pipeline.run(request).await?;
    Ok(HttpResponse::Created().json(response))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    page: Option<String>,
    limit: Option<String>,
}

async fn detection_history(
    user: AuthenticatedUser,
    query: web::Query<HistoryQuery>,
    detections: web::Data<dyn DetectionStore>,
    catalog: web::Data<dyn DiseaseCatalog>,
) -> Result<HttpResponse, ApiError> {
    let lenient = |raw: &Option<String>| raw.as_deref().and_then(|v| v.trim().parse::<i64>().ok());
    let request = PageRequest::new(lenient(&query.page), lenient(&query.limit));
    let page = detections.history(user.0, request).await?;

    let mut summaries: HashMap<Uuid, Option<DiseaseSummary>> = HashMap::new();
    let mut data = Vec::with_capacity(page.items.len());
    for detection in page.items {
        let disease = match detection.predicted_disease {
            Some(id) => {
                if !summaries.contains_key(&id) {
                    let summary = resolve_disease(catalog.get_ref(), id).await.map(|d| d.summary());
                    summaries.insert(id, summary);
                }
                summaries.get(&id).cloned().flatten()
            }
            None => None,
        };
        data.push(HistoryItem { detection, disease });
    }

    Ok(HttpResponse::Ok().json(HistoryResponse {
        success: true,
        count: data.len(),
        total: page.total,
        page: page.page,
        pages: page.pages,
        data,
    }))
}

async fn get_detection(
    user: AuthenticatedUser,
    path: web::Path<String>,
    detections: web::Data<dyn DetectionStore>,
    catalog: web::Data<dyn DiseaseCatalog>,
) -> Result<HttpResponse, ApiError> {
    let id = Uuid::parse_str(&path.into_inner()).map_err(|_| ApiError::NotFound)?;
    let detection = detections.get(id).await?.ok_or(ApiError::NotFound)?;

    if !detection.is_owned_by(user.0) {
        log::warn!("User {} tried to read detection {} owned by another user", user.0, id);
        return Err(ApiError::Forbidden);
    }

    let disease = match detection.predicted_disease {
        Some(disease_id) => resolve_disease(catalog.get_ref(), disease_id).await,
        None => None,
    };

    Ok(HttpResponse::Ok().json(DetectionResponse {
        success: true,
        data: detection,
        disease,
    }))
}

/// Follows a weak disease reference; dangling or failing lookups yield `None`.
async fn resolve_disease(catalog: &dyn DiseaseCatalog, id: Uuid) -> Option<crate::models::Disease> {
    match catalog.get_disease(id).await {
        Ok(disease) => disease,
        Err(e) => {
            log::warn!("Disease lookup for {} failed: {}", id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)], image: Option<(&[u8], &str)>) -> ScanForm {
        ScanForm {
            image: image.map(|(bytes, mime)| (bytes.to_vec(), mime.to_string())),
            text: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn defaults_to_web_without_location() {
        let request = scan_request(
            Uuid::new_v4(),
            form(&[], Some((b"img", "image/jpeg"))),
            &UploadGate::new(64),
        )
        .unwrap();
        assert_eq!(request.platform, Platform::Web);
        assert!(request.location.is_none());
        assert_eq!(request.image.extension, ".jpg");
    }

    #[test]
    fn location_needs_both_coordinates() {
        let gate = UploadGate::new(64);
        let request = scan_request(
            Uuid::new_v4(),
            form(
                &[("latitude", "6.52"), ("longitude", "3.37"), ("platform", "Mobile")],
                Some((b"img", "image/png")),
            ),
            &gate,
        )
        .unwrap();
        assert_eq!(request.platform, Platform::Mobile);
        assert_eq!(
            request.location,
            Some(GeoLocation {
                latitude: 6.52,
                longitude: 3.37
            })
        );

        let request = scan_request(
            Uuid::new_v4(),
            form(&[("latitude", "6.52")], Some((b"img", "image/png"))),
            &gate,
        )
        .unwrap();
        assert!(request.location.is_none());
    }

    #[test]
    fn malformed_fields_are_bad_requests() {
        let gate = UploadGate::new(64);
        for pairs in [
            [("latitude", "north")],
            [("longitude", "200")],
            [("platform", "desktop")],
            [("cropId", "tomato")],
        ] {
            let err = scan_request(Uuid::new_v4(), form(&pairs, Some((b"img", "image/png"))), &gate)
                .unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{pairs:?}");
        }
    }

    #[test]
    fn missing_image_is_invalid() {
        let err = scan_request(Uuid::new_v4(), form(&[], None), &UploadGate::new(64)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidImage(UploadError::Missing)));
    }
}
