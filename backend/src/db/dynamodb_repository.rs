use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, Select};
use chrono::{DateTime, SecondsFormat, Utc};
use shared::{DetectionStatus, GeoLocation, Platform, Prediction};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{
    DetectionStore, DiseaseCatalog, HistoryPage, PageRequest, RepositoryError, page_window,
};
use crate::config::DynamoDbSettings;
use crate::models::{Detection, Disease, NewDetection, Severity, Treatment};

type Item = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    detections_table: String,
    diseases_table: String,
    user_index: String,
}

impl DynamoDbRepository {
    pub fn new(client: Client, settings: &DynamoDbSettings) -> Self {
        Self {
            client,
            detections_table: settings.detections_table.clone(),
            diseases_table: settings.diseases_table.clone(),
            user_index: settings.user_index.clone(),
        }
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let mut total = 0u64;
        let mut start_key: Option<Item> = None;
        loop {
            let result = self
                .client
                .query()
                .table_name(&self.detections_table)
                .index_name(&self.user_index)
                .key_condition_expression("user_id = :user_id")
                .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
                .select(Select::Count)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            total += u64::try_from(result.count).unwrap_or(0);
            match result.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => return Ok(total),
            }
        }
    }

    // TODO: query a `model_label` GSI instead of scanning once the diseases
    // table carries one; a full scan per lookup only suits a small catalog.
    async fn scan_diseases(
        &self,
        filter: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<Option<Disease>, RepositoryError> {
        let mut start_key: Option<Item> = None;
        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.diseases_table)
                .filter_expression(filter)
                .expression_attribute_values(name, value.clone())
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            if let Some(item) = result.items.and_then(|items| items.into_iter().next()) {
                return Ok(Some(parse_disease_from_item(&item)?));
            }
            match result.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl DetectionStore for DynamoDbRepository {
    async fn create(&self, detection: NewDetection) -> Result<Detection, RepositoryError> {
        let detection = detection.into_detection(Uuid::new_v4(), Utc::now());
        let item = detection_to_item(&detection)?;

        match self
            .client
            .put_item()
            .table_name(&self.detections_table)
            .set_item(Some(item))
            // Records are append-only.
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Stored detection {} for user {}", detection.id, detection.user_id);
                Ok(detection)
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for detection {}: {:?}", detection.id, e);
                Err(RepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn history(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<HistoryPage, RepositoryError> {
        let total = self.count_for_user(user_id).await?;
        let wanted = request.window_end();
        let mut window = Vec::with_capacity(wanted.min(total as usize));
        let mut start_key: Option<Item> = None;

        // Reading newest first, rows past the end of the requested page are never fetched.
        while window.len() < wanted {
            let remaining = i32::try_from(wanted - window.len()).unwrap_or(i32::MAX);
            let result = self
                .client
                .query()
                .table_name(&self.detections_table)
                .index_name(&self.user_index)
                .key_condition_expression("user_id = :user_id")
                .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
                .scan_index_forward(false)
                .limit(remaining)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            for item in result.items.unwrap_or_default() {
                window.push(parse_detection_from_item(&item)?);
            }
            match result.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }

        Ok(page_window(window, total, request))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Detection>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.detections_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        result
            .item
            .map(|item| parse_detection_from_item(&item))
            .transpose()
    }
}

#[async_trait]
impl DiseaseCatalog for DynamoDbRepository {
    async fn find_by_model_label(&self, label: &str) -> Result<Option<Disease>, RepositoryError> {
        self.scan_diseases(
            "model_label = :model_label",
            ":model_label",
            AttributeValue::S(label.to_string()),
        )
        .await
    }

    async fn get_disease(&self, id: Uuid) -> Result<Option<Disease>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.diseases_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        result
            .item
            .map(|item| parse_disease_from_item(&item))
            .transpose()
    }
}

pub fn detection_to_item(detection: &Detection) -> Result<Item, RepositoryError> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(detection.id.to_string()));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(detection.user_id.to_string()),
    );
    item.insert(
        "image_url".to_string(),
        AttributeValue::S(detection.image_url.clone()),
    );
    item.insert(
        "image_hash".to_string(),
        AttributeValue::S(detection.image_hash.clone()),
    );
    item.insert(
        "predicted_label".to_string(),
        AttributeValue::S(detection.predicted_label.clone()),
    );
    if let Some(disease_id) = detection.predicted_disease {
        item.insert(
            "predicted_disease".to_string(),
            AttributeValue::S(disease_id.to_string()),
        );
    }
    item.insert(
        "confidence".to_string(),
        AttributeValue::N(detection.confidence.to_string()),
    );
    item.insert(
        "status".to_string(),
        AttributeValue::S(detection.status.to_string()),
    );
    item.insert(
        "predictions".to_string(),
        AttributeValue::S(serde_json::to_string(&detection.predictions)?),
    );
    if let Some(crop_id) = detection.crop_id {
        item.insert("crop_id".to_string(), AttributeValue::S(crop_id.to_string()));
    }
    if let Some(notes) = &detection.notes {
        item.insert("notes".to_string(), AttributeValue::S(notes.clone()));
    }
    if let Some(location) = &detection.location {
        item.insert(
            "latitude".to_string(),
            AttributeValue::N(location.latitude.to_string()),
        );
        item.insert(
            "longitude".to_string(),
            AttributeValue::N(location.longitude.to_string()),
        );
    }
    item.insert(
        "platform".to_string(),
        AttributeValue::S(detection.platform.to_string()),
    );
    // Fixed-width UTC keeps the index sort key lexicographically ordered.
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(detection.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    Ok(item)
}

pub fn parse_detection_from_item(item: &Item) -> Result<Detection, RepositoryError> {
    let predictions: Vec<Prediction> = serde_json::from_str(required_s(item, "predictions")?)?;
    let location = match (optional_n(item, "latitude")?, optional_n(item, "longitude")?) {
        (Some(latitude), Some(longitude)) => Some(GeoLocation {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(Detection {
        id: parse_uuid(required_s(item, "id")?)?,
        user_id: parse_uuid(required_s(item, "user_id")?)?,
        image_url: required_s(item, "image_url")?.clone(),
        image_hash: optional_s(item, "image_hash").cloned().unwrap_or_default(),
        predicted_label: optional_s(item, "predicted_label").cloned().unwrap_or_default(),
        predicted_disease: optional_s(item, "predicted_disease")
            .map(|s| parse_uuid(s))
            .transpose()?,
        confidence: optional_n(item, "confidence")?.unwrap_or_default(),
        status: parse_enum::<DetectionStatus>(required_s(item, "status")?)?,
        predictions,
        crop_id: optional_s(item, "crop_id").map(|s| parse_uuid(s)).transpose()?,
        notes: optional_s(item, "notes").cloned(),
        location,
        platform: parse_enum::<Platform>(required_s(item, "platform")?)?,
        created_at: parse_timestamp(required_s(item, "created_at")?)?,
    })
}

pub fn parse_disease_from_item(item: &Item) -> Result<Disease, RepositoryError> {
    let list = |key: &str| -> Result<Vec<String>, RepositoryError> {
        match optional_s(item, key) {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(Vec::new()),
        }
    };

    Ok(Disease {
        id: parse_uuid(required_s(item, "id")?)?,
        name: required_s(item, "name")?.clone(),
        crop_id: optional_s(item, "crop_id").map(|s| parse_uuid(s)).transpose()?,
        symptoms: list("symptoms")?,
        causes: list("causes")?,
        prevention: list("prevention")?,
        treatment: Treatment {
            chemical: list("treatment_chemical")?,
            organic: list("treatment_organic")?,
        },
        severity: optional_s(item, "severity")
            .map(|s| parse_enum::<Severity>(s))
            .transpose()?
            .unwrap_or_default(),
        model_label: optional_s(item, "model_label").cloned().unwrap_or_default(),
        confidence_threshold: optional_n(item, "confidence_threshold")?.unwrap_or(0.7),
    })
}

fn optional_s<'a>(item: &'a Item, key: &str) -> Option<&'a String> {
    item.get(key).and_then(|v| v.as_s().ok())
}

fn required_s<'a>(item: &'a Item, key: &str) -> Result<&'a String, RepositoryError> {
    optional_s(item, key).ok_or_else(|| RepositoryError::InvalidData(format!("missing {}", key)))
}

fn optional_n(item: &Item, key: &str) -> Result<Option<f64>, RepositoryError> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .map(|n| {
            n.parse::<f64>()
                .map_err(|_| RepositoryError::InvalidData(format!("{} is not a number: {}", key, n)))
        })
        .transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|_| RepositoryError::InvalidData(format!("invalid uuid: {}", raw)))
}

fn parse_enum<T: FromStr>(raw: &str) -> Result<T, RepositoryError> {
    raw.parse()
        .map_err(|_| RepositoryError::InvalidData(format!("unexpected value: {}", raw)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::InvalidData(format!("invalid timestamp: {}", raw)))
}
