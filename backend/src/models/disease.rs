use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

fn default_confidence_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(default)]
    pub chemical: Vec<String>,
    #[serde(default)]
    pub organic: Vec<String>,
}

/// Curated knowledge-base entry; `model_label` is the exact class name the
/// classifier emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disease {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub crop_id: Option<Uuid>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default)]
    pub treatment: Treatment,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub model_label: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicineKind {
    Chemical,
    Organic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MedicineKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseSummary {
    pub id: Uuid,
    pub name: String,
    pub severity: Severity,
}

impl Disease {
    /// Chemical treatments first, then organic, each tagged with its kind.
    pub fn medicines(&self) -> Vec<Medicine> {
        let tag = |names: &[String], kind: MedicineKind| {
            names
                .iter()
                .map(|name| Medicine {
                    name: name.clone(),
                    kind,
                })
                .collect::<Vec<_>>()
        };
        let mut medicines = tag(&self.treatment.chemical, MedicineKind::Chemical);
        medicines.extend(tag(&self.treatment.organic, MedicineKind::Organic));
        medicines
    }

    pub fn summary(&self) -> DiseaseSummary {
        DiseaseSummary {
            id: self.id,
            name: self.name.clone(),
            severity: self.severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medicines_are_tagged_by_kind() {
        let disease = Disease {
            id: Uuid::new_v4(),
            name: "Tomato Late Blight".into(),
            crop_id: None,
            symptoms: vec![],
            causes: vec![],
            prevention: vec![],
            treatment: Treatment {
                chemical: vec!["Mancozeb spray".into(), "Chlorothalonil".into()],
                organic: vec!["Neem oil spray".into()],
            },
            severity: Severity::High,
            model_label: "Tomato___Late_blight".into(),
            confidence_threshold: 0.7,
        };

        let medicines = disease.medicines();
        assert_eq!(medicines.len(), 3);
        assert!(medicines[..2].iter().all(|m| m.kind == MedicineKind::Chemical));
        assert_eq!(medicines[2].kind, MedicineKind::Organic);

        let json = serde_json::to_value(&medicines[2]).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Neem oil spray", "type": "organic"}));
    }

    #[test]
    fn sparse_yaml_entries_get_defaults() {
        let disease: Disease = serde_yaml::from_str("name: Rice Blast\nmodelLabel: Rice___Blast\n").unwrap();
        assert_eq!(disease.severity, Severity::Medium);
        assert_eq!(disease.confidence_threshold, 0.7);
        assert!(disease.treatment.chemical.is_empty());
    }
}
