pub mod reconciler;

use std::path::Path;

use serde::Deserialize;

use crate::models::Disease;

pub use reconciler::DiseaseReconciler;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("Failed to read knowledge base: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse knowledge base: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Duplicate modelLabel in knowledge base: {0}")]
    DuplicateLabel(String),
}

#[derive(Debug, Deserialize)]
struct KnowledgeBase {
    diseases: Vec<Disease>,
}

pub fn parse_knowledge_base(raw: &str) -> Result<Vec<Disease>, KnowledgeBaseError> {
    let knowledge_base: KnowledgeBase = serde_yaml::from_str(raw)?;
    let mut seen = std::collections::HashSet::new();
    for disease in &knowledge_base.diseases {
        if !disease.model_label.is_empty() && !seen.insert(disease.model_label.as_str()) {
            return Err(KnowledgeBaseError::DuplicateLabel(disease.model_label.clone()));
        }
    }
    Ok(knowledge_base.diseases)
}

pub fn load_knowledge_base(path: &Path) -> Result<Vec<Disease>, KnowledgeBaseError> {
    let raw = std::fs::read_to_string(path)?;
    let diseases = parse_knowledge_base(&raw)?;
    log::info!("Loaded {} diseases from {}", diseases.len(), path.display());
    Ok(diseases)
}
