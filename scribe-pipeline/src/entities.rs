//! Medical entity extraction through the generative model
//!
//! Used for transcripts the medical speech backend did not analyse. The
//! extraction is best effort: any failure yields an empty list.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use config_engine::PipelineConfig;

use crate::generation::response::extract_array;
use crate::language::language_name;
use crate::model::{clamp_confidence, EntityType, MedicalEntity};
use crate::providers::{ModelClient, ModelRequest};

pub struct EntityExtractor {
    model: Arc<dyn ModelClient>,
    model_id: String,
    max_tokens: u32,
}

impl EntityExtractor {
    pub fn new(model: Arc<dyn ModelClient>, model_id: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model,
            model_id: model_id.into(),
            max_tokens,
        }
    }

    pub fn from_config(model: Arc<dyn ModelClient>, config: &PipelineConfig) -> Self {
        Self::new(model, config.bedrock.extraction_model.clone(), config.bedrock.max_tokens)
    }

    /// Extracts entities from transcript text in the given canonical language.
    pub async fn extract(&self, text: &str, language: &str) -> Vec<MedicalEntity> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let request = ModelRequest {
            model_id: self.model_id.clone(),
            system: None,
            user_message: prompt(text, &language_name(language)),
            max_tokens: self.max_tokens,
        };

        let reply = match self.model.invoke(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(language, error = %err, "Entity extraction call failed");
                return Vec::new();
            }
        };

        let Some(content) = reply.text else {
            warn!(language, "Entity extraction returned no content");
            return Vec::new();
        };

        match extract_array(&content) {
            Ok(items) => {
                let entities = parse_entities(&items);
                debug!(language, found = items.len(), kept = entities.len(), "Extracted entities");
                entities
            }
            Err(err) => {
                warn!(language, error = %err, "Entity extraction output unreadable");
                Vec::new()
            }
        }
    }
}

fn prompt(text: &str, language_name: &str) -> String {
    format!(
        r#"Analyze this medical consultation transcript in {language_name} and extract medical entities.

TRANSCRIPT:
{text}

Extract the following types of entities:
1. SYMPTOMS - Patient symptoms or complaints
2. DIAGNOSES - Medical conditions or diagnoses mentioned
3. MEDICATIONS - Drug names, dosages, frequencies
4. PROCEDURES - Medical procedures or treatments
5. VITAL_SIGNS - Blood pressure, temperature, pulse, etc.
6. MEDICAL_HISTORY - Past conditions or family history
7. ALLERGIES - Drug or food allergies

Return a JSON array with this format for each entity found:
[
  {{
    "text": "original text in {language_name}",
    "text_en": "English translation",
    "type": "SYMPTOM|DIAGNOSIS|MEDICATION|PROCEDURE|VITAL_SIGN|HISTORY|ALLERGY",
    "icd10_code": "ICD-10 code if applicable",
    "confidence": 0.0-1.0,
    "context": "brief context where this was mentioned"
  }}
]

Only return valid JSON, no other text."#
    )
}

fn optional_text(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Keeps items with text and a known type; confidence is clamped.
fn parse_entities(items: &[Value]) -> Vec<MedicalEntity> {
    items
        .iter()
        .filter_map(|item| {
            let text = optional_text(item, "text")?;
            let canonical_type = item.get("type").and_then(Value::as_str).and_then(EntityType::from_label)?;
            #[allow(clippy::cast_possible_truncation)]
            let confidence = item.get("confidence").and_then(Value::as_f64).unwrap_or(0.0) as f32;

            let mut entity = MedicalEntity::new(text, canonical_type, clamp_confidence(confidence));
            entity.text_en = optional_text(item, "text_en");
            entity.icd10_code = optional_text(item, "icd10_code");
            entity.context = optional_text(item, "context");
            Some(entity)
        })
        .collect()
}
