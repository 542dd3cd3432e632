//! Speech backend result documents
//!
//! The asynchronous backends write one JSON document per job. Only the parts
//! the pipeline keeps are modelled; everything else is ignored.

use std::collections::HashMap;

use serde::Deserialize;

use error_common::{codes, PipelineError, PipelineResult};

use crate::model::{EntityType, MedicalEntity, SourceOffsets, TranscriptSegment};

#[derive(Debug, Deserialize)]
pub struct TranscriptDocument {
    #[serde(default)]
    pub results: TranscriptResults,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptResults {
    #[serde(default)]
    pub transcripts: Vec<TranscriptText>,
    #[serde(default)]
    pub speaker_labels: Option<SpeakerLabels>,
    #[serde(default)]
    pub items: Vec<TranscriptItem>,
    #[serde(default)]
    pub entities: Vec<BackendEntity>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptText {
    #[serde(default)]
    pub transcript: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeakerLabels {
    #[serde(default)]
    pub segments: Vec<SpeakerSegment>,
}

#[derive(Debug, Deserialize)]
pub struct SpeakerSegment {
    #[serde(default)]
    pub speaker_label: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub items: Vec<SegmentItem>,
}

#[derive(Debug, Deserialize)]
pub struct SegmentItem {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptItem {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub content: String,
}

/// Entity as reported by the medical speech backend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendEntity {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub begin_offset: Option<u32>,
    #[serde(default)]
    pub end_offset: Option<u32>,
}

impl TranscriptDocument {
    /// # Errors
    ///
    /// Returns a malformed-output error when the bytes are not a result document.
    pub fn from_slice(bytes: &[u8]) -> PipelineResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            PipelineError::malformed(
                codes::generation::INVALID_JSON_RESPONSE,
                format!("unreadable transcript document: {e}"),
                &String::from_utf8_lossy(bytes),
            )
        })
    }

    /// Transcript texts joined in document order
    pub fn full_text(&self) -> String {
        self.results
            .transcripts
            .iter()
            .map(|t| t.transcript.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Diarized segments ordered by start offset. Segment items carry only
    /// timing, so words are looked up in the item list by start time.
    pub fn segments(&self) -> Vec<TranscriptSegment> {
        let Some(labels) = &self.results.speaker_labels else {
            return Vec::new();
        };

        let words_by_start: HashMap<&str, &str> = self
            .results
            .items
            .iter()
            .filter(|item| item.item_type.as_deref() != Some("punctuation"))
            .filter_map(|item| {
                let start = item.start_time.as_deref()?;
                let word = item.alternatives.first()?.content.as_str();
                Some((start, word))
            })
            .collect();

        let mut segments: Vec<TranscriptSegment> = labels
            .segments
            .iter()
            .map(|segment| {
                let words: Vec<&str> = segment
                    .items
                    .iter()
                    .filter_map(|item| {
                        item.content.as_deref().or_else(|| {
                            item.start_time
                                .as_deref()
                                .and_then(|start| words_by_start.get(start).copied())
                        })
                    })
                    .collect();
                TranscriptSegment {
                    speaker_label: segment
                        .speaker_label
                        .clone()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    start_offset: parse_seconds(segment.start_time.as_deref()),
                    end_offset: parse_seconds(segment.end_time.as_deref()),
                    text: words.join(" "),
                }
            })
            .collect();

        segments.sort_by(|a, b| a.start_offset.total_cmp(&b.start_offset));
        segments
    }

    /// Entities detected by the medical backend, mapped onto the canonical
    /// types. Categories with no clinical counterpart are dropped.
    pub fn native_entities(&self) -> Vec<MedicalEntity> {
        self.results
            .entities
            .iter()
            .filter_map(|entity| {
                let Some(canonical_type) = EntityType::from_label(&entity.category) else {
                    tracing::debug!(category = %entity.category, "Skipping entity category");
                    return None;
                };
                let mut mapped = MedicalEntity::new(entity.content.clone(), canonical_type, entity.score);
                if let (Some(begin), Some(end)) = (entity.begin_offset, entity.end_offset) {
                    mapped.source_offsets = Some(SourceOffsets { begin, end });
                }
                Some(mapped)
            })
            .collect()
    }
}

fn parse_seconds(value: Option<&str>) -> f64 {
    value.and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> TranscriptDocument {
        let raw = json!({
            "jobName": "medical-a1-0badc0de",
            "results": {
                "transcripts": [{"transcript": "Good morning."}, {"transcript": "I have had a fever."}],
                "speaker_labels": {
                    "segments": [
                        {
                            "speaker_label": "spk_1",
                            "start_time": "2.10",
                            "end_time": "3.50",
                            "items": [
                                {"start_time": "2.10", "speaker_label": "spk_1"},
                                {"start_time": "2.60", "speaker_label": "spk_1"}
                            ]
                        },
                        {
                            "speaker_label": "spk_0",
                            "start_time": "0.00",
                            "end_time": "1.20",
                            "items": [
                                {"start_time": "0.00", "speaker_label": "spk_0"},
                                {"start_time": "0.60", "speaker_label": "spk_0"}
                            ]
                        }
                    ]
                },
                "items": [
                    {"start_time": "0.00", "type": "pronunciation", "alternatives": [{"content": "Good"}]},
                    {"start_time": "0.60", "type": "pronunciation", "alternatives": [{"content": "morning"}]},
                    {"type": "punctuation", "alternatives": [{"content": "."}]},
                    {"start_time": "2.10", "type": "pronunciation", "alternatives": [{"content": "fever"}]},
                    {"start_time": "2.60", "type": "pronunciation", "alternatives": [{"content": "yesterday"}]}
                ],
                "entities": [
                    {"Content": "fever", "Category": "MEDICAL_CONDITION", "Score": 0.97, "BeginOffset": 24, "EndOffset": 29},
                    {"Content": "chest", "Category": "ANATOMY", "Score": 0.9},
                    {"Content": "ibuprofen", "Category": "MEDICATION", "Score": 1.3}
                ]
            }
        });
        TranscriptDocument::from_slice(raw.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_full_text_joins_transcripts_in_order() {
        assert_eq!(sample_document().full_text(), "Good morning. I have had a fever.");
    }

    #[test]
    fn test_segments_resolve_words_and_sort() {
        let segments = sample_document().segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker_label, "spk_0");
        assert_eq!(segments[0].text, "Good morning");
        assert_eq!(segments[1].text, "fever yesterday");
        assert!((segments[1].end_offset - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_native_entities_are_mapped_and_clamped() {
        let entities = sample_document().native_entities();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].canonical_type, EntityType::Diagnosis);
        assert_eq!(entities[0].source_offsets, Some(SourceOffsets { begin: 24, end: 29 }));
        assert_eq!(entities[1].canonical_type, EntityType::Medication);
        assert_eq!(entities[1].confidence, 1.0);
    }

    #[test]
    fn test_document_without_diarization() {
        let doc = TranscriptDocument::from_slice(br#"{"results": {"transcripts": [{"transcript": "Bonjour"}]}}"#).unwrap();
        assert_eq!(doc.full_text(), "Bonjour");
        assert!(doc.segments().is_empty());
        assert!(doc.native_entities().is_empty());
    }

    #[test]
    fn test_unreadable_document() {
        let err = TranscriptDocument::from_slice(b"<html>AccessDenied</html>").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
