// Prompt text for SOAP note generation

use std::fmt::Write as _;

use crate::model::GenerationRequest;

pub const SYSTEM_PROMPT: &str = r#"You are a clinical documentation assistant generating SOAP notes from medical call transcripts.

CRITICAL INSTRUCTIONS:
1. Return ONLY a single valid JSON object. No markdown, no text before or after, no explanations.
2. Never hallucinate. Use "unknown" for any information not explicitly stated or reasonably inferred.
3. Telemedicine-aware. Acknowledge missing vitals and physical exams; do not pretend they exist.
4. Safety first. Always include red flags and return precautions relevant to the chief complaint.
5. Honest assessment. Mark uncertainties in source.data_quality.uncertainties.
6. Doctor-friendly. Generate a note that is easy for the provider to review and edit.

The JSON must follow the exact schema provided. Key rules:
- chief_complaint: 1-2 sentences, primary reason for visit
- subjective.hpi: Chronological narrative with symptom details (onset, duration, severity, context)
- subjective.ros: Systematically document positives, negatives, and unknowns for each body system
- objective.vitals: Set "measured": false if vitals NOT taken; do NOT hallucinate vital signs
- objective.physical_exam_limited: For telemedicine, set "performed": false and use telemedicine_observations
- assessment.problem_list: Include differential diagnoses with likelihood estimates
- plan: Document exact medications, doses, frequencies from conversation; include rationale
- safety.requires_clinician_review: Always true if any gaps or uncertainties
- doctor_editing: Include specific clarifications provider should ask about

For telemedicine visits:
- Do NOT add vitals that were not measured
- Do NOT describe physical exam findings that were not observed
- Use "unknown" liberally for missing information
- Add limitations to safety.limitations and doctor_editing.sections_needing_attention

If language of transcript is French:
- Output all free-text fields in FRENCH
- Keep medication names and medical terminology as stated
- Set "language": "fr" in output

JSON Schema Summary (you MUST follow this exactly):
{
  "schema_version": "1.0.0",
  "generated_at": "ISO8601 timestamp",
  "language": "en or fr",
  "encounter": { encounter_type, appointment_id, session_id, start_time, end_time, timezone, location },
  "participants": { provider, patient },
  "source": { transcript, data_quality },
  "chief_complaint": "string",
  "subjective": { hpi, ros, pmh, psh, medications, allergies, social_history, family_history },
  "objective": { vitals, telemedicine_observations, physical_exam_limited, diagnostics_reviewed },
  "assessment": { problem_list, clinical_impression_summary },
  "plan": { treatments, orders, follow_up, patient_education, work_school_notes },
  "coding_billing": { suggested_cpt, mdm_level_suggestion, rationale },
  "safety": { medication_safety_notes, limitations, requires_clinician_review },
  "doctor_editing": { draft_quality, recommended_clarifications, sections_needing_attention }
}"#;

pub const TRANSCRIPT_START: &str = "---TRANSCRIPT START---";
pub const TRANSCRIPT_END: &str = "---TRANSCRIPT END---";

fn context_lines(request: &GenerationRequest) -> String {
    let metadata = &request.metadata;
    let lines = [
        ("Appointment ID", request.appointment_id.as_deref()),
        ("Session ID", request.session_id.as_deref()),
        ("Provider", Some(metadata.provider_name.as_deref().unwrap_or("Unknown Provider"))),
        ("Provider Specialty", metadata.provider_specialty.as_deref()),
        ("Patient", Some(metadata.patient_name.as_deref().unwrap_or("Patient"))),
        ("Call Start Time", metadata.call_start_time.as_deref()),
        ("Call End Time", metadata.call_end_time.as_deref()),
        ("Transcript Language", Some(metadata.transcript_language.as_deref().unwrap_or("en"))),
    ];

    let mut context = String::new();
    for (label, value) in lines {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            let _ = writeln!(context, "{label}: {value}");
        }
    }
    context
}

/// User turn: encounter context followed by the delimited transcript.
pub fn user_message(request: &GenerationRequest) -> String {
    format!(
        "Please generate a SOAP note from the following medical transcript.\n\n\
         {context}\n\
         {TRANSCRIPT_START}\n\
         {transcript}\n\
         {TRANSCRIPT_END}\n\n\
         Generate the SOAP note as a single, complete JSON object following the exact schema. \
         Return ONLY the JSON object, no other text.",
        context = context_lines(request),
        transcript = request.transcript_text.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EncounterMetadata;

    #[test]
    fn test_user_message_carries_context_and_markers() {
        let request = GenerationRequest {
            session_id: Some("s-1".to_string()),
            appointment_id: Some("a-1".to_string()),
            transcript_text: "  Patient: J'ai de la fièvre.  ".to_string(),
            metadata: EncounterMetadata {
                provider_name: Some("Dr. Ngono".to_string()),
                transcript_language: Some("fr".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let message = user_message(&request);
        assert!(message.contains("Appointment ID: a-1\n"));
        assert!(message.contains("Provider: Dr. Ngono\n"));
        assert!(message.contains("Patient: Patient\n"));
        assert!(message.contains("Transcript Language: fr\n"));
        assert!(!message.contains("Call Start Time"));
        assert!(message.contains("---TRANSCRIPT START---\nPatient: J'ai de la fièvre.\n---TRANSCRIPT END---"));
    }

    #[test]
    fn test_system_prompt_enumerates_schema() {
        for key in [
            "schema_version",
            "generated_at",
            "encounter",
            "participants",
            "data_quality",
            "coding_billing",
            "safety",
            "doctor_editing",
        ] {
            assert!(SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }
}
