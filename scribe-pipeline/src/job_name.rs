//! Transcription job names
//!
//! Names have the shape `{prefix}-{appointmentId}-{suffix}` where the prefix
//! names the backend and the suffix is eight hex characters. Appointment ids
//! are UUIDs and contain the delimiter themselves, so the id is everything
//! between the first and the last `-`.

use std::fmt;

use uuid::Uuid;

use crate::language::BackendKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobName(String);

/// Components recovered from a job name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedJobName<'a> {
    pub prefix: &'a str,
    /// `None` for prefixes this pipeline did not issue
    pub backend: Option<BackendKind>,
    pub appointment_id: &'a str,
    pub suffix: &'a str,
}

impl JobName {
    pub fn generate(backend: BackendKind, appointment_id: &str) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self(format!("{}-{}-{}", backend.job_prefix(), appointment_id, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JobName> for String {
    fn from(name: JobName) -> Self {
        name.0
    }
}

/// Splits a job name; `None` when it has fewer than three segments.
pub fn parse(name: &str) -> Option<ParsedJobName<'_>> {
    let (prefix, rest) = name.split_once('-')?;
    let (appointment_id, suffix) = rest.rsplit_once('-')?;
    if prefix.is_empty() || appointment_id.is_empty() || suffix.is_empty() {
        return None;
    }
    Some(ParsedJobName {
        prefix,
        backend: BackendKind::from_job_prefix(prefix),
        appointment_id,
        suffix,
    })
}

/// Appointment id embedded in a job name.
pub fn appointment_id(name: &str) -> Option<&str> {
    parse(name).map(|parsed| parsed.appointment_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_id_extraction() {
        assert_eq!(appointment_id("medical-abc123-9f3e2a11"), Some("abc123"));
        assert_eq!(appointment_id("onlytwo-parts"), None);
        assert_eq!(appointment_id("single"), None);
        assert_eq!(appointment_id("medical--9f3e2a11"), None);
    }

    #[test]
    fn test_uuid_appointment_ids_survive() {
        let appointment = "3f2b8c1e-7d4a-4b9e-a2c5-0e1f2a3b4c5d";
        let name = JobName::generate(BackendKind::StandardAsr, appointment);
        let parsed = parse(name.as_str()).unwrap();
        assert_eq!(parsed.appointment_id, appointment);
        assert_eq!(parsed.backend, Some(BackendKind::StandardAsr));
        assert_eq!(parsed.suffix.len(), 8);
        assert!(parsed.suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let first = JobName::generate(BackendKind::MedicalAsr, "apt-1");
        let second = JobName::generate(BackendKind::MedicalAsr, "apt-1");
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("medical-apt-1-"));
    }

    #[test]
    fn test_foreign_prefix_has_no_backend() {
        let parsed = parse("medzen-medical-abc-12345678").unwrap();
        assert_eq!(parsed.backend, None);
        assert_eq!(parsed.appointment_id, "medical-abc");
    }
}
