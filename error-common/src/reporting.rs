// Error reporting for handler responses

use serde::Serialize;

use crate::types::PipelineError;

/// Response body describing a failed invocation
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl From<&PipelineError> for ErrorReport {
    fn from(error: &PipelineError) -> Self {
        let raw_response = match error {
            PipelineError::MalformedOutput { raw_excerpt, .. } => Some(raw_excerpt.clone()),
            _ => None,
        };
        Self {
            success: false,
            error: error.error_code(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            raw_response,
        }
    }
}

/// Logs an error with its taxonomy fields.
pub fn log_error(context: &str, error: &PipelineError) {
    if error.status_code() >= 500 {
        tracing::error!(
            context = context,
            error_code = error.error_code(),
            error = %error,
            "Pipeline stage failed"
        );
    } else {
        tracing::warn!(
            context = context,
            error_code = error.error_code(),
            retryable = error.is_retryable(),
            error = %error,
            "Pipeline stage rejected request"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    #[test]
    fn test_report_carries_excerpt_for_malformed_output() {
        let err = PipelineError::malformed(codes::generation::INVALID_JSON_RESPONSE, "no json", "I cannot comply");
        let report = ErrorReport::from(&err);
        assert_eq!(report.error, "InvalidJsonResponse");
        assert_eq!(report.raw_response.as_deref(), Some("I cannot comply"));
        assert!(!report.success);
    }

    #[test]
    fn test_report_serializes_without_excerpt() {
        let err = PipelineError::throttled("ThrottlingException");
        let value = serde_json::to_value(ErrorReport::from(&err)).unwrap();
        assert_eq!(value["retryable"], true);
        assert!(value.get("raw_response").is_none());
    }
}
