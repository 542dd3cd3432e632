use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use crate::LoggerError;

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PHONE_PATTERN: &str = r"(?:\+\d{1,3}[-.\s]?)?\(?\b[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b";
const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
const CREDIT_CARD_PATTERN: &str = r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b";
const IP_PATTERN: &str = r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b";
const MRN_PATTERN: &str = r"(?i)\bMRN[-:\s]*\d{4,}\b";

lazy_static! {
    static ref DEFAULT_REDACTOR: Option<PiiRedactor> = PiiRedactor::new(RedactionConfig::default()).ok();
}

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    pub redact_credit_cards: bool,
    pub redact_ip_addresses: bool,
    pub redact_record_numbers: bool,
    pub hash_for_correlation: bool,
    /// Extra `(pattern, replacement)` pairs applied after the built-in ones
    pub custom_patterns: Vec<(String, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_credit_cards: true,
            redact_ip_addresses: true,
            redact_record_numbers: true,
            hash_for_correlation: true,
            custom_patterns: Vec::new(),
        }
    }
}

struct Rule {
    label: &'static str,
    pattern: Regex,
    mask: &'static str,
}

/// PII redactor for log messages
pub struct PiiRedactor {
    hash_for_correlation: bool,
    rules: Vec<Rule>,
    custom: Vec<(Regex, String)>,
}

impl PiiRedactor {
    /// Compiles the enabled patterns.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidPattern`] when a custom pattern does not compile.
    pub fn new(config: RedactionConfig) -> Result<Self, LoggerError> {
        // Card numbers run before phones so a 16-digit run is not split into a phone match.
        let candidates = [
            (config.redact_emails, "EMAIL", EMAIL_PATTERN, "***@***"),
            (config.redact_ssn, "SSN", SSN_PATTERN, "***-**-****"),
            (config.redact_credit_cards, "CC", CREDIT_CARD_PATTERN, "****-****-****-****"),
            (config.redact_phones, "PHONE", PHONE_PATTERN, "(***) ***-****"),
            (config.redact_ip_addresses, "IP", IP_PATTERN, "***.***.***.***"),
            (config.redact_record_numbers, "MRN", MRN_PATTERN, "MRN******"),
        ];

        let mut rules = Vec::new();
        for (enabled, label, pattern, mask) in candidates {
            if enabled {
                rules.push(Rule {
                    label,
                    pattern: Regex::new(pattern)?,
                    mask,
                });
            }
        }

        let custom = config
            .custom_patterns
            .into_iter()
            .map(|(pattern, replacement)| Ok((Regex::new(&pattern)?, replacement)))
            .collect::<Result<Vec<_>, LoggerError>>()?;

        Ok(Self {
            hash_for_correlation: config.hash_for_correlation,
            rules,
            custom,
        })
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        for rule in &self.rules {
            result = rule
                .pattern
                .replace_all(&result, |caps: &Captures| {
                    let matched = caps.get(0).map_or("", |m| m.as_str());
                    if self.hash_for_correlation {
                        format!("{}[{}]", rule.label, hash_value(matched))
                    } else {
                        rule.mask.to_string()
                    }
                })
                .into_owned();
        }

        for (pattern, replacement) in &self.custom {
            result = pattern.replace_all(&result, replacement.as_str()).into_owned();
        }

        result
    }
}

/// Redacts with the default rules and truncates to `max_chars` characters.
///
/// Falls back to a fixed marker if the default rules could not be compiled,
/// so unredacted text never reaches a log line.
pub fn log_excerpt(text: &str, max_chars: usize) -> String {
    let Some(redactor) = DEFAULT_REDACTOR.as_ref() else {
        return "[REDACTED]".to_string();
    };
    let redacted = redactor.redact(text);
    if redacted.chars().count() > max_chars {
        let mut excerpt: String = redacted.chars().take(max_chars).collect();
        excerpt.push_str("...");
        excerpt
    } else {
        redacted
    }
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    // First 8 bytes keep the marker short
    let prefix: Vec<u8> = digest.iter().take(8).copied().collect();
    general_purpose::STANDARD.encode(prefix)
}
