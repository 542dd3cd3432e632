//! Language normalization and backend classification
//!
//! Callers send anything from `"EN-us"` to `"Fulfulde"`. [`normalize`] turns
//! that into one canonical code and [`classify`] maps the canonical code onto
//! the speech backend able to transcribe it. Both are pure and total: an
//! unrecognized language is routed to the generic backend, never rejected.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Code assumed when the caller sends no language at all.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Locales the medical speech backend accepts
pub const MEDICAL_LOCALES: &[&str] = &["en-US", "en-GB", "en-AU", "en-IN"];

/// Locales routed to the standard speech backend with PII redaction
pub const STANDARD_LOCALES: &[&str] = &["fr-FR", "fr-CA"];

/// Languages the generic backend is known to handle, with display names
pub const GENERIC_LANGUAGES: &[(&str, &str)] = &[
    // Fulfulde / Fula
    ("ff", "Fulfulde (General)"),
    ("ful", "Fulfulde"),
    ("ffm", "Maasina Fulfulde"),
    ("fub", "Adamawa Fulfulde"),
    ("fuc", "Pulaar"),
    ("fue", "Borgu Fulfulde"),
    ("fuf", "Pular"),
    ("fuh", "Western Niger Fulfulde"),
    ("fui", "Bagirmi Fulfulde"),
    ("fuq", "Central-Eastern Niger Fulfulde"),
    ("fuv", "Nigerian Fulfulde"),
    // Pidgins
    ("pcm", "Nigerian Pidgin"),
    ("wes", "Cameroonian Pidgin"),
    // Central, West, East and Southern Africa
    ("ln", "Lingala"),
    ("sg", "Sango"),
    ("wo", "Wolof"),
    ("tw", "Twi"),
    ("bm", "Bambara"),
    ("ha", "Hausa"),
    ("yo", "Yoruba"),
    ("ig", "Igbo"),
    ("ak", "Akan"),
    ("ee", "Ewe"),
    ("ti", "Tigrinya"),
    ("am", "Amharic"),
    ("om", "Oromo"),
    ("rw", "Kinyarwanda"),
    ("rn", "Kirundi"),
    ("sw", "Swahili"),
    ("lg", "Luganda"),
    ("zu", "Zulu"),
    ("xh", "Xhosa"),
    ("st", "Sesotho"),
    ("tn", "Setswana"),
    ("ts", "Tsonga"),
    ("ve", "Venda"),
    ("ss", "Swati"),
    ("nr", "Ndebele"),
    ("sn", "Shona"),
    ("ny", "Chichewa"),
];

/// ISO 639 codes belonging to the Fulah macrolanguage
const FULFULDE_CODES: &[&str] = &[
    "ff", "ful", "ffm", "fub", "fuc", "fue", "fuf", "fuh", "fui", "fuq", "fuv",
];

/// Names and shorthands accepted in place of a code. Keys are lower-case.
const SYNONYMS: &[(&str, &str)] = &[
    ("english", "en-US"),
    ("en", "en-US"),
    ("french", "fr-FR"),
    ("francais", "fr-FR"),
    ("français", "fr-FR"),
    ("fr", "fr-FR"),
    ("fulfulde", "ff"),
    ("fula", "ff"),
    ("fulani", "ff"),
    ("peul", "ff"),
    ("pidgin", "pcm"),
    ("nigerian pidgin", "pcm"),
    ("cameroon pidgin", "wes"),
    ("lingala", "ln"),
    ("sango", "sg"),
    ("hausa", "ha"),
    ("yoruba", "yo"),
    ("igbo", "ig"),
    ("swahili", "sw"),
    ("kiswahili", "sw"),
];

/// Speech backend family, fixed for the lifetime of a transcription job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "MedicalASR")]
    MedicalAsr,
    #[serde(rename = "StandardASR")]
    StandardAsr,
    #[serde(rename = "GenericASR")]
    GenericAsr,
}

impl BackendKind {
    /// Prefix embedded in job names
    pub fn job_prefix(self) -> &'static str {
        match self {
            Self::MedicalAsr => "medical",
            Self::StandardAsr => "standard",
            Self::GenericAsr => "whisper",
        }
    }

    pub fn from_job_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "medical" => Some(Self::MedicalAsr),
            "standard" => Some(Self::StandardAsr),
            "whisper" => Some(Self::GenericAsr),
            _ => None,
        }
    }

    /// Service label stored on the session record
    pub fn service_name(self) -> &'static str {
        match self {
            Self::MedicalAsr => "aws_transcribe_medical",
            Self::StandardAsr => "aws_transcribe_standard",
            Self::GenericAsr => "openai_whisper",
        }
    }

    /// Whether completion arrives later through a callback
    pub fn is_async(self) -> bool {
        !matches!(self, Self::GenericAsr)
    }
}

/// Maps a raw language identifier or name to its canonical code.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_LANGUAGE.to_string();
    }

    if let Some((_, canonical)) = SYNONYMS.iter().find(|(name, _)| *name == collapsed) {
        return (*canonical).to_string();
    }

    canonical_casing(&collapsed)
}

/// BCP-47 casing: language lower, script title, region upper.
fn canonical_casing(code: &str) -> String {
    let unified = code.replace('_', "-");
    let mut subtags = unified.split('-');
    let mut out = subtags.next().unwrap_or_default().to_string();

    for subtag in subtags {
        out.push('-');
        let alphabetic = subtag.chars().all(|c| c.is_ascii_alphabetic());
        match subtag.len() {
            2 if alphabetic => out.push_str(&subtag.to_ascii_uppercase()),
            4 if alphabetic => {
                let mut chars = subtag.chars();
                if let Some(first) = chars.next() {
                    out.push(first.to_ascii_uppercase());
                    out.push_str(chars.as_str());
                }
            }
            _ => out.push_str(subtag),
        }
    }
    out
}

/// Base language subtag of a canonical code (`"fuc-SN"` -> `"fuc"`).
fn base_language(code: &str) -> &str {
    code.split('-').next().unwrap_or(code)
}

/// True for any Fulah code, including region or script qualified forms.
pub fn is_fulfulde_variant(code: &str) -> bool {
    let base = base_language(code).to_ascii_lowercase();
    FULFULDE_CODES.contains(&base.as_str())
}

/// Selects the speech backend for a canonical code.
pub fn classify(canonical: &str) -> BackendKind {
    if MEDICAL_LOCALES.contains(&canonical) {
        BackendKind::MedicalAsr
    } else if STANDARD_LOCALES.contains(&canonical) {
        BackendKind::StandardAsr
    } else {
        BackendKind::GenericAsr
    }
}

/// True when the code appears in one of the routing tables.
pub fn is_declared(canonical: &str) -> bool {
    MEDICAL_LOCALES.contains(&canonical)
        || STANDARD_LOCALES.contains(&canonical)
        || GENERIC_LANGUAGES.iter().any(|(code, _)| *code == canonical)
        || is_fulfulde_variant(canonical)
}

/// Human-readable name, or the code itself when unknown.
pub fn language_name(canonical: &str) -> Cow<'_, str> {
    if MEDICAL_LOCALES.contains(&canonical) {
        return Cow::Borrowed("English");
    }
    if STANDARD_LOCALES.contains(&canonical) {
        return Cow::Borrowed("French");
    }
    if let Some((_, name)) = GENERIC_LANGUAGES.iter().find(|(code, _)| *code == canonical) {
        return Cow::Borrowed(name);
    }
    if is_fulfulde_variant(canonical) {
        return Cow::Borrowed("Fulfulde");
    }
    Cow::Owned(canonical.to_string())
}

/// Two-letter hint for the generic backend, `None` lets it auto-detect.
pub fn generic_language_hint(canonical: &str) -> Option<String> {
    if is_fulfulde_variant(canonical) {
        return Some("ff".to_string());
    }
    let base = base_language(canonical);
    (base.len() == 2 && base.chars().all(|c| c.is_ascii_lowercase())).then(|| base.to_string())
}

/// English transcripts need no translated entity extraction.
pub fn is_english(canonical: &str) -> bool {
    base_language(canonical).eq_ignore_ascii_case("en")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_synonyms_and_casing() {
        assert_eq!(normalize("English"), "en-US");
        assert_eq!(normalize("  FRANCAIS "), "fr-FR");
        assert_eq!(normalize("Nigerian   Pidgin"), "pcm");
        assert_eq!(normalize("EN-gb"), "en-GB");
        assert_eq!(normalize("fr_ca"), "fr-CA");
        assert_eq!(normalize("en"), "en-US");
        assert_eq!(normalize("sr-latn-rs"), "sr-Latn-RS");
        assert_eq!(normalize("Peul"), "ff");
    }

    #[test]
    fn test_empty_language_defaults_to_english() {
        assert_eq!(normalize(""), DEFAULT_LANGUAGE);
        assert_eq!(normalize("   "), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_every_medical_locale_routes_to_medical_backend() {
        for locale in MEDICAL_LOCALES {
            assert_eq!(classify(&normalize(locale)), BackendKind::MedicalAsr, "{locale}");
        }
        assert_eq!(classify(&normalize("EN")), BackendKind::MedicalAsr);
    }

    #[test]
    fn test_every_standard_locale_routes_to_standard_backend() {
        for locale in STANDARD_LOCALES {
            assert_eq!(classify(&normalize(locale)), BackendKind::StandardAsr, "{locale}");
        }
        assert_eq!(classify(&normalize("french")), BackendKind::StandardAsr);
    }

    #[test]
    fn test_fulfulde_variants_route_to_generic_backend() {
        for code in FULFULDE_CODES {
            assert!(is_fulfulde_variant(code));
            assert_eq!(classify(&normalize(code)), BackendKind::GenericAsr);
        }
        // Region-qualified dialects are not in any table but still match
        assert!(is_fulfulde_variant(&normalize("fuc_sn")));
        assert!(is_fulfulde_variant("FF-Latn"));
        assert!(!is_fulfulde_variant("fr-FR"));
    }

    #[test]
    fn test_unknown_language_falls_back_to_generic() {
        assert_eq!(classify(&normalize("klingon")), BackendKind::GenericAsr);
        assert_eq!(classify(&normalize("de-DE")), BackendKind::GenericAsr);
        assert!(!is_declared("de-DE"));
        assert!(is_declared("pcm"));
    }

    #[test]
    fn test_language_names() {
        assert_eq!(language_name("en-AU"), "English");
        assert_eq!(language_name("fr-CA"), "French");
        assert_eq!(language_name("wes"), "Cameroonian Pidgin");
        assert_eq!(language_name("ff-SN"), "Fulfulde");
        assert_eq!(language_name("xx"), "xx");
    }

    #[test]
    fn test_generic_language_hint() {
        assert_eq!(generic_language_hint("sw").as_deref(), Some("sw"));
        assert_eq!(generic_language_hint("fuv").as_deref(), Some("ff"));
        assert_eq!(generic_language_hint("de-DE").as_deref(), Some("de"));
        assert_eq!(generic_language_hint("pcm"), None);
    }

    #[test]
    fn test_backend_prefix_round_trip() {
        for kind in [BackendKind::MedicalAsr, BackendKind::StandardAsr, BackendKind::GenericAsr] {
            assert_eq!(BackendKind::from_job_prefix(kind.job_prefix()), Some(kind));
        }
        assert_eq!(BackendKind::from_job_prefix("medzen"), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_normalize_is_idempotent(raw in "\\PC{0,24}") {
                let once = normalize(&raw);
                prop_assert_eq!(normalize(&once), once);
            }

            #[test]
            fn prop_locale_shaped_input_is_idempotent(
                lang in "[a-zA-Z]{2,3}",
                sep in "[-_]",
                region in "[a-zA-Z]{2}",
            ) {
                let once = normalize(&format!("{lang}{sep}{region}"));
                prop_assert_eq!(normalize(&once), once.clone());
            }

            #[test]
            fn prop_classify_is_total(raw in "\\PC{0,24}") {
                let kind = classify(&normalize(&raw));
                if !is_declared(&normalize(&raw)) {
                    prop_assert_eq!(kind, BackendKind::GenericAsr);
                }
            }
        }
    }
}
