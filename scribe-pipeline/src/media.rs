//! Object locations and audio media descriptors

use std::fmt;

use error_common::{codes, PipelineError, PipelineResult};

/// Bucket and key of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parses `s3://bucket/key` and the path-style or virtual-hosted HTTPS
    /// forms the speech backend reports for its output files.
    ///
    /// # Errors
    ///
    /// Returns a validation error for anything that does not name an object.
    pub fn parse(uri: &str) -> PipelineResult<Self> {
        let invalid = || {
            PipelineError::validation(
                codes::validation::INVALID_INPUT,
                format!("not an object storage URI: {uri}"),
            )
        };

        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
            return Self::non_empty(bucket, key).ok_or_else(invalid);
        }

        let rest = uri.strip_prefix("https://").ok_or_else(invalid)?;
        let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
        if !host.ends_with(".amazonaws.com") {
            return Err(invalid());
        }
        if host.starts_with("s3.") || host.starts_with("s3-") {
            // https://s3.region.amazonaws.com/bucket/key
            let (bucket, key) = path.split_once('/').ok_or_else(invalid)?;
            Self::non_empty(bucket, key).ok_or_else(invalid)
        } else {
            // https://bucket.s3.region.amazonaws.com/key
            let (bucket, _) = host.split_once(".s3").ok_or_else(invalid)?;
            Self::non_empty(bucket, path).ok_or_else(invalid)
        }
    }

    fn non_empty(bucket: &str, key: &str) -> Option<Self> {
        (!bucket.is_empty() && !key.is_empty()).then(|| Self::new(bucket, key))
    }

    /// Last path segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Media format understood by the speech backends, `mp4` when unknown.
pub fn media_format(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("mp3") => "mp3",
        Some("wav") => "wav",
        Some("flac") => "flac",
        Some("ogg") => "ogg",
        Some("webm") => "webm",
        Some("amr") => "amr",
        _ => "mp4",
    }
}

/// MIME type sent with uploaded audio, `audio/mp4` when unknown.
pub fn mime_type(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("amr") => "audio/amr",
        _ => "audio/mp4",
    }
}
