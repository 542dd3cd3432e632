// Stable error codes surfaced in handler responses.

pub mod validation {
    pub const INVALID_INPUT: &str = "InvalidInput";
    pub const MISSING_SESSION_ID: &str = "MissingSessionId";
    pub const MISSING_APPOINTMENT_ID: &str = "MissingAppointmentId";
    pub const EMPTY_TRANSCRIPT: &str = "EmptyTranscript";
    pub const MISSING_AUDIO_LOCATION: &str = "MissingAudioLocation";
    pub const INVALID_EVENT: &str = "InvalidEvent";
}

pub mod generation {
    pub const BEDROCK_THROTTLED: &str = "BedrockThrottled";
    pub const TOKEN_LIMIT_EXCEEDED: &str = "TokenLimitExceeded";
    pub const INVALID_JSON_RESPONSE: &str = "InvalidJsonResponse";
    pub const INVALID_MODEL_RESPONSE: &str = "InvalidBedrockResponse";
}

pub mod collaborator {
    pub const DATASTORE_FAILED: &str = "DatastoreError";
    pub const STORAGE_FAILED: &str = "StorageError";
    pub const TRANSCRIPTION_FAILED: &str = "TranscriptionError";
    pub const MODEL_FAILED: &str = "BedrockError";
    pub const QUEUE_FAILED: &str = "QueueError";
    pub const NOTIFICATION_FAILED: &str = "NotificationError";
}

pub mod system {
    pub const NOT_FOUND: &str = "NotFound";
    pub const CONFIGURATION: &str = "ConfigurationError";
    pub const SERIALIZATION: &str = "SerializationError";
    pub const INTERNAL: &str = "InternalError";
}
