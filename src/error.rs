//! Crate-level error types.
//!
//! Low-level components (timestamp parser, validators, start-position
//! resolver) never return [`ReplayError`]; they hand back tagged values such
//! as [`ValidationError`] and [`StartPositionError`] so callers can re-prompt
//! precisely. Mid-level components (fetcher, merger) return `Err(ReplayError)`
//! because a transport failure leaves no meaningful partial result.

use thiserror::Error;

/// Machine-distinguishable validation failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    ResponseArrayEmpty,
    ResponseIndexOutOfRange,
    SpeedMultiplierNonPositive,
    SpeedMultiplierNotFinite,
    TimestampInvalidFormat,
    NoInvalidFormat,
    UrlInvalidFormat,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCode::ResponseArrayEmpty => "RESPONSE_ARRAY_EMPTY",
            ValidationCode::ResponseIndexOutOfRange => "RESPONSE_INDEX_OUT_OF_RANGE",
            ValidationCode::SpeedMultiplierNonPositive => "SPEED_MULTIPLIER_NON_POSITIVE",
            ValidationCode::SpeedMultiplierNotFinite => "SPEED_MULTIPLIER_NOT_FINITE",
            ValidationCode::TimestampInvalidFormat => "TIMESTAMP_INVALID_FORMAT",
            ValidationCode::NoInvalidFormat => "NO_INVALID_FORMAT",
            ValidationCode::UrlInvalidFormat => "URL_INVALID_FORMAT",
        }
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected user-supplied value.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    /// The offending input, echoed back for display.
    pub input: String,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            input: input.into(),
        }
    }
}

/// Why a start anchor could not be mapped to an instant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartPositionError {
    #[error("response index is out of range ({min}..={max})")]
    IndexOutOfRange { min: usize, max: usize },
    #[error("post {searched} was not found in this thread")]
    NoNotFound { searched: String },
    #[error(
        "invalid timestamp '{input}' (expected e.g. 25/11/16(日)22:48:03 or 2025/11/16 22:48:03)"
    )]
    TimestampParse { input: String },
}

impl StartPositionError {
    /// Stable kind tag, matching the settings form's error taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            StartPositionError::IndexOutOfRange { .. } => "index_out_of_range",
            StartPositionError::NoNotFound { .. } => "no_not_found",
            StartPositionError::TimestampParse { .. } => "timestamp_parse_error",
        }
    }
}

/// The settings field a [`SettingsError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    StartValue,
    SpeedMultiplier,
    Urls,
}

/// A settings form submission that could not be turned into settings.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SettingsError {
    pub field: SettingsField,
    pub message: String,
}

/// Errors surfaced by fetching, merging, polling and the session lifecycle.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The request could not be sent or the body could not be read.
    #[error("failed to fetch thread {url}: {detail}")]
    Transport { url: String, detail: String },
    /// The server replied with a non-2xx status.
    #[error("failed to fetch thread {url} (status: {status})")]
    HttpStatus { url: String, status: u16 },
    #[error("thread container not found in the document")]
    ContainerNotFound,
    /// The live document was mutably borrowed while a capture ran.
    #[error("thread document is busy")]
    DocumentBusy,
    #[error("no responses were found in this thread")]
    NoResponses,
    #[error("response #{index} has no matching element")]
    MissingElement { index: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    StartPosition(#[from] StartPositionError),
    #[error("invalid config {path}: {detail}")]
    Config { path: String, detail: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReplayError {
    /// Expected failures get a plain notification; everything else is also
    /// logged with full detail.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ReplayError::Transport { .. }
                | ReplayError::HttpStatus { .. }
                | ReplayError::NoResponses
                | ReplayError::Validation(_)
                | ReplayError::Settings(_)
                | ReplayError::StartPosition(_)
                | ReplayError::Config { .. }
        )
    }
}
