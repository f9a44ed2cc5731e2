//! Error types for mapping, resolution, link import and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Lookup of a protocol name the registry does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown protocol \"{name}\"")]
pub struct UnknownProtocol {
    pub name: String,
}

/// Errors while converting between flat and structured outbounds.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("section not found: {section}")]
    SectionNotFound { section: String },

    #[error("section {section} has no protocol")]
    MissingProtocol { section: String },

    #[error("section {section}: unknown protocol \"{protocol}\"")]
    UnknownProtocol { section: String, protocol: String },

    #[error("tag \"{tag}\" is already used by {owner}")]
    DuplicateTag { tag: String, owner: String },
}

impl MapError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors during dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown field \"{field}\"")]
    UnknownField { field: String },

    #[error("rule for \"{field}\" references unknown field \"{referenced}\"")]
    UnknownRuleField { field: String, referenced: String },
}

impl ResolveError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Why a share link was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("empty line")]
    Empty,

    #[error("unsupported scheme: expected vmess://")]
    UnsupportedScheme,

    #[error("payload is not valid base64")]
    InvalidEncoding,

    #[error("payload is not a valid link object: {message}")]
    InvalidPayload { message: String },

    #[error("unsupported link version \"{version}\"")]
    UnsupportedVersion { version: String },

    #[error("unsupported network \"{network}\"")]
    UnsupportedNetwork { network: String },

    #[error("tag \"{tag}\" is already used by {owner}")]
    DuplicateTag { tag: String, owner: String },
}

/// What is wrong with a single field value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// The field references the entry's own tag.
    SelfReferenceNotAllowed,
    /// A validator rejected the value; the message is passed through verbatim.
    ValidationFailed(String),
}

/// Field-scoped validation error.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// Flat key of the offending field.
    pub field: String,
    #[serde(flatten)]
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn self_reference(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::SelfReferenceNotAllowed,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::ValidationFailed(message.into()),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FieldErrorKind::SelfReferenceNotAllowed => {
                write!(f, "{}: unable to use current outbound as proxy", self.field)
            }
            FieldErrorKind::ValidationFailed(message) => write!(f, "{}: {}", self.field, message),
        }
    }
}

impl std::error::Error for FieldError {}

/// Errors during section validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<FieldError> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Map(e) => e.exit_code(),
            ValidateError::Resolve(e) => e.exit_code(),
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

/// Errors while reading or writing flat records.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::InvalidJson { .. } => 2,
            _ => 3,
        }
    }
}

/// Errors reported by a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("section not found: {section}")]
    SectionNotFound { section: String },
}
