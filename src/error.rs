//! Crate-wide error type.
//!
//! Every fallible operation in agentpack returns [`Result`]. Errors that cross
//! a user-visible boundary must already be redacted of credential material;
//! see `crate::redact`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackError>;

#[derive(Debug, Error)]
pub enum PackError {
    /// Configuration file or value problems.
    #[error("config error: {0}")]
    Config(String),

    /// Input failed validation before any I/O was attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A source id that is not present in the registry.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// A selection that matches no catalog entry.
    #[error("bundle not found: {0}")]
    EntryNotFound(String),

    /// A bare-name selection that matches more than one source.
    #[error("ambiguous selection: {0}")]
    Ambiguous(String),

    /// Attempted removal of a source with `removable = false`.
    #[error("source is not removable: {0}")]
    Unremovable(String),

    /// A git subprocess failed. The message is already redacted.
    #[error("git error: {0}")]
    Git(String),

    /// Installed bytes do not match the catalog-declared digest.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// A write or delete target escaped its install root.
    #[error("path policy violation: {0}")]
    PathViolation(String),

    /// Credential store failure (keychain and encrypted file both failed).
    #[error("credential error: {0}")]
    Credential(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackError {
    /// Stable machine-readable code for robot-mode envelopes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::SourceNotFound(_) => "source_not_found",
            Self::EntryNotFound(_) => "entry_not_found",
            Self::Ambiguous(_) => "ambiguous_selection",
            Self::Unremovable(_) => "source_not_removable",
            Self::Git(_) => "git",
            Self::Integrity(_) => "integrity",
            Self::PathViolation(_) => "path_violation",
            Self::Credential(_) => "credential",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}
