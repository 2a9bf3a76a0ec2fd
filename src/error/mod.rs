//! Error types and handlers for synchronization operations

pub mod handlers;

use crate::model::PackageType;
use std::fmt;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Catalog pagination or transport failure, fatal to the whole run
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Package type outside the supported enumeration
    #[error("unsupported package type: {0}")]
    UnsupportedPackageType(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Download or upload that kept failing until the retry budget ran out
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Transfer {
        operation: String,
        attempts: u32,
        source: Box<SyncError>,
    },

    #[error("Metadata propagation error: {0}")]
    MetadataPropagation(String),

    #[error("Visibility propagation error: {0}")]
    VisibilityPropagation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from a registry endpoint
    #[error("Registry error: {0}")]
    Registry(String),

    /// Artifact descriptor missing, unreadable or inconsistent with the version
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Unwraps retry wrappers down to the error that actually happened.
    pub fn root_cause(&self) -> &SyncError {
        match self {
            SyncError::Transfer { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), SyncError::Cancelled)
    }
}

/// What a validation rule was applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationScope {
    Package(String),
    Version(String),
}

impl fmt::Display for ValidationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationScope::Package(name) => write!(f, "package '{}'", name),
            ValidationScope::Version(name) => write!(f, "version '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation error for {package_type} {scope}: {message}")]
pub struct ValidationError {
    pub package_type: PackageType,
    pub scope: ValidationScope,
    pub message: String,
}

impl ValidationError {
    pub fn package(package_type: PackageType, name: &str, message: impl Into<String>) -> Self {
        Self {
            package_type,
            scope: ValidationScope::Package(name.to_string()),
            message: message.into(),
        }
    }

    pub fn version(package_type: PackageType, name: &str, message: impl Into<String>) -> Self {
        Self {
            package_type,
            scope: ValidationScope::Version(name.to_string()),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Parse(format!("CSV error: {}", err))
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        SyncError::Descriptor(format!("invalid archive: {}", err))
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Config(err.to_string())
    }
}
