//! Error types for the attribute resolver.
//!
//! Store failures are classified (connection, query, data quality) so the
//! façade can decide which ones abort a resolution. Failures reaching the
//! policy engine are expressed as [`AttributeError`] and converted to a
//! [`Status`] with an XACML status code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::DataType;
use crate::identity::DesignatorKind;

// ============================================================================
// STATUS (host vocabulary)
// ============================================================================

pub const STATUS_MISSING_ATTRIBUTE: &str = "urn:oasis:names:tc:xacml:1.0:status:missing-attribute";
pub const STATUS_PROCESSING_ERROR: &str = "urn:oasis:names:tc:xacml:1.0:status:processing-error";

/// Indeterminate status handed back to the policy engine (code + message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub codes: Vec<String>,
    pub message: String,
}

impl Status {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Status {
            codes: vec![code.to_string()],
            message: message.into(),
        }
    }

    pub fn missing_attribute(message: impl Into<String>) -> Self {
        Self::new(STATUS_MISSING_ATTRIBUTE, message)
    }

    pub fn processing_error(message: impl Into<String>) -> Self {
        Self::new(STATUS_PROCESSING_ERROR, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.codes.join(","), self.message)
    }
}

// ============================================================================
// STORE ERRORS
// ============================================================================

/// Failure class of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Connection,
    Query,
    DataQuality,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot open connection: {message}")]
    Connection { message: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Query failed: {0}")]
    Query(rusqlite::Error),

    #[error("Entity id '{entity_id}' is not a numeric key")]
    MalformedEntityId { entity_id: String },

    #[error("Attribute family '{external_id}' declares unknown data type '{value}'")]
    UnknownDataType { external_id: String, value: String },

    #[error("Attribute family '{external_id}' declares unknown multiplicity '{value}'")]
    UnknownMultiplicity { external_id: String, value: String },

    #[error("Invalid attribute family: {0}")]
    InvalidFamily(#[from] CatalogError),
}

impl StoreError {
    pub fn class(&self) -> FailureClass {
        match self {
            StoreError::Connection { .. } | StoreError::Unavailable { .. } => {
                FailureClass::Connection
            }
            StoreError::Query(_) => FailureClass::Query,
            StoreError::MalformedEntityId { .. }
            | StoreError::UnknownDataType { .. }
            | StoreError::UnknownMultiplicity { .. }
            | StoreError::InvalidFamily(_) => FailureClass::DataQuality,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        // Lock waits that exceeded busy_timeout count as unavailability
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy)
            | Some(rusqlite::ErrorCode::DatabaseLocked)
            | Some(rusqlite::ErrorCode::CannotOpen)
            | Some(rusqlite::ErrorCode::OperationInterrupted) => StoreError::Unavailable {
                message: err.to_string(),
            },
            _ => StoreError::Query(err),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// CATALOG ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("External name '{0}' has no namespace prefix")]
    MissingNamespace(String),

    #[error("External name '{0}' has an empty short name")]
    EmptyShortName(String),
}

// ============================================================================
// RESOLUTION ERRORS
// ============================================================================

/// Errors surfaced by the resolution façade.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// Status produced by the evaluation context, passed through unchanged.
    #[error("Indeterminate context: {0}")]
    Indeterminate(Status),

    #[error("Missing {0} identifier")]
    MissingIdentifier(DesignatorKind),

    #[error("Multiple {0} identifiers")]
    AmbiguousIdentifier(DesignatorKind),

    #[error("Unsupported designator kind: {0}")]
    UnsupportedDesignatorKind(String),

    #[error("Cannot coerce '{value}' to {data_type}")]
    TypeCoercion { value: String, data_type: DataType },

    #[error("Corrupt attribute family: {0}")]
    CorruptFamily(String),

    #[error("Attribute store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Attribute query failed: {0}")]
    Query(String),
}

impl AttributeError {
    /// Converts this error into the host engine's status vocabulary.
    pub fn to_status(&self) -> Status {
        match self {
            AttributeError::Indeterminate(status) => status.clone(),
            AttributeError::MissingIdentifier(kind) => {
                Status::missing_attribute(format!("missing {}-id", kind.name()))
            }
            AttributeError::AmbiguousIdentifier(kind) => {
                Status::processing_error(format!("multiple {} ids", kind.name()))
            }
            other => Status::processing_error(other.to_string()),
        }
    }
}

impl From<StoreError> for AttributeError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err.class() {
            FailureClass::Connection => AttributeError::StoreUnavailable(message),
            FailureClass::Query => AttributeError::Query(message),
            FailureClass::DataQuality => AttributeError::CorruptFamily(message),
        }
    }
}

pub type AttributeResult<T> = std::result::Result<T, AttributeError>;

// ============================================================================
// TESTS
// ============================================================================
