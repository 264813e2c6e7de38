//! Error types for the MeshBus transport operator

use std::fmt;
use std::time::Duration;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors returned by the object store collaborator.
///
/// `NotFound`, `AlreadyExists` and `Conflict` describe expected transient or
/// initial states and are absorbed by the reconcile primitives wherever that
/// is the right reaction; only `Api` and `Serialization` always indicate a
/// real problem.
#[derive(Debug)]
pub enum StoreError {
    /// Object absent from the store
    NotFound { kind: String, name: String },
    /// Create raced with another writer
    AlreadyExists { kind: String, name: String },
    /// Update raced with a concurrent modification
    Conflict { kind: String, name: String },
    /// Any other store/API failure
    Api(String),
    /// Object could not be encoded or decoded
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { kind, name } => write!(f, "{} {} not found", kind, name),
            StoreError::AlreadyExists { kind, name } => {
                write!(f, "{} {} already exists", kind, name)
            }
            StoreError::Conflict { kind, name } => {
                write!(f, "conflicting write on {} {}", kind, name)
            }
            StoreError::Api(msg) => write!(f, "store API error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors that can occur while provisioning the transport
#[derive(Debug)]
pub enum OperatorError {
    /// Object store failure
    Store(StoreError),
    /// A required condition has not been met yet
    NotReady(String),
    /// Expected data absent from an otherwise ready object
    NotFound(String),
    /// The owning hub is being deleted; waiting any longer is pointless
    OwnerDeleting(String),
    /// A bounded wait ran out of time
    Timeout { what: String, elapsed: Duration },
    /// The caller asked us to stop
    Cancelled(String),
    /// Merge or status decoding failed; indicates a schema or logic bug
    Malformed(String),
    /// Invalid operator configuration
    Configuration(String),
}

impl OperatorError {
    /// True for errors that must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OperatorError::OwnerDeleting(_)
                | OperatorError::Cancelled(_)
                | OperatorError::Malformed(_)
                | OperatorError::Configuration(_)
        )
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorError::Store(err) => write!(f, "object store error: {}", err),
            OperatorError::NotReady(msg) => write!(f, "not ready: {}", msg),
            OperatorError::NotFound(msg) => write!(f, "not found: {}", msg),
            OperatorError::OwnerDeleting(msg) => write!(f, "owner is being deleted: {}", msg),
            OperatorError::Timeout { what, elapsed } => {
                write!(f, "timed out after {:?} waiting for {}", elapsed, what)
            }
            OperatorError::Cancelled(msg) => write!(f, "cancelled while waiting for {}", msg),
            OperatorError::Malformed(msg) => write!(f, "malformed object: {}", msg),
            OperatorError::Configuration(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for OperatorError {}

impl From<StoreError> for OperatorError {
    fn from(err: StoreError) -> Self {
        OperatorError::Store(err)
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Malformed(err.to_string())
    }
}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        OperatorError::Store(StoreError::Api(err.to_string()))
    }
}
