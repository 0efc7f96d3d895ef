//! Error types for athena-link

use std::time::Duration;
use thiserror::Error;

/// Failure reported by the remote query service.
///
/// Carried verbatim to the caller. A submission can fail after the service has
/// already assigned an execution id; that id is kept in `execution_id` so the
/// caller can still look the execution up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    /// Service-assigned request id, when the transport surfaced one
    pub request_id: Option<String>,
    /// Execution id returned before the failure, if any
    pub execution_id: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            request_id: None,
            execution_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// Why the caller gave up on a running statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context canceled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Errors that can occur while driving a statement
#[derive(Error, Debug)]
pub enum DriverError {
    // Validation: detected before any remote call
    #[error("query is not valid: {0}")]
    InvalidQuery(String),

    #[error("unsupported argument type: {0}")]
    UnsupportedArgumentType(String),

    #[error("pseudo command {0:?} doesn't exist")]
    UnknownPseudoCommand(String),

    #[error("query buffer overflow: interpolated query exceeds {limit} bytes")]
    QueryBufferOverflow { limit: usize },

    // Policy
    #[error("writing to the database is disallowed in read-only mode")]
    ReadOnlyViolation,

    #[error("transactions are not supported")]
    TransactionUnsupported,

    #[error("workgroup {0:?} is disabled")]
    WorkgroupDisabled(String),

    #[error("workgroup {name:?} doesn't exist and workgroup remote creation is disabled: {source}")]
    WorkgroupUnavailable {
        name: String,
        #[source]
        source: RemoteError,
    },

    // Remote calls
    #[error(transparent)]
    Remote(#[from] RemoteError),

    // Execution outcomes
    /// The backend's reason text is the message; the id stays reachable
    /// through [`DriverError::execution_id`]
    #[error("{reason}")]
    QueryFailed { query_id: String, reason: String },

    #[error("query {query_id} was cancelled by the service")]
    QueryCancelled { query_id: String },

    #[error("query {query_id} timed out after {elapsed:?}")]
    QueryTimeout { query_id: String, elapsed: Duration },

    #[error("{0}")]
    Cancelled(CancelReason),

    // Cursor and statement misuse
    #[error("row has {found} values but result has {expected} columns")]
    ColumnArityMismatch { expected: usize, found: usize },

    #[error("cursor is closed")]
    CursorClosed,

    #[error("statement is closed")]
    StatementClosed,

    #[error("bad connection: {0}")]
    BadConnection(#[source] Box<DriverError>),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl DriverError {
    /// Execution id attached to a failed submission, if the service returned one
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            DriverError::Remote(e) => e.execution_id.as_deref(),
            DriverError::QueryFailed { query_id, .. }
            | DriverError::QueryCancelled { query_id }
            | DriverError::QueryTimeout { query_id, .. } => Some(query_id),
            DriverError::BadConnection(inner) => inner.execution_id(),
            _ => None,
        }
    }

    /// True for errors raised before anything was sent to the service
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DriverError::InvalidQuery(_)
                | DriverError::UnsupportedArgumentType(_)
                | DriverError::UnknownPseudoCommand(_)
                | DriverError::QueryBufferOverflow { .. }
        )
    }
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
