//! Core error types for Quarry.

use thiserror::Error;

/// Result type alias using `QuarryError`.
pub type QuarryResult<T> = std::result::Result<T, QuarryError>;

/// Generic boxed error for external error sources.
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Core error type for Quarry operations.
///
/// Errors fall into three families that callers treat differently:
///
/// - usage defects ([`IllegalState`](Self::IllegalState)): the caller broke an
///   operator, cursor or builder contract. They recur deterministically and
///   abort the pipeline.
/// - data-dependent failures ([`ResourceExhausted`](Self::ResourceExhausted)):
///   the driver's caller may retry with a larger budget.
/// - everything else (schema, type and value errors) which is reported as-is.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuarryError {
    /// Type mismatch or invalid type operation.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Invalid value provided or produced (e.g. arithmetic overflow).
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Schema or alignment mismatch between pages, blocks or sources.
    #[error("SchemaError: {0}")]
    SchemaError(String),

    /// A usage contract was violated by the caller.
    #[error("IllegalState: {0}")]
    IllegalState(String),

    /// A memory budget was exceeded.
    #[error("ResourceExhausted: {0}")]
    ResourceExhausted(String),

    /// Execution was cancelled by the driver's owner.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Query execution error.
    #[error("ExecutionError: {0}")]
    ExecutionError(String),

    /// Internal error (bug in Quarry).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Arrow error.
    #[error("ArrowError: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// External error from third-party libraries.
    #[error("ExternalError: {0}")]
    ExternalError(GenericError),
}

impl QuarryError {
    /// Create a new `TypeError`.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `SchemaError`.
    pub fn schema_error<S: Into<String>>(msg: S) -> Self {
        Self::SchemaError(msg.into())
    }

    /// Create a new `IllegalState` error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create a new `ExecutionError`.
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a resource exhausted error.
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// True for contract violations by the caller. These never depend on
    /// input data and must not be retried.
    pub const fn is_usage_defect(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    /// True when a memory budget was exceeded.
    pub const fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }
}

/// Ensure a condition holds, returning an `ExecutionError` if not.
///
/// The second form names the variant: `ensure!(cond, IllegalState: "...")`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::QuarryError::ExecutionError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::QuarryError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with an `IllegalState` error.
#[macro_export]
macro_rules! illegal_state {
    ($($arg:tt)*) => {
        return Err($crate::QuarryError::IllegalState(format!($($arg)*)))
    };
}

/// Return early with a `ValueError`.
#[macro_export]
macro_rules! value_err {
    ($($arg:tt)*) => {
        return Err($crate::QuarryError::ValueError(format!($($arg)*)))
    };
}

/// Return early with a `TypeError`.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::QuarryError::TypeError(format!($($arg)*)))
    };
}
