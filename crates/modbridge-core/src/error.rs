//! Unified error types for the module bridge.
//!
//! Every crate in the workspace maps its failures into [`AppError`] so the
//! loader, the instance manager and the dispatcher surface one error type
//! to their immediate caller.

use std::fmt;
use thiserror::Error;

/// Error categories. Load-time, registration-time, instantiation-time and
/// dispatch-time failures each have their own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The shared library could not be opened.
    LibraryNotFound,
    /// The library does not export the registration entry point.
    EntryPointMissing,
    /// The entry point returned a failure status.
    RegistrationRejected,
    /// The plugin invoked a registration member the emulation does not support.
    NotSupported,
    /// A host callback reported failure.
    HostCallback,
    /// The module factory reported an allocation failure.
    OutOfMemory,
    /// The module factory failed for any other reason.
    FactoryError,
    /// The plugin invoked a context member the emulation does not implement.
    NotImplemented,
    /// A lifecycle rule was violated (double termination, use after unload, ...).
    InvalidState,
    /// An arena handle did not resolve to a live object.
    NotFound,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An I/O error occurred.
    Io,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryNotFound => write!(f, "LIBRARY_NOT_FOUND"),
            Self::EntryPointMissing => write!(f, "ENTRY_POINT_MISSING"),
            Self::RegistrationRejected => write!(f, "REGISTRATION_REJECTED"),
            Self::NotSupported => write!(f, "NOT_SUPPORTED"),
            Self::HostCallback => write!(f, "HOST_CALLBACK"),
            Self::OutOfMemory => write!(f, "OUT_OF_MEMORY"),
            Self::FactoryError => write!(f, "FACTORY_ERROR"),
            Self::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
            Self::InvalidState => write!(f, "INVALID_STATE"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Io => write!(f, "IO"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout the bridge.
///
/// `status` carries the raw status code that crossed the ABI boundary when
/// the failure originated on the plugin or host side, so callers can inspect
/// it without the bridge reinterpreting it.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Raw status code returned across the boundary, if any.
    pub status: Option<i32>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attach the raw status code that caused this error.
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Create a library-not-found error.
    pub fn library_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LibraryNotFound, message)
    }

    /// Create an entry-point-missing error.
    pub fn entry_point_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EntryPointMissing, message)
    }

    /// Create a registration-rejected error.
    pub fn registration_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RegistrationRejected, message)
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    /// Create a host-callback error.
    pub fn host_callback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HostCallback, message)
    }

    /// Create an out-of-memory error.
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfMemory, message)
    }

    /// Create a factory error.
    pub fn factory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FactoryError, message)
    }

    /// Create a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            status: self.status,
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Io, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = AppError::entry_point_missing("no RegisterModule");
        assert_eq!(err.to_string(), "ENTRY_POINT_MISSING: no RegisterModule");
    }

    #[test]
    fn test_status_survives_clone() {
        let err = AppError::registration_rejected("rejected").with_status(-2147467259);
        let cloned = err.clone();
        assert!(cloned.is(ErrorKind::RegistrationRejected));
        assert_eq!(cloned.status, Some(-2147467259));
    }

    #[test]
    fn test_io_error_maps_to_io_kind() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
