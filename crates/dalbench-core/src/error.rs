//! Core error types.

use thiserror::Error;

/// Boxed error raised by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the benchmark crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Benchmark errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The adapter does not implement the requested shape or operation.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// A correctness check failed; timings collected afterwards would be meaningless.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Driver, transport or constraint failure inside a backend.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),

    /// Rows read back from storage do not form a valid aggregate graph.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing timings failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend(Box::new(err))
    }

    /// Shorthand for a failed assertion.
    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion(message.into())
    }

    /// Shorthand for an unsupported operation or shape.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    /// Check whether this error marks an unsupported combination.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = Error::backend(io);
        assert!(err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unsupported_is_distinct() {
        assert!(Error::unsupported("Complex_Objects").is_unsupported());
        assert!(!Error::assertion("search all").is_unsupported());
    }
}
