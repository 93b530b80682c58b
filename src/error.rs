//! Error types shared across the runtime.
//!
//! A single [`Error`] type flows through the scheduler, the reactor bridge
//! and the network wrappers. The design follows two rules:
//!
//! - Failures a caller can observe and handle (EOF, I/O errors, timeouts,
//!   cancellation, shutdown races) are returned as `Err(Error)` and surface
//!   at the suspension point that awaited them.
//! - Misuse that would corrupt runtime state (double scheduler registration,
//!   setting a one-shot name twice, migrating to an unknown worker) is a
//!   programming error and panics with a diagnostic.

use core::fmt;
use std::io;
use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The peer or stream signalled end-of-input.
    Eof,
    /// Any other I/O failure (connect refused, reset, write to closed socket).
    Io,
    /// Deadline expired before completion.
    Timeout,
    /// The awaited resource was closed locally, or the producing side went
    /// away without completing.
    Cancelled,
    /// An address string failed to parse, or an unsupported family was used.
    InvalidArgument,
    /// Submission raced with teardown: a shut-down valve, a closed pool.
    Shutdown,
    /// A remote call failed at the protocol layer.
    Rpc,
}

impl ErrorKind {
    /// Short static name, used in `Display` output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eof => "end of stream",
            Self::Io => "i/o error",
            Self::Timeout => "timed out",
            Self::Cancelled => "cancelled",
            Self::InvalidArgument => "invalid argument",
            Self::Shutdown => "shut down",
            Self::Rpc => "rpc error",
        }
    }
}

/// The error type for runtime, valve and I/O operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates an error with a context message.
    #[must_use]
    pub fn with_context(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: Some(context.into()),
            source: None,
        }
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// True if the stream signalled end-of-input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, ErrorKind::Eof)
    }

    /// True for timeout errors.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// True if the awaited resource was closed locally.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(context) = &self.context {
            write!(f, ": {context}")?;
        }
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof => ErrorKind::Eof,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io,
        };
        Self::with_context(kind, err.to_string()).with_source(err)
    }
}

/// Extension trait for attaching context to results.
pub trait ResultExt<T> {
    /// Wraps the error with a context message, keeping its kind.
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context = match e.context {
                Some(old) => format!("{}: {old}", msg.into()),
                None => msg.into(),
            };
            Error {
                kind: e.kind,
                context: Some(context),
                source: e.source,
            }
        })
    }
}
