//! Error handling for msgchain-rs
//!
//! This module defines the error taxonomy of the messaging runtime and a
//! Result alias for use throughout the crate.
//!
//! `Closed` is the normal termination signal of a worker loop, not a crash.
//! `UnhandledMessageKind` is a wiring mistake and is surfaced immediately.

use thiserror::Error;

/// Main error type for msgchain-rs operations
#[derive(Error, Debug)]
pub enum ChainError {
    /// The channel was closed before or during the operation
    #[error("Channel '{0}' is closed")]
    Closed(String),

    /// A blocking send on a full `block-with-timeout` channel ran out of time
    #[error("Send to channel '{channel}' timed out after {timeout_ms}ms")]
    SendTimeout { channel: String, timeout_ms: u64 },

    /// A receive (or select) with a deadline found nothing in time
    #[error("Receive timed out")]
    ReceiveTimeout,

    /// A ready channel produced a message kind with no registered handler
    #[error("Unhandled message kind '{kind}' on channel '{channel}'")]
    UnhandledMessageKind { channel: String, kind: &'static str },

    /// Configuration rejected during validation
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// The timer thread is no longer accepting schedules
    #[error("Timer service stopped")]
    TimerStopped,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ChainError>,
    },
}

impl ChainError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ChainError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check whether this error (or the error it wraps) is a closed-channel signal
    pub fn is_closed(&self) -> bool {
        match self {
            ChainError::Closed(_) => true,
            ChainError::WithContext { source, .. } => source.is_closed(),
            _ => false,
        }
    }
}

/// Result type alias for msgchain-rs operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
