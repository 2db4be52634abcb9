// src/core/error.rs

use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// A per-target failure. Never aborts a run: the runner stores it in the
/// affected target's result and moves on to the next target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeError {
    /// The raw target could not be turned into something probeable.
    #[error("malformed target '{target}': {reason}")]
    MalformedTarget { target: String, reason: String },

    /// The attempt did not finish before its deadline.
    #[error("timeout after {deadline_ms} ms")]
    Timeout { deadline_ms: u64 },

    /// The network stack reported a failure (refused, NXDOMAIN, TLS, ...).
    #[error("{message}{}", code_suffix(.code))]
    Transport { message: String, code: Option<String> },

    /// The operation completed but its outcome did not meet the expectation.
    #[error("{reason}")]
    ExpectationFailed { reason: String },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl ProbeError {
    pub fn malformed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(deadline: Duration) -> Self {
        Self::Timeout {
            deadline_ms: deadline.as_millis() as u64,
        }
    }

    pub fn transport(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::Transport {
            message: message.into(),
            code: code.map(str::to_string),
        }
    }

    pub fn expectation(reason: impl Into<String>) -> Self {
        Self::ExpectationFailed {
            reason: reason.into(),
        }
    }

    /// Machine-readable code, if the failure carries one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transport { code, .. } => code.as_deref(),
            Self::Timeout { .. } => Some("ETIMEDOUT"),
            Self::MalformedTarget { .. } | Self::ExpectationFailed { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Maps an I/O error kind onto the errno-style codes shown in reports.
pub fn io_error_code(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::NotFound => "ENOTFOUND",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::UnexpectedEof => "EPIPE",
        _ => "EIO",
    }
}

/// Flattens an error and its sources into one `a: b: c` line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// First `io::Error` in the source chain, if any.
pub fn find_io_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a io::Error> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = current {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            return Some(io);
        }
        current = cause.source();
    }
    None
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        ProbeError::transport(err.to_string(), Some(io_error_code(err.kind())))
    }
}
