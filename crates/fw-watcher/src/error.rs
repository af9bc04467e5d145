//! Error types for the fw-watcher crate.
//!
//! This module provides three error types:
//!
//! - [`WatchError`] for watch construction and registry operations. This is
//!   the only error a caller of the engine ever sees.
//! - [`DispatchError`] for failures inside a dispatch cycle. These are logged
//!   and counted at the watch boundary and never propagated.
//! - [`RenderError`] for failures reported by a [`Renderer`](crate::Renderer).

use camino::Utf8PathBuf;
use fw_core::{ConfigError, DiagramKind, WatchId};

/// Errors that can occur while creating, removing or running watches.
///
/// # Error Recovery Strategy
///
/// - **Config errors** ([`WatchError::Config`]): Fatal - the watch is never created
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the subscription could not be made
/// - **Path not found** ([`WatchError::PathNotFound`]): Fatal - the root must exist
/// - **Unknown watch** ([`WatchError::UnknownWatch`]): Recoverable - nothing was removed
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Fatal - a configured path is unusable
/// - **No runtime** ([`WatchError::NoRuntime`]): Fatal - watches need a tokio runtime
/// - **I/O errors** ([`WatchError::Io`]): Fatal - propagate immediately
///
/// # Examples
///
/// ```
/// use fw_watcher::WatchError;
/// use fw_core::WatchId;
///
/// let err = WatchError::UnknownWatch(WatchId::next());
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watch configuration was rejected.
    #[error("invalid watch configuration: {0}")]
    Config(#[from] ConfigError),

    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watch root does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// No watch with this handle is registered.
    #[error("no watch registered with handle {0}")]
    UnknownWatch(WatchId),

    /// A configured root or target resolves to a path that is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The watch was started outside of a tokio runtime.
    #[error("watches must be started from within a tokio runtime")]
    NoRuntime,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error leaves the caller's state untouched.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownWatch(_))
    }

    /// Returns `true` if this error is fatal for the operation that raised it.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) => Some(path),
            Self::Config(_)
            | Self::Notify(_)
            | Self::UnknownWatch(_)
            | Self::NonUtf8Path(_)
            | Self::NoRuntime
            | Self::Io(_) => None,
        }
    }
}

/// A failure reported by a renderer.
///
/// # Examples
///
/// ```
/// use fw_watcher::RenderError;
/// use fw_core::DiagramKind;
///
/// let err = RenderError::new(DiagramKind::Class, "syntax error in Foo.cs");
/// assert_eq!(err.to_string(), "class renderer failed: syntax error in Foo.cs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} renderer failed: {message}")]
pub struct RenderError {
    /// The renderer kind that failed.
    pub kind: DiagramKind,
    /// Human-readable failure description.
    pub message: String,
}

impl RenderError {
    /// Creates a new render error.
    #[inline]
    pub fn new(kind: DiagramKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors raised while executing a single dispatch action.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path the operation targeted.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The renderer reported a failure.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The blocking dispatch task panicked.
    #[error("dispatch task panicked: {0}")]
    TaskPanicked(String),
}

impl DispatchError {
    /// Creates a new [`DispatchError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_watch_error_path_not_found() {
        let err = WatchError::path_not_found("src/missing");
        assert!(!err.is_recoverable());
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("src/missing"));
        assert_eq!(err.to_string(), "path does not exist: src/missing");
    }

    #[test]
    fn test_watch_error_config_is_fatal() {
        let err = WatchError::from(ConfigError::invalid_option("mode", "unknown dispatch mode"));
        assert!(err.is_fatal());
        assert!(err.path().is_none());
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid watch configuration: invalid configuration option 'mode': unknown dispatch mode"
        );
    }

    #[test]
    fn test_watch_error_non_utf8_is_fatal() {
        let err = WatchError::non_utf8_path(PathBuf::from("test"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_watch_error_io() {
        let err = WatchError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "access denied",
        ));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::io(
            "/out/a.cs",
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert_eq!(err.to_string(), "I/O error on /out/a.cs: read-only");

        let err = DispatchError::from(RenderError::new(DiagramKind::Activity, "boom"));
        assert_eq!(err.to_string(), "activity renderer failed: boom");
    }
}
