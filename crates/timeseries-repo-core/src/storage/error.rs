//! Errors raised by storage helpers.

use std::io;

use snafu::{Backtrace, IntoError, prelude::*};

/// Errors from reading, writing or listing files under a storage root.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// Nothing exists at the path.
    #[snafu(display("No file at {path}"))]
    NotFound {
        /// Absolute path that was probed.
        path: String,
        /// The filesystem error.
        source: io::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// Any other filesystem failure.
    #[snafu(display("Cannot {operation} {path}: {source}"))]
    Io {
        /// What was being done, e.g. "rename" or "list".
        operation: &'static str,
        /// Absolute path involved.
        path: String,
        /// The filesystem error.
        source: io::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Classify `source`, raised while doing `operation` on `path`.
    ///
    /// `io::ErrorKind::NotFound` becomes [`StorageError::NotFound`].
    pub(crate) fn from_io(operation: &'static str, path: &std::path::Path, source: io::Error) -> Self {
        let path = path.display().to_string();
        if source.kind() == io::ErrorKind::NotFound {
            NotFoundSnafu { path }.into_error(source)
        } else {
            IoSnafu { operation, path }.into_error(source)
        }
    }
}
