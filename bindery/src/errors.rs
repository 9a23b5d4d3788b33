// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contains types that describe errors and warnings that `bindery` methods can return.

use camino::Utf8PathBuf;
use std::{error, fmt, io, path::PathBuf};

/// Error type describing the sorts of errors `bindery` can return.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The inspection target does not exist.
    FileNotFound(Utf8PathBuf),
    /// An I/O error occurred while reading a file.
    Io(Utf8PathBuf, io::Error),
    /// A path was not valid UTF-8 and cannot be inspected.
    NonUtf8Path(PathBuf),
    /// A managed module could not be decoded.
    MalformedModule {
        /// The file that failed to decode.
        path: Utf8PathBuf,
        /// What went wrong.
        message: String,
    },
    /// The native dump utility could not be run or produced an unusable
    /// report.
    DumpTool {
        /// The program that was invoked.
        program: String,
        /// What went wrong.
        message: String,
    },
    /// A wire-encoded record could not be decoded. Recoverable: callers
    /// surface this as a loader error.
    Serialization(String),
    /// An internal error occurred while constructing a dependency graph.
    GraphInternalError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FileNotFound(path) => write!(f, "file not found: {}", path),
            Error::Io(path, err) => write!(f, "error while reading {}: {}", path, err),
            Error::NonUtf8Path(path) => {
                write!(f, "path is not valid UTF-8: {}", path.display())
            }
            Error::MalformedModule { path, message } => {
                write!(f, "error while decoding managed module {}: {}", path, message)
            }
            Error::DumpTool { program, message } => {
                write!(f, "error while running dump tool '{}': {}", program, message)
            }
            Error::Serialization(message) => {
                write!(f, "error while decoding module record: {}", message)
            }
            Error::GraphInternalError(message) => {
                write!(f, "internal error in dependency graph: {}", message)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(_, err) => Some(err),
            Error::FileNotFound(_)
            | Error::NonUtf8Path(_)
            | Error::MalformedModule { .. }
            | Error::DumpTool { .. }
            | Error::Serialization(_)
            | Error::GraphInternalError(_) => None,
        }
    }
}
