// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors returned by `framework-spec`.

use crate::Version;
use std::{error, fmt};

/// An error that happened while evaluating framework compatibility.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A `.NETStandard` target version has no entry in the compatibility
    /// table.
    UnsupportedStandardVersion(Version),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedStandardVersion(version) => {
                write!(f, "unsupported-standard-version: {}", version)
            }
        }
    }
}

impl error::Error for Error {}
