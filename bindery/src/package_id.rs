// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;
use std::fmt;

/// The identity of a package in a local package cache: a name plus a
/// version directory string.
///
/// Equality is case-sensitive and structural, matching the on-disk layout
/// of package roots (`root/<name>/<version>/...`). The version is kept as
/// the raw directory name: package versions routinely carry pre-release
/// suffixes that a numeric version cannot represent.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PackageId {
    name: String,
    version: String,
}

impl PackageId {
    /// Creates a new `PackageId` from a package name and version string.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Returns the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the package version string.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
