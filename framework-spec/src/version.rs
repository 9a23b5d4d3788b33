// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, num::ParseIntError, str::FromStr};

/// A four-part module version: `major.minor.build.revision`.
///
/// Parts omitted from the textual form default to zero, so `"1.2"` and
/// `"1.2.0.0"` parse to equal values. Ordering is lexicographic over the
/// four parts, which matches how managed loaders compare versions.
///
/// ```rust
/// use framework_spec::Version;
///
/// let version: Version = "20.0.3613".parse().unwrap();
/// assert_eq!(version, Version::new(20, 0, 3613, 0));
/// assert!(version > "20.0.0.9".parse().unwrap());
/// assert_eq!(version.to_string(), "20.0.3613.0");
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    major: u32,
    minor: u32,
    build: u32,
    revision: u32,
}

impl Version {
    /// Creates a new `Version` from its four parts.
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Returns the major component.
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Returns the minor component.
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns the build component.
    pub const fn build(&self) -> u32 {
        self.build
    }

    /// Returns the revision component.
    pub const fn revision(&self) -> u32 {
        self.revision
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionParseError::new(s, "empty version string"));
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for part in s.split('.') {
            if count == 4 {
                return Err(VersionParseError::new(s, "more than four parts"));
            }
            parts[count] = part
                .parse()
                .map_err(|err: ParseIntError| VersionParseError::new(s, err.to_string()))?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// An error returned while parsing a [`Version`] string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionParseError {
    input: String,
    reason: String,
}

impl VersionParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }

    /// Returns the string that could not be parsed.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version string '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for VersionParseError {}
