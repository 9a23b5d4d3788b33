// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::Version;
use std::{convert::Infallible, fmt, str::FromStr};

/// The flavor of managed runtime a module targets.
///
/// The declaration order of the variants is stable: it is the order used by
/// the wire encoding of inspected modules.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameworkKind {
    /// The classic desktop framework (`.NETFramework`).
    Framework,
    /// The portable API contract (`.NETStandard`).
    Standard,
    /// The cross-platform runtime (`.NETCoreApp`).
    CoreApp,
    /// Anything that could not be recognized.
    Unknown,
}

impl FrameworkKind {
    /// Returns the identifier token for this kind, e.g. `.NETFramework`.
    pub fn token(&self) -> &'static str {
        match self {
            FrameworkKind::Framework => ".NETFramework",
            FrameworkKind::Standard => ".NETStandard",
            FrameworkKind::CoreApp => ".NETCoreApp",
            FrameworkKind::Unknown => "Unknown",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            ".NETFramework" => Some(FrameworkKind::Framework),
            ".NETStandard" => Some(FrameworkKind::Standard),
            ".NETCoreApp" => Some(FrameworkKind::CoreApp),
            _ => None,
        }
    }
}

impl fmt::Display for FrameworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// A parsed target-framework identifier: a [`FrameworkKind`] plus a
/// [`Version`].
///
/// Parsing accepts the attribute grammar
/// `(kindToken)(,Version=v(x.y[.z[.w]]))?` and is total: any input that does
/// not match yields `{Unknown, 0.0.0.0}`. Rendering is symmetric, so
/// `render → parse` returns the original value for any known kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameworkVersion {
    kind: FrameworkKind,
    version: Version,
}

impl FrameworkVersion {
    /// Creates a new `FrameworkVersion` from a kind and version.
    pub const fn new(kind: FrameworkKind, version: Version) -> Self {
        Self { kind, version }
    }

    /// The value produced for unrecognized identifiers.
    pub const fn unknown() -> Self {
        Self::new(FrameworkKind::Unknown, Version::new(0, 0, 0, 0))
    }

    /// Parses an identifier string.
    ///
    /// Never fails: unrecognized input produces [`FrameworkVersion::unknown`].
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (token, rest) = match input.split_once(',') {
            Some((token, rest)) => (token, Some(rest)),
            None => (input, None),
        };

        let kind = match FrameworkKind::from_token(token) {
            Some(kind) => kind,
            None => return Self::unknown(),
        };

        let version = match rest {
            None => Version::default(),
            Some(rest) => {
                let version_str = match rest.trim().strip_prefix("Version=v") {
                    Some(version_str) => version_str,
                    None => return Self::unknown(),
                };
                match version_str.parse() {
                    Ok(version) => version,
                    Err(_) => return Self::unknown(),
                }
            }
        };

        Self::new(kind, version)
    }

    /// Returns the framework kind.
    pub const fn kind(&self) -> FrameworkKind {
        self.kind
    }

    /// Returns the framework version.
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns true if the kind is [`FrameworkKind::Unknown`].
    pub const fn is_unknown(&self) -> bool {
        matches!(self.kind, FrameworkKind::Unknown)
    }
}

impl FromStr for FrameworkVersion {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(input))
    }
}

impl fmt::Display for FrameworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FrameworkKind::Unknown => write!(f, "{}", self.kind.token()),
            _ => write!(f, "{},Version=v{}", self.kind.token(), self.version),
        }
    }
}
