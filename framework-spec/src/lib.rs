// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parse and compare managed target-framework identifiers.
//!
//! Managed modules carry a target-framework attribute of the form
//! `.NETFramework,Version=v4.5` or `.NETStandard,Version=v2.0`. This crate
//! parses those identifiers into a structured [`FrameworkVersion`], renders
//! them back symmetrically, and answers the question at the heart of binding
//! legality: may a module built for framework `source` depend on a module
//! built for framework `target`?
//!
//! ```rust
//! use framework_spec::{legal, FrameworkKind, FrameworkVersion};
//!
//! let source: FrameworkVersion = ".NETFramework,Version=v4.6.1".parse().unwrap();
//! let target: FrameworkVersion = ".NETStandard,Version=v2.0".parse().unwrap();
//!
//! assert_eq!(source.kind(), FrameworkKind::Framework);
//! assert_eq!(legal(&source, &target), Ok(true));
//!
//! // A 4.5 framework module may not bind a netstandard2.0 module.
//! let old_source: FrameworkVersion = ".NETFramework,Version=v4.5".parse().unwrap();
//! assert_eq!(legal(&old_source, &target), Ok(false));
//! ```
//!
//! Identifier strings that cannot be understood parse to
//! [`FrameworkKind::Unknown`] rather than failing: an unrecognized framework
//! must never prevent a module from being inspected.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod errors;
mod compat;
mod framework;
mod version;

pub use compat::*;
pub use errors::Error;
pub use framework::*;
pub use version::*;
