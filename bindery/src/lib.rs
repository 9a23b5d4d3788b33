// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inspect compiled modules and simulate runtime binding into a dependency
//! graph.
//!
//! `bindery` reads a directory (or single file) of compiled binary modules,
//! extracts each module's identity and outbound references, applies
//! user-supplied binding overrides, and resolves every reference against
//! the discovered set the way the runtime's own loader would — falling back
//! to placeholder nodes for references nothing satisfies, and flagging
//! down-grades and cross-framework violations along the way.
//!
//! # Examples
//!
//! ```no_run
//! use bindery::{Analyzer, PackageIndex};
//! use camino::Utf8Path;
//!
//! # fn main() -> Result<(), bindery::Error> {
//! let analyzer = Analyzer::new()?;
//! let packages = PackageIndex::initialize(&PackageIndex::default_roots());
//!
//! let graph = analyzer.analyze_directory(Utf8Path::new("/opt/app"), Some(&packages))?;
//! for node in graph.nodes() {
//!     println!(
//!         "{} ({} in, {} out)",
//!         node.module().binary_name(),
//!         node.incoming_count(),
//!         node.outgoing_count(),
//!     );
//!     for error in node.errors() {
//!         println!("  error: {}", error);
//!     }
//! }
//! packages.commit();
//! # Ok(())
//! # }
//! ```
//!
//! The three stages — the inspector pipeline, binding simulation, and the
//! package index — are independently usable; see [`Inspect`],
//! [`graph::DependencyGraph`] and [`PackageIndex`].

#![warn(missing_docs)]

mod analyzer;
pub mod concurrent;
pub mod errors;
pub mod graph;
mod inspect;
mod module;
mod overrides;
mod package_id;
mod package_index;
pub mod wire;

#[cfg(test)]
mod unit_tests;

pub use analyzer::Analyzer;
pub use errors::Error;
pub use inspect::{BridgeInspector, Inspect, ManagedInspector, NativeInspector};
pub use module::{BinaryKind, ModuleData, Platform, Reference, ReferenceKind};
pub use overrides::{apply_overrides, load_override_rules, parse_config, OverrideRule};
pub use package_id::PackageId;
pub use package_index::PackageIndex;

// Public re-exports for upstream crates used in APIs. The no_inline ensures
// that they show up as re-exports in documentation.
#[doc(no_inline)]
pub use camino::{Utf8Path, Utf8PathBuf};
// These are inlined -- framework-spec is effectively a private dependency,
// so expose its types as part of bindery's API.
pub use framework_spec::{
    legal, Error as FrameworkSpecError, FrameworkKind, FrameworkVersion, Version,
};
