// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The record types produced by module inspection.

use crate::PackageId;
use camino::{Utf8Path, Utf8PathBuf};
use framework_spec::{FrameworkVersion, Version};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// The kind of binary a module file turned out to be.
///
/// Variant order is stable: it is the order used by the wire encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum BinaryKind {
    /// A managed-runtime module.
    Managed,
    /// A native executable or library.
    Native,
    /// Not recognized as either.
    Unknown,
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryKind::Managed => "managed",
            BinaryKind::Native => "native",
            BinaryKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// The processor platform a module was built for.
///
/// Variant order is stable: it is the order used by the wire encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum Platform {
    /// Could not be determined.
    Unknown,
    /// IL-only, runs on any processor.
    AnyCpu,
    /// IL-only, but prefers to run as a 32-bit process.
    AnyCpuPrefer32,
    /// 64-bit x86.
    Amd64,
    /// 32-bit x86.
    X86,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Unknown => "unknown",
            Platform::AnyCpu => "anycpu",
            Platform::AnyCpuPrefer32 => "anycpu-prefer32",
            Platform::Amd64 => "amd64",
            Platform::X86 => "x86",
        };
        write!(f, "{}", s)
    }
}

/// The way a module declares a dependency on another module.
///
/// Variant order is stable: it is the order used by the wire encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum ReferenceKind {
    /// A managed assembly reference.
    ManagedRef,
    /// A platform-invoke call target.
    PlatformInvoke,
    /// An entry in a native import table.
    NativeImport,
    /// Anything else.
    Unknown,
}

impl ReferenceKind {
    /// Maps a reference kind to the kind of binary that can satisfy it.
    pub fn target_binary_kind(&self) -> BinaryKind {
        match self {
            ReferenceKind::ManagedRef => BinaryKind::Managed,
            ReferenceKind::PlatformInvoke | ReferenceKind::NativeImport => BinaryKind::Native,
            ReferenceKind::Unknown => BinaryKind::Unknown,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::ManagedRef => "managed",
            ReferenceKind::PlatformInvoke => "platform-invoke",
            ReferenceKind::NativeImport => "native-import",
            ReferenceKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A declared dependency from one module to another.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Reference {
    pub(crate) binary_name: String,
    pub(crate) declared_version: Option<Version>,
    pub(crate) effective_version: Option<Version>,
    pub(crate) full_name: String,
    pub(crate) codebase_hint: String,
    pub(crate) kind: ReferenceKind,
}

impl Reference {
    /// Creates a managed reference. The effective version starts out equal
    /// to the declared version; override application may move it.
    pub fn managed(
        binary_name: impl Into<String>,
        version: Option<Version>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            binary_name: binary_name.into(),
            declared_version: version,
            effective_version: version,
            full_name: full_name.into(),
            codebase_hint: String::new(),
            kind: ReferenceKind::ManagedRef,
        }
    }

    /// Creates a platform-invoke reference. Calls into native modules carry
    /// no managed version.
    pub fn platform_invoke(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            declared_version: None,
            effective_version: None,
            full_name: String::new(),
            codebase_hint: String::new(),
            kind: ReferenceKind::PlatformInvoke,
        }
    }

    /// Creates a native import-table reference.
    pub fn native_import(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            declared_version: None,
            effective_version: None,
            full_name: String::new(),
            codebase_hint: String::new(),
            kind: ReferenceKind::NativeImport,
        }
    }

    /// Returns the referenced binary name.
    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    /// Returns the version the module was compiled against.
    pub fn declared_version(&self) -> Option<Version> {
        self.declared_version
    }

    /// Returns the version after binding overrides were applied.
    pub fn effective_version(&self) -> Option<Version> {
        self.effective_version
    }

    /// Returns the full qualified name of the referenced module, or `""`
    /// when unknown.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the relative codebase hint attached by an override rule, or
    /// `""` when there is none.
    pub fn codebase_hint(&self) -> &str {
        &self.codebase_hint
    }

    /// Returns the reference kind.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }
}

/// Everything inspection learned about one module file.
///
/// Produced once per file by the inspector pipeline, then cached; not
/// mutated afterwards. Stub records synthesized for unresolved references
/// have no file path.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ModuleData {
    pub(crate) file_path: Option<Utf8PathBuf>,
    pub(crate) binary_name: String,
    pub(crate) full_name: String,
    pub(crate) version: Option<Version>,
    pub(crate) framework_id: String,
    pub(crate) framework: FrameworkVersion,
    pub(crate) platform: Platform,
    pub(crate) binary_kind: BinaryKind,
    pub(crate) content_hash: String,
    pub(crate) loader_error: String,
    pub(crate) references: Vec<Reference>,
    pub(crate) packages: BTreeSet<PackageId>,
}

impl ModuleData {
    /// Creates an empty record of the given kind. Used by inspectors as a
    /// starting point; the pipeline fills in path, name and hash defaults.
    pub fn new(binary_kind: BinaryKind) -> Self {
        Self {
            file_path: None,
            binary_name: String::new(),
            full_name: String::new(),
            version: None,
            framework_id: String::new(),
            framework: FrameworkVersion::unknown(),
            platform: Platform::Unknown,
            binary_kind,
            content_hash: String::new(),
            loader_error: String::new(),
            references: Vec::new(),
            packages: BTreeSet::new(),
        }
    }

    /// Creates a stub record for a reference that no live module satisfied.
    pub fn stub(
        binary_name: impl Into<String>,
        version: Option<Version>,
        full_name: impl Into<String>,
        binary_kind: BinaryKind,
    ) -> Self {
        let mut stub = Self::new(binary_kind);
        stub.binary_name = binary_name.into();
        stub.full_name = full_name.into();
        stub.version = version;
        stub
    }

    /// Returns the path of the inspected file, or `None` for a stub.
    pub fn file_path(&self) -> Option<&Utf8Path> {
        self.file_path.as_deref()
    }

    /// Returns the binary name (the file stem for on-disk modules).
    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    /// Returns the full qualified name, or `""` when unknown.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the module version, if one was found.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Returns the raw target-framework identifier string, or `""`.
    pub fn framework_id(&self) -> &str {
        &self.framework_id
    }

    /// Returns the parsed target framework.
    pub fn framework(&self) -> FrameworkVersion {
        self.framework
    }

    /// Returns the processor platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the kind of binary this is.
    pub fn binary_kind(&self) -> BinaryKind {
        self.binary_kind
    }

    /// Returns the lower-case hex MD5 of the file contents, or `""` for a
    /// stub.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Returns the loader error, or `""` if inspection succeeded.
    pub fn loader_error(&self) -> &str {
        &self.loader_error
    }

    /// Returns the module's outbound references in declaration order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Returns the packages in the local cache that could have supplied
    /// this module.
    pub fn packages(&self) -> &BTreeSet<PackageId> {
        &self.packages
    }

    /// Returns true if this record was synthesized for an unresolved
    /// reference.
    pub fn is_stub(&self) -> bool {
        self.file_path.is_none()
    }
}

impl fmt::Display for ModuleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary_name)?;
        if let Some(version) = self.version {
            write!(f, " v{}", version)?;
        }
        Ok(())
    }
}
