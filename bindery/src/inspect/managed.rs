// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::inspect::{md5_hex, pe, Inspect};
use crate::overrides::{apply_overrides, load_override_rules};
use crate::{BinaryKind, Error, ModuleData, Reference};
use camino::Utf8Path;
use framework_spec::{FrameworkVersion, Version};
use std::collections::BTreeSet;
use std::fs;

/// Two foundation assemblies every managed module references; edges to them
/// carry no information and are dropped at inspection time.
const WELL_KNOWN_REFERENCES: [&str; 2] = ["mscorlib", "System"];

/// Inspects managed modules by reading their PE/CLI metadata directly.
///
/// The reader never loads or executes the module, so inspecting a foreign
/// module cannot be disturbed by (or disturb) the host process.
#[derive(Debug, Default)]
pub struct ManagedInspector {
    _reserved: (),
}

impl ManagedInspector {
    /// Creates a new managed inspector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inspect for ManagedInspector {
    fn name(&self) -> &'static str {
        "managed"
    }

    fn inspect(&self, path: &Utf8Path) -> Result<ModuleData, Error> {
        let bytes = fs::read(path).map_err(|err| Error::Io(path.to_owned(), err))?;
        let raw = pe::read_assembly(&bytes).map_err(|err| Error::MalformedModule {
            path: path.to_owned(),
            message: err.0,
        })?;

        let binary_name = match &raw.assembly_name {
            Some(name) => name.clone(),
            // Module-only images: fall back to the module name's stem.
            None => Utf8Path::new(&raw.module_name)
                .file_stem()
                .unwrap_or(&raw.module_name)
                .to_owned(),
        };

        let mut module = ModuleData::new(BinaryKind::Managed);
        module.file_path = Some(path.to_owned());
        module.full_name = render_full_name(&binary_name, raw.version, &raw.culture);
        module.binary_name = binary_name;
        module.version = raw.version;
        module.framework = FrameworkVersion::parse(&raw.framework_id);
        module.framework_id = raw.framework_id;
        module.platform = raw.platform;
        module.content_hash = md5_hex(&bytes);

        for reference in &raw.references {
            if WELL_KNOWN_REFERENCES.contains(&reference.name.as_str()) {
                continue;
            }
            module.references.push(Reference::managed(
                reference.name.as_str(),
                Some(reference.version),
                render_full_name(&reference.name, Some(reference.version), &reference.culture),
            ));
        }

        // Platform-invoke targets, deduplicated on the lower-cased library
        // name. Import declarations may or may not carry an extension.
        let mut import_names = BTreeSet::new();
        for import in &raw.pinvoke_imports {
            import_names.insert(normalize_import_name(import));
        }
        for import in import_names {
            module.references.push(Reference::platform_invoke(import));
        }

        let rules = load_override_rules(path);
        apply_overrides(&mut module.references, &rules);

        Ok(module)
    }
}

/// Renders a display identity like `Name, Version=1.2.3.0, Culture=neutral`.
/// Public-key tokens are not part of the identity here.
fn render_full_name(name: &str, version: Option<Version>, culture: &str) -> String {
    let culture = if culture.is_empty() { "neutral" } else { culture };
    match version {
        Some(version) => format!("{}, Version={}, Culture={}", name, version, culture),
        None => format!("{}, Culture={}", name, culture),
    }
}

fn normalize_import_name(import: &str) -> String {
    let lowered = import.to_lowercase();
    for extension in [".dll", ".exe"] {
        if let Some(stem) = lowered.strip_suffix(extension) {
            return stem.to_owned();
        }
    }
    lowered
}
