// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::inspect::Inspect;
use crate::{wire, Error, ModuleData};
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Command;

/// Inspects modules by delegating to a helper process.
///
/// The helper receives the file path as its single argument and writes a
/// wire-encoded [`ModuleData`] to standard output. This is the isolation
/// seam for deployments that must run a third-party reflective loader: the
/// loader's state dies with the helper process instead of accumulating in
/// the analyzer.
#[derive(Debug)]
pub struct BridgeInspector {
    program: Utf8PathBuf,
}

impl BridgeInspector {
    /// Creates a bridge inspector running the helper at `program`.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Inspect for BridgeInspector {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn inspect(&self, path: &Utf8Path) -> Result<ModuleData, Error> {
        let output = Command::new(self.program.as_str())
            .arg(path.as_str())
            .output()
            .map_err(|err| Error::DumpTool {
                program: self.program.to_string(),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::DumpTool {
                program: self.program.to_string(),
                message: format!(
                    "helper exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        wire::decode_module(&output.stdout)
    }
}
