// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::inspect::Inspect;
use crate::module::Platform;
use crate::{BinaryKind, Error, ModuleData, Reference};
use camino::Utf8Path;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const FILE_HEADER_MARKER: &str = "FILE HEADER VALUES";
const DEPENDENCIES_MARKER: &str = "Image has the following dependencies:";

/// Inspects native binaries by running an external dump utility and parsing
/// its textual report.
///
/// The utility defaults to `dumpbin` on the search path; deployments
/// without it point the inspector at any tool that emits a
/// dumpbin-compatible report. The inspector owns a scratch directory used
/// as the subprocess working directory, deleted when the inspector is
/// dropped.
#[derive(Debug)]
pub struct NativeInspector {
    program: String,
    args: Vec<String>,
    scratch: TempDir,
}

impl NativeInspector {
    /// Creates an inspector running the default `dumpbin` tool.
    pub fn new() -> Result<Self, Error> {
        Self::with_tool(
            "dumpbin",
            vec![
                "/nologo".to_owned(),
                "/headers".to_owned(),
                "/imports".to_owned(),
            ],
        )
    }

    /// Creates an inspector running `program` with the given arguments; the
    /// file under inspection is appended as the final argument.
    pub fn with_tool(program: impl Into<String>, args: Vec<String>) -> Result<Self, Error> {
        let program = program.into();
        let scratch = TempDir::new().map_err(|err| Error::DumpTool {
            program: program.clone(),
            message: format!("failed to create scratch directory: {}", err),
        })?;
        Ok(Self {
            program,
            args,
            scratch,
        })
    }
}

impl Inspect for NativeInspector {
    fn name(&self) -> &'static str {
        "native"
    }

    fn inspect(&self, path: &Utf8Path) -> Result<ModuleData, Error> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path.as_str())
            .current_dir(self.scratch.path())
            .output()
            .map_err(|err| Error::DumpTool {
                program: self.program.clone(),
                message: err.to_string(),
            })?;

        let report = String::from_utf8_lossy(&output.stdout);
        match parse_dump_report(&report) {
            Some(report) => {
                let mut module = ModuleData::new(BinaryKind::Native);
                module.file_path = Some(path.to_owned());
                module.platform = report.platform;
                module.references = report
                    .imports
                    .into_iter()
                    .map(Reference::native_import)
                    .collect();
                Ok(module)
            }
            None => {
                let mut module = ModuleData::new(BinaryKind::Unknown);
                module.file_path = Some(path.to_owned());
                module.loader_error = "File is not a native executable".to_owned();
                Ok(module)
            }
        }
    }
}

/// The useful parts of a dump-tool report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct NativeReport {
    pub(crate) platform: Platform,
    /// Lower-cased import stems, in report order.
    pub(crate) imports: Vec<String>,
}

/// Parses a dump-tool report. Returns `None` when the report does not
/// describe a native executable at all.
pub(crate) fn parse_dump_report(report: &str) -> Option<NativeReport> {
    let lines: Vec<&str> = report.lines().collect();
    lines.iter().position(|line| line.trim() == FILE_HEADER_MARKER)?;

    let mut platform = Platform::Unknown;
    for line in &lines {
        if line.contains("machine (x64)") {
            platform = Platform::Amd64;
            break;
        }
        if line.contains("machine (x86)") {
            platform = Platform::X86;
            break;
        }
    }

    let mut imports = Vec::new();
    if let Some(marker) = lines.iter().position(|line| line.trim() == DEPENDENCIES_MARKER) {
        // The marker is followed by a blank line; entries run until the
        // next blank.
        for line in lines.iter().skip(marker + 2) {
            let entry = line.trim();
            if entry.is_empty() {
                break;
            }
            imports.push(import_stem(entry));
        }
    }

    Some(NativeReport { platform, imports })
}

fn import_stem(entry: &str) -> String {
    Path::new(entry)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(entry)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const X64_REPORT: &str = "\
Dump of file native_audio.dll

File Type: DLL

FILE HEADER VALUES
            8664 machine (x64)
               6 number of sections
        5E8A7C50 time date stamp

  Image has the following dependencies:

    KERNEL32.dll
    WINMM.dll
    ole32.dll
    USER32.dll
    msvcrt.dll
    MSACM32.dll

  Summary

        1000 .data
";

    #[test]
    fn parses_x64_report() {
        let report = parse_dump_report(X64_REPORT).unwrap();
        assert_eq!(report.platform, Platform::Amd64);
        assert_eq!(
            report.imports,
            vec!["kernel32", "winmm", "ole32", "user32", "msvcrt", "msacm32"],
        );
    }

    #[test]
    fn parses_x86_machine() {
        let report = "FILE HEADER VALUES\n             14C machine (x86)\n";
        let parsed = parse_dump_report(report).unwrap();
        assert_eq!(parsed.platform, Platform::X86);
        assert_eq!(parsed.imports, Vec::<String>::new());
    }

    #[test]
    fn missing_header_means_not_native() {
        assert_eq!(parse_dump_report("Dump of file whatever.dll\n"), None);
        assert_eq!(parse_dump_report(""), None);
    }

    #[test]
    fn dependencies_stop_at_first_blank() {
        let report = "\
FILE HEADER VALUES
            8664 machine (x64)

  Image has the following dependencies:

    A.dll
    B.dll

    NOT-AN-IMPORT.dll
";
        let parsed = parse_dump_report(report).unwrap();
        assert_eq!(parsed.imports, vec!["a", "b"]);
    }
}
