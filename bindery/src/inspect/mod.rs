// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The inspector pipeline: turning a file on disk into a [`ModuleData`].
//!
//! An [`Inspect`] implementation knows how to read one family of binaries.
//! The analyzer holds an ordered list of inspectors and tries each in turn;
//! the first clean result wins, and failures degrade into the record's
//! loader-error field rather than propagating.

mod bridge;
mod managed;
mod native;
pub(crate) mod pe;

pub use bridge::BridgeInspector;
pub use managed::ManagedInspector;
pub use native::NativeInspector;

use crate::{BinaryKind, Error, ModuleData};
use camino::Utf8Path;
use log::warn;
use md5::{Digest, Md5};

/// Extracts identity and references from one family of binary files.
pub trait Inspect: Send + Sync {
    /// A short human-readable name for log messages.
    fn name(&self) -> &'static str;

    /// Inspects the file at `path`.
    ///
    /// A result with a non-empty loader error means "I recognized this far
    /// enough to describe it, but could not fully read it"; an `Err` means
    /// this inspector has nothing to say about the file at all.
    fn inspect(&self, path: &Utf8Path) -> Result<ModuleData, Error>;
}

/// Runs the ordered inspector list against one file and normalizes the
/// result.
///
/// The only error that escapes is [`Error::FileNotFound`]; individual
/// inspector failures are logged and folded into the loader-error field of
/// the best-effort result.
pub(crate) fn run_pipeline(
    inspectors: &[Box<dyn Inspect>],
    path: &Utf8Path,
) -> Result<ModuleData, Error> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_owned()));
    }

    let mut best: Option<ModuleData> = None;
    let mut last_failure = String::new();
    for inspector in inspectors {
        match inspector.inspect(path) {
            Ok(module) => {
                if module.loader_error.is_empty() {
                    best = Some(module);
                    break;
                }
                if best.is_none() {
                    best = Some(module);
                }
            }
            Err(err) => {
                warn!("inspector '{}' failed on {}: {}", inspector.name(), path, err);
                last_failure = err.to_string();
            }
        }
    }

    let mut module = best.unwrap_or_else(|| {
        let mut module = ModuleData::new(BinaryKind::Unknown);
        module.loader_error = if last_failure.is_empty() {
            "no inspector produced a result".to_owned()
        } else {
            last_failure
        };
        module
    });
    normalize(&mut module, path);
    Ok(module)
}

/// Fills in the fields every record must carry regardless of which
/// inspector produced it.
fn normalize(module: &mut ModuleData, path: &Utf8Path) {
    if module.file_path.is_none() {
        module.file_path = Some(path.to_owned());
    }
    if module.binary_name.is_empty() {
        module.binary_name = path.file_stem().unwrap_or(path.as_str()).to_owned();
    }
    if module.content_hash.is_empty() {
        match std::fs::read(path) {
            Ok(bytes) => module.content_hash = md5_hex(&bytes),
            Err(err) => warn!("failed to hash {}: {}", path, err),
        }
    }
}

/// Returns the lower-case hex MD5 of a byte slice.
pub(crate) fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    struct FixedInspector {
        name: &'static str,
        /// `None` means "fail with an error".
        result: Option<ModuleData>,
    }

    impl FixedInspector {
        fn ok(name: &'static str, loader_error: &str) -> Box<dyn Inspect> {
            let mut module = ModuleData::new(BinaryKind::Managed);
            module.binary_name = name.to_owned();
            module.loader_error = loader_error.to_owned();
            Box::new(Self {
                name,
                result: Some(module),
            })
        }

        fn err(name: &'static str) -> Box<dyn Inspect> {
            Box::new(Self { name, result: None })
        }
    }

    impl Inspect for FixedInspector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn inspect(&self, _path: &Utf8Path) -> Result<ModuleData, Error> {
            match &self.result {
                Some(module) => Ok(module.clone()),
                None => Err(Error::Serialization("boom".to_owned())),
            }
        }
    }

    fn scratch_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = run_pipeline(&[], Utf8Path::new("/does/not/exist.dll"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn first_clean_result_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch_file(&dir, "a.dll", b"payload");
        let inspectors = vec![
            FixedInspector::err("broken"),
            FixedInspector::ok("partial", "could not read references"),
            FixedInspector::ok("clean", ""),
            FixedInspector::ok("never-reached", ""),
        ];
        let module = run_pipeline(&inspectors, &path).unwrap();
        assert_eq!(module.binary_name(), "clean");
        assert_eq!(module.loader_error(), "");
    }

    #[test]
    fn partial_result_is_kept_when_nothing_better_shows_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch_file(&dir, "a.dll", b"payload");
        let inspectors = vec![
            FixedInspector::ok("partial", "could not read references"),
            FixedInspector::err("broken"),
        ];
        let module = run_pipeline(&inspectors, &path).unwrap();
        assert_eq!(module.binary_name(), "partial");
        assert_eq!(module.loader_error(), "could not read references");
    }

    #[test]
    fn all_failures_degrade_to_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch_file(&dir, "mystery.dll", b"payload");
        let module = run_pipeline(&[FixedInspector::err("broken")], &path).unwrap();
        assert_eq!(module.binary_kind(), BinaryKind::Unknown);
        assert!(!module.loader_error().is_empty());
        // Normalization fills in name, path and hash regardless.
        assert_eq!(module.binary_name(), "mystery");
        assert_eq!(module.file_path(), Some(path.as_path()));
        assert_eq!(module.content_hash().len(), 32);
    }

    #[test]
    fn md5_matches_known_vector() {
        // RFC 1321 test vector.
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
