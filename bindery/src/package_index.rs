// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A pre-built index over local package caches.
//!
//! Package roots have the layout `root/<package>/<version>/...`, with the
//! module files themselves at arbitrary depth under the version directory.
//! The index is built once, answers "which package could have supplied this
//! module" queries by name and optional content hash, and amortizes hash
//! I/O through a persistent cache file.

use crate::inspect::md5_hex;
use crate::{wire, PackageId};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Mutex;
use walkdir::WalkDir;

/// File extensions that count as module files, compared case-insensitively.
pub(crate) const MODULE_EXTENSIONS: [&str; 2] = ["dll", "exe"];

/// Returns true if `path` has a module extension.
pub(crate) fn has_module_extension(path: &Utf8Path) -> bool {
    match path.extension() {
        Some(extension) => MODULE_EXTENSIONS
            .iter()
            .any(|candidate| extension.eq_ignore_ascii_case(candidate)),
        None => false,
    }
}

/// An immutable index from package identities to the module files they
/// contain.
#[derive(Debug)]
pub struct PackageIndex {
    packages: IndexMap<PackageId, BTreeSet<Utf8PathBuf>>,
    hashes: Mutex<HashCache>,
}

impl PackageIndex {
    /// Returns the default package roots for the current user
    /// (`~/.nuget/packages`).
    pub fn default_roots() -> Vec<Utf8PathBuf> {
        let home = match home::home_dir().map(Utf8PathBuf::from_path_buf) {
            Some(Ok(home)) => home,
            _ => return Vec::new(),
        };
        vec![home.join(".nuget").join("packages")]
    }

    /// Builds an index over the given roots, reading the persistent hash
    /// cache from its well-known location.
    ///
    /// Unreadable roots and files are skipped; building never fails.
    pub fn initialize(roots: &[Utf8PathBuf]) -> Self {
        Self::initialize_with_cache(roots, default_cache_path())
    }

    /// Builds an index with an explicit hash-cache location.
    pub fn initialize_with_cache(roots: &[Utf8PathBuf], cache_path: Utf8PathBuf) -> Self {
        let mut packages: IndexMap<PackageId, BTreeSet<Utf8PathBuf>> = IndexMap::new();
        for root in roots {
            let entries = match root.read_dir_utf8() {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for package_dir in entries.flatten() {
                if !is_dir(&package_dir) {
                    continue;
                }
                let package_name = package_dir.file_name().to_owned();
                let version_dirs = match package_dir.path().read_dir_utf8() {
                    Ok(entries) => entries,
                    Err(_) => continue,
                };
                for version_dir in version_dirs.flatten() {
                    if !is_dir(&version_dir) || !is_version_dir_name(version_dir.file_name()) {
                        continue;
                    }
                    let id = PackageId::new(package_name.clone(), version_dir.file_name());
                    let files = packages.entry(id).or_insert_with(BTreeSet::new);
                    for entry in WalkDir::new(version_dir.path()).into_iter().flatten() {
                        if !entry.file_type().is_file() {
                            continue;
                        }
                        let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                            Ok(path) => path,
                            Err(_) => continue,
                        };
                        if has_module_extension(&path) {
                            files.insert(path);
                        }
                    }
                }
            }
        }

        Self {
            packages,
            hashes: Mutex::new(HashCache::load(cache_path)),
        }
    }

    /// Returns the number of indexed packages.
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    /// Finds the packages that contain a module named `name`, optionally
    /// narrowed to files whose MD5 matches `hash` (case-insensitive hex).
    ///
    /// A trailing module extension on `name` is ignored, so
    /// `resolve("Lib.dll", h)` and `resolve("Lib", h)` answer alike.
    pub fn resolve(&self, name: &str, hash: Option<&str>) -> Vec<(PackageId, Utf8PathBuf)> {
        let name = trim_module_extension(name);
        let mut matches = Vec::new();
        for (id, files) in &self.packages {
            for file in files {
                let stem = file.file_stem().unwrap_or_default();
                if !stem.eq_ignore_ascii_case(name) {
                    continue;
                }
                match hash {
                    None => matches.push((id.clone(), file.clone())),
                    Some(expected) => {
                        if let Some(actual) = self.file_hash(file) {
                            if actual.eq_ignore_ascii_case(expected) {
                                matches.push((id.clone(), file.clone()));
                            }
                        }
                    }
                }
            }
        }
        matches
    }

    /// Writes the hash cache back to disk if anything was added.
    pub fn commit(&self) {
        let mut cache = self.hashes.lock().expect("hash cache poisoned");
        if !cache.dirty {
            return;
        }
        match cache.store() {
            Ok(()) => cache.dirty = false,
            Err(err) => warn!("failed to write hash cache {}: {}", cache.path, err),
        }
    }

    /// Returns the MD5 of a file, consulting the persistent cache first.
    fn file_hash(&self, path: &Utf8Path) -> Option<String> {
        let mut cache = self.hashes.lock().expect("hash cache poisoned");
        if let Some(hash) = cache.entries.get(path) {
            return Some(hash.clone());
        }
        let bytes = fs::read(path).ok()?;
        let hash = md5_hex(&bytes);
        cache.entries.insert(path.to_owned(), hash.clone());
        cache.dirty = true;
        Some(hash)
    }
}

fn is_dir(entry: &camino::Utf8DirEntry) -> bool {
    entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false)
}

/// Version directories must start with a digit and contain a dot; anything
/// else (e.g. `v1.2`) is not treated as a package version.
fn is_version_dir_name(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_ascii_digit()) && name.contains('.')
}

fn trim_module_extension(name: &str) -> &str {
    for extension in MODULE_EXTENSIONS {
        let suffix_len = extension.len() + 1;
        if name.len() > suffix_len {
            let (stem, suffix) = name.split_at(name.len() - suffix_len);
            if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(extension) {
                return stem;
            }
        }
    }
    name
}

fn default_cache_path() -> Utf8PathBuf {
    let dir = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("."));
    dir.join("bindery-package-hashes.bin")
}

/// The persistent path → hex-hash cache: a 32-bit entry count followed by
/// length-prefixed string pairs.
#[derive(Debug)]
struct HashCache {
    path: Utf8PathBuf,
    entries: BTreeMap<Utf8PathBuf, String>,
    dirty: bool,
}

impl HashCache {
    /// Loads the cache, treating a missing, truncated, or corrupt file as
    /// empty.
    fn load(path: Utf8PathBuf) -> Self {
        let entries = fs::read(&path)
            .ok()
            .and_then(|bytes| Self::parse(&bytes))
            .unwrap_or_default();
        Self {
            path,
            entries,
            dirty: false,
        }
    }

    fn parse(bytes: &[u8]) -> Option<BTreeMap<Utf8PathBuf, String>> {
        let mut cursor = wire::Cursor::new(bytes);
        let count = cursor.read_u32().ok()?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let path = cursor.read_string().ok()?;
            let hash = cursor.read_string().ok()?;
            entries.insert(Utf8PathBuf::from(path), hash);
        }
        Some(entries)
    }

    fn store(&self) -> std::io::Result<()> {
        let mut buf = Vec::new();
        wire::put_u32(&mut buf, self.entries.len() as u32);
        for (path, hash) in &self.entries {
            wire::put_string(&mut buf, path.as_str());
            wire::put_string(&mut buf, hash);
        }
        fs::write(&self.path, buf)
    }
}
