// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The analyzer: inspector pipeline, inspection cache, and parallel
//! directory analysis.

use crate::concurrent::{ConcurrentMap, WorkItem};
use crate::graph::DependencyGraph;
use crate::inspect::{run_pipeline, Inspect, ManagedInspector, NativeInspector};
use crate::package_index::has_module_extension;
use crate::{BinaryKind, Error, ModuleData, PackageIndex};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use log::warn;
use std::sync::Arc;
use walkdir::WalkDir;

/// Inspects modules and builds dependency graphs.
///
/// The analyzer owns the ordered inspector list and an inspection cache
/// keyed by absolute file path; a file is inspected at most once per
/// analyzer lifetime, no matter how many graphs it appears in.
#[derive(Debug)]
pub struct Analyzer {
    inspectors: DebugIgnore<Vec<Box<dyn Inspect>>>,
    cache: ConcurrentMap<Utf8PathBuf, Arc<ModuleData>>,
}

impl Analyzer {
    /// Creates an analyzer with the default pipeline: the managed inspector
    /// followed by the native inspector.
    pub fn new() -> Result<Self, Error> {
        Ok(Self::with_inspectors(vec![
            Box::new(ManagedInspector::new()),
            Box::new(NativeInspector::new()?),
        ]))
    }

    /// Creates an analyzer with an explicit inspector list, tried in order.
    pub fn with_inspectors(inspectors: Vec<Box<dyn Inspect>>) -> Self {
        Self {
            inspectors: DebugIgnore(inspectors),
            cache: ConcurrentMap::new(),
        }
    }

    /// Inspects one file, consulting and filling the cache.
    ///
    /// When `packages` is given, the packages that could have supplied the
    /// file (by name, narrowed by content hash when one was computed) are
    /// recorded on the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if `path` does not exist; every
    /// other inspection failure is captured in the record's loader error.
    pub fn inspect_cached(
        &self,
        path: &Utf8Path,
        packages: Option<&PackageIndex>,
    ) -> Result<Arc<ModuleData>, Error> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_owned()));
        }
        let key = path
            .canonicalize_utf8()
            .map_err(|err| Error::Io(path.to_owned(), err))?;

        Ok(self.cache.get_or_insert_with(key.clone(), || {
            let mut module = match run_pipeline(&self.inspectors, &key) {
                Ok(module) => module,
                // The file vanished between the existence check and
                // inspection; degrade to an error record.
                Err(err) => {
                    let mut module = ModuleData::new(BinaryKind::Unknown);
                    module.file_path = Some(key.clone());
                    module.binary_name = key.file_stem().unwrap_or(key.as_str()).to_owned();
                    module.loader_error = err.to_string();
                    module
                }
            };
            if let Some(packages) = packages {
                let hash = match module.content_hash() {
                    "" => None,
                    hash => Some(hash.to_owned()),
                };
                for (id, _) in packages.resolve(&module.binary_name, hash.as_deref()) {
                    module.packages.insert(id);
                }
            }
            Arc::new(module)
        }))
    }

    /// Inspects a single file and returns its one-module graph: the root
    /// plus a placeholder child per reference.
    pub fn analyze_file(
        &self,
        path: &Utf8Path,
        packages: Option<&PackageIndex>,
    ) -> Result<DependencyGraph, Error> {
        let module = self.inspect_cached(path, packages)?;
        Ok(DependencyGraph::single(module, packages))
    }

    /// Analyzes every module file under `dir` and simulates binding across
    /// the set.
    ///
    /// Candidate files (`.dll`/`.exe`, case-insensitive) are inspected in
    /// parallel, one work item per file on the rayon pool.
    pub fn analyze_directory(
        &self,
        dir: &Utf8Path,
        packages: Option<&PackageIndex>,
    ) -> Result<DependencyGraph, Error> {
        if !dir.is_dir() {
            return Err(Error::FileNotFound(dir.to_owned()));
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(dir).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => path,
                Err(path) => {
                    warn!("skipping non-UTF-8 path {}", path.display());
                    continue;
                }
            };
            if has_module_extension(&path) {
                candidates.push(path);
            }
        }
        candidates.sort();

        let items: Vec<WorkItem<'_, Arc<ModuleData>>> = candidates
            .iter()
            .map(|path| WorkItem::new(move || self.inspect_or_degrade(path, packages)))
            .collect();
        rayon::scope(|scope| {
            for item in &items {
                scope.spawn(move |_| item.run());
            }
        });
        let modules: Vec<Arc<ModuleData>> = items.iter().map(|item| item.join()).collect();

        Ok(DependencyGraph::from_modules(modules, packages))
    }

    /// Like [`inspect_cached`](Self::inspect_cached), but folds the
    /// missing-file race into the record instead of failing the fan-out.
    fn inspect_or_degrade(
        &self,
        path: &Utf8Path,
        packages: Option<&PackageIndex>,
    ) -> Arc<ModuleData> {
        match self.inspect_cached(path, packages) {
            Ok(module) => module,
            Err(err) => {
                warn!("inspection of {} failed: {}", path, err);
                let mut module = ModuleData::new(BinaryKind::Unknown);
                module.file_path = Some(path.to_owned());
                module.binary_name = path.file_stem().unwrap_or(path.as_str()).to_owned();
                module.loader_error = err.to_string();
                Arc::new(module)
            }
        }
    }
}
