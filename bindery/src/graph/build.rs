// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::graph::{DependencyGraph, EdgeImpl, ModuleIx, ModuleNodeImpl};
use crate::{BinaryKind, ModuleData, PackageIndex, Reference};
use framework_spec::{legal, Version};
use log::warn;
use petgraph::graph::{Graph, NodeIndex};
use std::sync::Arc;

impl DependencyGraph {
    /// Builds a graph from inspected modules by simulating the binding of
    /// every reference.
    ///
    /// For each reference the live modules are tried in order; the first
    /// candidate that binds wins. References no live module satisfies are
    /// bound to stub nodes, at most one per (name, version, kind); stub
    /// package sets are resolved through `packages` when it is given.
    pub fn from_modules(
        modules: impl IntoIterator<Item = Arc<ModuleData>>,
        packages: Option<&PackageIndex>,
    ) -> Self {
        let mut state = GraphBuildState::new(modules, packages);
        state.bind_all();
        state.finish()
    }

    /// Builds the graph for a single module: one root node plus one
    /// placeholder child per declared reference.
    pub fn single(module: Arc<ModuleData>, packages: Option<&PackageIndex>) -> Self {
        Self::from_modules(std::iter::once(module), packages)
    }
}

/// Helper struct for building up the dependency graph.
struct GraphBuildState<'a> {
    graph: Graph<ModuleNodeImpl, EdgeImpl, petgraph::Directed, ModuleIx>,
    /// Number of live (inspected) nodes; stubs are appended after them.
    live_count: usize,
    stubs: Vec<NodeIndex<ModuleIx>>,
    packages: Option<&'a PackageIndex>,
}

impl<'a> GraphBuildState<'a> {
    fn new(
        modules: impl IntoIterator<Item = Arc<ModuleData>>,
        packages: Option<&'a PackageIndex>,
    ) -> Self {
        let mut graph = Graph::default();
        for module in modules {
            graph.add_node(ModuleNodeImpl::new(module));
        }
        let live_count = graph.node_count();
        Self {
            graph,
            live_count,
            stubs: Vec::new(),
            packages,
        }
    }

    fn bind_all(&mut self) {
        for source in 0..self.live_count {
            let source_ix = NodeIndex::<ModuleIx>::new(source);
            let module = Arc::clone(&self.graph[source_ix].module);
            let mut errors = Vec::new();

            for reference in module.references() {
                let target_ix = self.bind_reference(source_ix, reference);
                self.check_binding(&module, reference, target_ix, &mut errors);
                // An update rather than an add: a module's dependencies are
                // a set, and two references must not produce parallel edges.
                self.graph.update_edge(
                    source_ix,
                    target_ix,
                    EdgeImpl {
                        kind: reference.kind(),
                    },
                );
            }

            self.graph[source_ix].errors.extend(errors);
        }
    }

    /// Resolves one reference to a node, synthesizing a stub if no live
    /// module satisfies it.
    fn bind_reference(
        &mut self,
        source_ix: NodeIndex<ModuleIx>,
        reference: &Reference,
    ) -> NodeIndex<ModuleIx> {
        let name = reference.binary_name();
        let version = reference
            .effective_version()
            .or_else(|| reference.declared_version());
        let kind = reference.kind().target_binary_kind();

        for candidate in 0..self.live_count {
            let candidate_ix = NodeIndex::<ModuleIx>::new(candidate);
            if candidate_ix == source_ix {
                continue;
            }
            if attempt_bind(
                &self.graph[candidate_ix].module,
                name,
                kind,
                version,
                reference.codebase_hint(),
            ) {
                return candidate_ix;
            }
        }

        // No live candidate; fall back to the stub set, ignoring codebase
        // hints (stubs have no file to check against).
        for &stub_ix in &self.stubs {
            if attempt_bind(&self.graph[stub_ix].module, name, kind, version, "") {
                return stub_ix;
            }
        }

        let mut stub = ModuleData::stub(name, version, reference.full_name(), kind);
        if let Some(packages) = self.packages {
            for (id, _) in packages.resolve(name, None) {
                stub.packages.insert(id);
            }
        }
        let stub_ix = self.graph.add_node(ModuleNodeImpl::new(Arc::new(stub)));
        self.stubs.push(stub_ix);
        stub_ix
    }

    /// Appends down-grade and cross-framework errors for a completed
    /// binding. Never fails: a legality failure is itself recorded as an
    /// error on the source node.
    fn check_binding(
        &self,
        source: &ModuleData,
        reference: &Reference,
        target_ix: NodeIndex<ModuleIx>,
        errors: &mut Vec<String>,
    ) {
        let target = &self.graph[target_ix].module;
        let requested = reference
            .effective_version()
            .or_else(|| reference.declared_version());

        if !target.is_stub() {
            if let (Some(requested), Some(resolved)) = (requested, target.version()) {
                if resolved < requested {
                    errors.push(format!(
                        "down-grade: requested v{} but resolved v{}",
                        requested, resolved
                    ));
                }
            }
        }

        if !source.framework().is_unknown() && !target.framework().is_unknown() {
            match legal(&source.framework(), &target.framework()) {
                Ok(true) => {}
                Ok(false) => {
                    errors.push(format!(
                        "cross-framework: {} is a higher-level framework",
                        target
                    ));
                }
                Err(err) => errors.push(err.to_string()),
            }
        }
    }

    /// Freezes the graph: fills in degree counts and display weights.
    fn finish(mut self) -> DependencyGraph {
        let counts: Vec<(usize, usize)> = self
            .graph
            .node_indices()
            .map(|index| {
                (
                    self.graph
                        .edges_directed(index, petgraph::Incoming)
                        .count(),
                    self.graph
                        .edges_directed(index, petgraph::Outgoing)
                        .count(),
                )
            })
            .collect();
        for (index, (incoming, outgoing)) in self.graph.node_indices().zip(counts).collect::<Vec<_>>() {
            let node = &mut self.graph[index];
            node.incoming = incoming;
            node.outgoing = outgoing;
            node.weight = ((incoming + outgoing + 1) as f64).ln();
        }
        DependencyGraph { graph: self.graph }
    }
}

/// Decides whether `candidate` satisfies a reference to `name` of the given
/// kind and version, honoring a codebase hint when one is present.
fn attempt_bind(
    candidate: &ModuleData,
    name: &str,
    kind: BinaryKind,
    version: Option<Version>,
    codebase_hint: &str,
) -> bool {
    if !candidate.binary_name().eq_ignore_ascii_case(name) {
        return false;
    }
    if candidate.binary_kind() != kind {
        warn!(
            "candidate '{}' is a {} binary, reference wants {}",
            candidate.binary_name(),
            candidate.binary_kind(),
            kind
        );
        return false;
    }

    // A major-version gap is suspicious but not disqualifying: side-by-side
    // installs bind this way.
    if let (Some(candidate_version), Some(target_version)) = (candidate.version(), version) {
        if candidate_version.major() != target_version.major() {
            warn!(
                "binding '{}': candidate v{} differs in major version from requested v{}",
                candidate.binary_name(),
                candidate_version,
                target_version
            );
        }
    }

    if !codebase_hint.is_empty() {
        let file = match candidate.file_path() {
            Some(file) => file,
            None => return false,
        };
        let expected = match file.parent() {
            Some(dir) => dir.join(codebase_hint),
            None => return false,
        };
        if expected != *file {
            return false;
        }
    }

    true
}
