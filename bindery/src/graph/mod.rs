// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dependency graph produced by binding simulation.
//!
//! The main entry points are [`DependencyGraph::from_modules`] for a set of
//! inspected modules and [`Analyzer::analyze_directory`](crate::Analyzer)
//! for the full pipeline. Nodes are inspected modules plus synthesized
//! stubs; edges record which module each reference bound to.

mod build;

use crate::{Error, ModuleData, ReferenceKind};
use petgraph::graph::{Graph, IndexType, NodeIndex};
use petgraph::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Index for DependencyGraph. Used for newtype wrapping.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct ModuleIx(u32);

impl fmt::Display for ModuleIx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// From the docs for `IndexType`:
//
// > Marked `unsafe` because: the trait must faithfully preserve and convert
// > index values.
unsafe impl IndexType for ModuleIx {
    #[inline(always)]
    fn new(x: usize) -> Self {
        ModuleIx(x as u32)
    }
    #[inline(always)]
    fn index(&self) -> usize {
        self.0 as usize
    }
    #[inline(always)]
    fn max() -> Self {
        ModuleIx(u32::MAX)
    }
}

/// A graph of modules and the bindings between them.
#[derive(Debug)]
pub struct DependencyGraph {
    pub(crate) graph: Graph<ModuleNodeImpl, EdgeImpl, Directed, ModuleIx>,
}

#[derive(Debug)]
pub(crate) struct ModuleNodeImpl {
    pub(crate) module: Arc<ModuleData>,
    pub(crate) incoming: usize,
    pub(crate) outgoing: usize,
    pub(crate) weight: f64,
    pub(crate) errors: Vec<String>,
}

impl ModuleNodeImpl {
    pub(crate) fn new(module: Arc<ModuleData>) -> Self {
        Self {
            module,
            incoming: 0,
            outgoing: 0,
            weight: 0.0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct EdgeImpl {
    pub(crate) kind: ReferenceKind,
}

impl DependencyGraph {
    /// Returns the number of nodes, live and stub.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of binding edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns an iterator over all nodes, in insertion order: live modules
    /// first (in inspection order), then stubs (in creation order).
    pub fn nodes(&self) -> impl Iterator<Item = ModuleNode<'_>> + '_ {
        self.graph
            .node_indices()
            .map(move |index| ModuleNode { graph: self, index })
    }

    /// Verifies internal invariants on this graph. Not part of the
    /// documented API.
    #[doc(hidden)]
    pub fn verify(&self) -> Result<(), Error> {
        let mut total_in = 0;
        let mut total_out = 0;
        for index in self.graph.node_indices() {
            let inner = &self.graph[index];
            let incoming = self.graph.edges_directed(index, Incoming).count();
            let outgoing = self.graph.edges_directed(index, Outgoing).count();
            if inner.incoming != incoming || inner.outgoing != outgoing {
                return Err(Error::GraphInternalError(format!(
                    "node '{}' has stored degrees {}/{} but actual {}/{}",
                    inner.module.binary_name(),
                    inner.incoming,
                    inner.outgoing,
                    incoming,
                    outgoing,
                )));
            }
            total_in += incoming;
            total_out += outgoing;
        }
        if total_in != total_out || total_out != self.graph.edge_count() {
            return Err(Error::GraphInternalError(format!(
                "degree sums {}/{} do not match edge count {}",
                total_in,
                total_out,
                self.graph.edge_count(),
            )));
        }

        // At most one stub per (name, version, kind) triple.
        let mut stub_keys = HashMap::new();
        for index in self.graph.node_indices() {
            let module = &self.graph[index].module;
            if !module.is_stub() {
                continue;
            }
            let key = (
                module.binary_name().to_lowercase(),
                module.version(),
                module.binary_kind(),
            );
            if let Some(previous) = stub_keys.insert(key, index) {
                return Err(Error::GraphInternalError(format!(
                    "duplicate stub '{}' at nodes {} and {}",
                    module.binary_name(),
                    previous.index(),
                    index.index(),
                )));
            }
        }
        Ok(())
    }
}

/// A node in a [`DependencyGraph`]: an inspected module or a synthesized
/// stub, plus its binding results.
#[derive(Clone, Copy)]
pub struct ModuleNode<'g> {
    graph: &'g DependencyGraph,
    index: NodeIndex<ModuleIx>,
}

impl<'g> ModuleNode<'g> {
    fn inner(&self) -> &'g ModuleNodeImpl {
        &self.graph.graph[self.index]
    }

    /// Returns the module record for this node.
    pub fn module(&self) -> &'g ModuleData {
        &self.inner().module
    }

    /// Returns true if this node was synthesized for an unresolved
    /// reference.
    pub fn is_stub(&self) -> bool {
        self.inner().module.is_stub()
    }

    /// Returns the number of edges pointing at this node.
    pub fn incoming_count(&self) -> usize {
        self.inner().incoming
    }

    /// Returns the number of edges leaving this node.
    pub fn outgoing_count(&self) -> usize {
        self.inner().outgoing
    }

    /// Returns the node's display weight, `ln(incoming + outgoing + 1)`.
    pub fn weight(&self) -> f64 {
        self.inner().weight
    }

    /// Returns the binding errors recorded against this node.
    pub fn errors(&self) -> &'g [String] {
        &self.inner().errors
    }

    /// Returns the nodes this node's references bound to.
    pub fn dependencies(&self) -> impl Iterator<Item = ModuleNode<'g>> + 'g {
        let graph = self.graph;
        graph
            .graph
            .neighbors_directed(self.index, Outgoing)
            .map(move |index| ModuleNode { graph, index })
    }

    /// Returns the reference kinds of the edges leaving this node, paired
    /// with their targets.
    pub fn dependency_edges(&self) -> impl Iterator<Item = (ReferenceKind, ModuleNode<'g>)> + 'g {
        let graph = self.graph;
        graph.graph.edges_directed(self.index, Outgoing).map(move |edge| {
            (
                edge.weight().kind,
                ModuleNode {
                    graph,
                    index: edge.target(),
                },
            )
        })
    }
}

impl fmt::Debug for ModuleNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("module", &self.module().binary_name())
            .field("incoming", &self.incoming_count())
            .field("outgoing", &self.outgoing_count())
            .finish()
    }
}
