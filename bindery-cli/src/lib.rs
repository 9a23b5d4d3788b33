// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A command-line frontend for `bindery`.
//!
//! `bindery <PATH>` analyzes a module file or a directory of modules and
//! prints the resulting dependency graph, either as text or as JSON.

use bindery::graph::{DependencyGraph, ModuleNode};
use bindery::{Analyzer, BridgeInspector, Inspect, ManagedInspector, ModuleData, NativeInspector, PackageIndex};
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::eyre::Result;
use serde::Serialize;
use std::fmt::Write;

/// Analyze binary modules and print their dependency graph.
#[derive(Debug, Parser)]
#[clap(name = "bindery", version)]
pub struct Args {
    /// File or directory to analyze
    pub input: Utf8PathBuf,

    /// Print the graph as JSON instead of text
    #[clap(long)]
    pub json: bool,

    /// Package root directories to resolve modules against (defaults to the
    /// per-user package cache)
    #[clap(long = "package-root", value_name = "DIR")]
    pub package_roots: Vec<Utf8PathBuf>,

    /// Skip package resolution entirely
    #[clap(long)]
    pub no_packages: bool,

    /// Program to run as the native dump utility (defaults to dumpbin)
    #[clap(long, value_name = "PROGRAM")]
    pub dump_tool: Option<String>,

    /// Inspect through a subprocess helper before the in-process inspectors
    #[clap(long, value_name = "PROGRAM")]
    pub bridge: Option<Utf8PathBuf>,
}

impl Args {
    /// Runs the analysis and returns the process exit code.
    pub fn exec(&self) -> Result<i32> {
        if !self.input.exists() {
            eprintln!("bindery: no such file or directory: {}", self.input);
            return Ok(-1);
        }

        let analyzer = self.build_analyzer()?;
        let packages = if self.no_packages {
            None
        } else {
            let roots = if self.package_roots.is_empty() {
                PackageIndex::default_roots()
            } else {
                self.package_roots.clone()
            };
            Some(PackageIndex::initialize(&roots))
        };

        let graph = if self.input.is_dir() {
            analyzer.analyze_directory(&self.input, packages.as_ref())?
        } else {
            analyzer.analyze_file(&self.input, packages.as_ref())?
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&graph_output(&graph))?);
        } else {
            print!("{}", render_text(&graph));
        }

        if let Some(packages) = &packages {
            packages.commit();
        }
        Ok(0)
    }

    fn build_analyzer(&self) -> Result<Analyzer> {
        let mut inspectors: Vec<Box<dyn Inspect>> = Vec::new();
        if let Some(bridge) = &self.bridge {
            inspectors.push(Box::new(BridgeInspector::new(bridge.clone())));
        }
        inspectors.push(Box::new(ManagedInspector::new()));
        let native = match &self.dump_tool {
            Some(program) => NativeInspector::with_tool(program.clone(), Vec::new())?,
            None => NativeInspector::new()?,
        };
        inspectors.push(Box::new(native));
        Ok(Analyzer::with_inspectors(inspectors))
    }
}

/// Renders the graph as text, sorted by binary name so output is stable
/// across runs.
pub fn render_text(graph: &DependencyGraph) -> String {
    let mut nodes: Vec<ModuleNode<'_>> = graph.nodes().collect();
    nodes.sort_by(node_ordering);

    let mut out = String::new();
    for node in nodes {
        let module = node.module();
        write!(out, "{}", module.binary_name()).unwrap();
        if let Some(version) = module.version() {
            write!(out, " v{}", version).unwrap();
        }
        write!(out, " [{}, {}]", module.binary_kind(), module.platform()).unwrap();
        if node.is_stub() {
            out.push_str(" (stub)");
        }
        out.push('\n');

        if !module.loader_error().is_empty() {
            writeln!(out, "  loader error: {}", module.loader_error()).unwrap();
        }
        for package in module.packages() {
            writeln!(out, "  package: {}", package).unwrap();
        }

        let mut dependencies: Vec<ModuleNode<'_>> = node.dependencies().collect();
        dependencies.sort_by(node_ordering);
        for dependency in dependencies {
            let target = dependency.module();
            write!(out, "  -> {}", target.binary_name()).unwrap();
            if let Some(version) = target.version() {
                write!(out, " v{}", version).unwrap();
            }
            out.push('\n');
        }
        for error in node.errors() {
            writeln!(out, "  error: {}", error).unwrap();
        }
    }
    out
}

fn node_ordering(a: &ModuleNode<'_>, b: &ModuleNode<'_>) -> std::cmp::Ordering {
    let a = a.module();
    let b = b.module();
    (a.binary_name().to_lowercase(), a.version())
        .cmp(&(b.binary_name().to_lowercase(), b.version()))
}

#[derive(Serialize)]
struct GraphOutput<'g> {
    modules: Vec<NodeOutput<'g>>,
}

#[derive(Serialize)]
struct NodeOutput<'g> {
    #[serde(flatten)]
    module: &'g ModuleData,
    stub: bool,
    incoming: usize,
    outgoing: usize,
    weight: f64,
    errors: &'g [String],
    dependencies: Vec<&'g str>,
}

fn graph_output(graph: &DependencyGraph) -> GraphOutput<'_> {
    let mut nodes: Vec<ModuleNode<'_>> = graph.nodes().collect();
    nodes.sort_by(node_ordering);
    GraphOutput {
        modules: nodes
            .into_iter()
            .map(|node| {
                let mut dependencies: Vec<&str> = node
                    .dependencies()
                    .map(|dependency| dependency.module().binary_name())
                    .collect();
                dependencies.sort_unstable();
                NodeOutput {
                    module: node.module(),
                    stub: node.is_stub(),
                    incoming: node.incoming_count(),
                    outgoing: node.outgoing_count(),
                    weight: node.weight(),
                    errors: node.errors(),
                    dependencies,
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery::BinaryKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn stub_graph() -> DependencyGraph {
        let modules = ["zeta", "Alpha", "mid"].map(|name| {
            Arc::new(ModuleData::stub(
                name,
                Some("1.0.0.0".parse().unwrap()),
                "",
                BinaryKind::Managed,
            ))
        });
        DependencyGraph::from_modules(modules, None)
    }

    #[test]
    fn text_output_is_sorted_by_name() {
        let rendered = render_text(&stub_graph());
        let names: Vec<&str> = rendered
            .lines()
            .map(|line| line.split(' ').next().unwrap())
            .collect();
        assert_eq!(names, vec!["Alpha", "mid", "zeta"]);
    }

    #[test]
    fn text_output_is_stable_across_renders() {
        let graph = stub_graph();
        assert_eq!(render_text(&graph), render_text(&graph));
    }

    #[test]
    fn json_output_contains_module_fields() {
        let json = serde_json::to_value(graph_output(&stub_graph())).unwrap();
        let modules = json["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 3);
        assert_eq!(modules[0]["binary_name"], "Alpha");
        assert_eq!(modules[0]["stub"], true);
        assert_eq!(modules[0]["outgoing"], 0);
    }
}
