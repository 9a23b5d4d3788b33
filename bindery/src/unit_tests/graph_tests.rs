// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::graph::DependencyGraph;
use crate::{BinaryKind, ModuleData, PackageIndex, Reference, ReferenceKind};
use camino::Utf8PathBuf;
use framework_spec::{FrameworkKind, FrameworkVersion, Version};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn version(s: &str) -> Version {
    s.parse().unwrap()
}

fn managed_module(name: &str, module_version: &str) -> ModuleData {
    let mut module = ModuleData::new(BinaryKind::Managed);
    module.file_path = Some(Utf8PathBuf::from(format!("/app/{}.dll", name)));
    module.binary_name = name.to_owned();
    module.version = Some(version(module_version));
    module.content_hash = "d41d8cd98f00b204e9800998ecf8427e".to_owned();
    module
}

fn managed_ref(name: &str, ref_version: &str) -> Reference {
    Reference::managed(name, Some(version(ref_version)), "")
}

fn build(modules: Vec<ModuleData>) -> DependencyGraph {
    DependencyGraph::from_modules(modules.into_iter().map(Arc::new), None)
}

fn node<'g>(graph: &'g DependencyGraph, name: &str) -> crate::graph::ModuleNode<'g> {
    graph
        .nodes()
        .find(|node| node.module().binary_name() == name)
        .unwrap_or_else(|| panic!("no node named '{}'", name))
}

#[test]
fn module_without_references_is_a_lone_node() {
    let graph = build(vec![managed_module("Solo", "1.0.0.0")]);
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
    graph.verify().unwrap();
}

#[test]
fn circular_references_form_a_cycle() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("B", "1.0.0.0"));
    let mut b = managed_module("B", "1.0.0.0");
    b.references.push(managed_ref("A", "1.0.0.0"));

    let graph = build(vec![a, b]);
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 2);

    let a = node(&graph, "A");
    assert_eq!(a.incoming_count(), 1);
    assert_eq!(a.outgoing_count(), 1);
    graph.verify().unwrap();
}

#[test]
fn unresolved_reference_creates_a_stub() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("Missing", "2.5.0.0"));

    let graph = build(vec![a]);
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);

    let stub = node(&graph, "Missing");
    assert!(stub.is_stub());
    assert_eq!(stub.module().version(), Some(version("2.5.0.0")));
    assert_eq!(stub.module().binary_kind(), BinaryKind::Managed);
    assert_eq!(stub.incoming_count(), 1);
    graph.verify().unwrap();
}

#[test]
fn stub_is_shared_between_sources() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("Missing", "1.0.0.0"));
    let mut b = managed_module("B", "1.0.0.0");
    b.references.push(managed_ref("missing", "1.0.0.0"));

    let graph = build(vec![a, b]);
    // Two live nodes plus exactly one stub, despite the case difference.
    assert_eq!(graph.node_count(), 3);
    assert_eq!(node(&graph, "Missing").incoming_count(), 2);
    graph.verify().unwrap();
}

#[test]
fn name_binding_is_case_insensitive() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("foundation", "1.8.5.0"));
    let foundation = managed_module("Foundation", "1.8.5.0");

    let graph = build(vec![a, foundation]);
    assert_eq!(graph.node_count(), 2, "no stub should have been created");
    assert_eq!(node(&graph, "Foundation").incoming_count(), 1);
}

#[test]
fn binary_kind_mismatch_prevents_binding() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(Reference::platform_invoke("audio"));
    // A managed module with the right name is not a native library.
    let decoy = managed_module("audio", "1.0.0.0");

    let graph = build(vec![a, decoy]);
    assert_eq!(graph.node_count(), 3);
    let stub = graph
        .nodes()
        .find(|node| node.is_stub())
        .expect("a native stub should exist");
    assert_eq!(stub.module().binary_kind(), BinaryKind::Native);
    assert_eq!(stub.module().binary_name(), "audio");
    assert_eq!(node(&graph, "audio").incoming_count(), 0);
}

#[test]
fn major_version_mismatch_binds_with_downgrade_error() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("Lib", "2.0.0.0"));
    let lib = managed_module("Lib", "1.5.0.0");

    let graph = build(vec![a, lib]);
    // The mismatch is warn-only: the live module still wins over a stub.
    assert_eq!(graph.node_count(), 2);
    assert_eq!(
        node(&graph, "A").errors(),
        &["down-grade: requested v2.0.0.0 but resolved v1.5.0.0".to_owned()],
    );
}

#[test]
fn up_version_binding_is_not_a_downgrade() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("Lib", "1.0.0.0"));
    let lib = managed_module("Lib", "1.2.0.0");

    let graph = build(vec![a, lib]);
    assert_eq!(node(&graph, "A").errors(), &[] as &[String]);
}

#[test]
fn codebase_hint_must_match_candidate_location() {
    let mut matching = managed_ref("Helpers", "1.1.15.0");
    matching.codebase_hint = "Helpers.dll".to_owned();
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(matching);

    let helpers = managed_module("Helpers", "1.1.15.0");
    let graph = build(vec![a, helpers]);
    assert_eq!(graph.node_count(), 2, "hint names the candidate's own location");

    // A hint pointing somewhere else fails the bind and forces a stub.
    let mut elsewhere = managed_ref("Helpers", "1.1.15.0");
    elsewhere.codebase_hint = "Override/Helpers.dll".to_owned();
    let mut b = managed_module("B", "1.0.0.0");
    b.references.push(elsewhere);

    let helpers = managed_module("Helpers", "1.1.15.0");
    let graph = build(vec![b, helpers]);
    assert_eq!(graph.node_count(), 3);
    assert_eq!(node(&graph, "Helpers").incoming_count(), 0);
}

#[test]
fn effective_version_wins_over_declared() {
    let mut reference = Reference::managed("Lib", Some(version("1.0.0.0")), "");
    reference.effective_version = Some(version("2.0.0.0"));
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(reference);

    let graph = build(vec![a]);
    let stub = node(&graph, "Lib");
    assert_eq!(stub.module().version(), Some(version("2.0.0.0")));
}

#[test]
fn cross_framework_violation_is_recorded() {
    let mut consumer = managed_module("Consumer", "1.0.0.0");
    consumer.framework = FrameworkVersion::new(FrameworkKind::CoreApp, version("2.2"));
    consumer.references.push(managed_ref("Std.Lib", "2.1.0.0"));

    let mut lib = managed_module("Std.Lib", "2.1.0.0");
    lib.framework = FrameworkVersion::new(FrameworkKind::Standard, version("2.1"));

    let graph = build(vec![consumer, lib]);
    assert_eq!(
        node(&graph, "Consumer").errors(),
        &["cross-framework: Std.Lib v2.1.0.0 is a higher-level framework".to_owned()],
    );
}

#[test]
fn legal_cross_framework_binding_records_nothing() {
    let mut consumer = managed_module("Consumer", "1.0.0.0");
    consumer.framework = FrameworkVersion::new(FrameworkKind::CoreApp, version("3.1"));
    consumer.references.push(managed_ref("Std.Lib", "2.1.0.0"));

    let mut lib = managed_module("Std.Lib", "2.1.0.0");
    lib.framework = FrameworkVersion::new(FrameworkKind::Standard, version("2.1"));

    let graph = build(vec![consumer, lib]);
    assert_eq!(node(&graph, "Consumer").errors(), &[] as &[String]);
}

#[test]
fn unsupported_standard_version_is_recorded_not_fatal() {
    let mut consumer = managed_module("Consumer", "1.0.0.0");
    consumer.framework = FrameworkVersion::new(FrameworkKind::Framework, version("4.8"));
    consumer.references.push(managed_ref("Std.Lib", "1.0.0.0"));

    let mut lib = managed_module("Std.Lib", "1.0.0.0");
    lib.framework = FrameworkVersion::new(FrameworkKind::Standard, version("2.2"));

    let graph = build(vec![consumer, lib]);
    assert_eq!(
        node(&graph, "Consumer").errors(),
        &["unsupported-standard-version: 2.2.0.0".to_owned()],
    );
}

#[test]
fn single_file_graph_has_placeholder_children() {
    let mut module = managed_module("Mod", "20.0.3613.0");
    for (name, ref_version) in [
        ("Foundation", "1.8.5.0"),
        ("Mod.Core", "20.0.3613.0"),
        ("Sys.A", "4.0.0.0"),
        ("Sys.B", "4.0.0.0"),
        ("Sys.C", "4.0.0.0"),
    ] {
        module.references.push(managed_ref(name, ref_version));
    }

    let graph = DependencyGraph::single(Arc::new(module), None);
    assert_eq!(graph.node_count(), 6);
    assert_eq!(graph.edge_count(), 5);

    let root = node(&graph, "Mod");
    assert_eq!(root.outgoing_count(), 5);
    assert_eq!(root.incoming_count(), 0);
    assert!((root.weight() - 6f64.ln()).abs() < 1e-9);
    for child in root.dependencies() {
        assert!(child.is_stub());
        assert_eq!(child.incoming_count(), 1);
    }
    graph.verify().unwrap();
}

#[test]
fn stub_packages_are_resolved_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("packages")).unwrap();
    let file = root.join("helpers.pkg/2.0.1/lib/Helpers.dll");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, b"helper bytes").unwrap();
    let index = PackageIndex::initialize_with_cache(
        std::slice::from_ref(&root),
        Utf8PathBuf::from_path_buf(dir.path().join("cache.bin")).unwrap(),
    );

    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("Helpers", "2.0.0.0"));
    let graph = DependencyGraph::from_modules(vec![Arc::new(a)], Some(&index));

    let stub = node(&graph, "Helpers");
    assert!(stub.is_stub());
    let packages: Vec<_> = stub.module().packages().iter().cloned().collect();
    assert_eq!(packages, vec![crate::PackageId::new("helpers.pkg", "2.0.1")]);
}

#[test]
fn dependency_edges_carry_reference_kinds() {
    let mut a = managed_module("A", "1.0.0.0");
    a.references.push(managed_ref("Lib", "1.0.0.0"));
    a.references.push(Reference::platform_invoke("native_lib"));

    let graph = build(vec![a]);
    let mut kinds: Vec<_> = node(&graph, "A")
        .dependency_edges()
        .map(|(kind, target)| (kind, target.module().binary_name().to_owned()))
        .collect();
    kinds.sort_by(|a, b| a.1.cmp(&b.1));
    assert_eq!(
        kinds,
        vec![
            (ReferenceKind::ManagedRef, "Lib".to_owned()),
            (ReferenceKind::PlatformInvoke, "native_lib".to_owned()),
        ],
    );
}
