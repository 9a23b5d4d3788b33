// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::inspect::pe::tests::builder::TestImage;
use crate::inspect::ManagedInspector;
use crate::{Analyzer, BinaryKind, PackageIndex, PackageId};
use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn write_file(path: &Utf8Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// An analyzer with only the managed inspector, so tests never shell out to
/// a dump tool.
fn managed_only() -> Analyzer {
    Analyzer::with_inspectors(vec![Box::new(ManagedInspector::new())])
}

fn simple_image(name: &str, version: (u16, u16, u16, u16), refs: &[(&str, (u16, u16, u16, u16))]) -> Vec<u8> {
    TestImage {
        assembly_name: name,
        version,
        framework_id: Some(".NETFramework,Version=v4.5"),
        assembly_refs: refs,
        module_refs: &[],
        machine: 0x14C,
        pe32_plus: false,
        cli_flags: 0x1,
    }
    .build()
}

#[test]
fn empty_directory_yields_empty_graph() {
    let dir = tempfile::tempdir().unwrap();
    let graph = managed_only()
        .analyze_directory(&utf8(dir.path()), None)
        .unwrap();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.edge_count(), 0);
    graph.verify().unwrap();
}

#[test]
fn missing_directory_is_an_error() {
    let result = managed_only().analyze_directory(Utf8Path::new("/no/such/dir"), None);
    assert!(matches!(result, Err(crate::Error::FileNotFound(_))));
}

#[test]
fn directory_analysis_binds_across_modules() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8(dir.path());
    write_file(
        &root.join("Mod.dll"),
        &simple_image(
            "Mod",
            (20, 0, 3613, 0),
            &[("Foundation", (1, 8, 5, 0)), ("Missing", (1, 0, 0, 0))],
        ),
    );
    write_file(
        &root.join("Foundation.dll"),
        &simple_image("Foundation", (1, 8, 5, 0), &[]),
    );
    // Files without a module extension are not candidates.
    write_file(&root.join("readme.txt"), b"not inspected");

    let graph = managed_only().analyze_directory(&root, None).unwrap();
    assert_eq!(graph.node_count(), 3, "two live modules plus one stub");
    assert_eq!(graph.edge_count(), 2);

    let mod_node = graph
        .nodes()
        .find(|node| node.module().binary_name() == "Mod")
        .unwrap();
    assert_eq!(mod_node.outgoing_count(), 2);
    assert_eq!(mod_node.module().loader_error(), "");

    let stub = graph.nodes().find(|node| node.is_stub()).unwrap();
    assert_eq!(stub.module().binary_name(), "Missing");
    graph.verify().unwrap();
}

#[test]
fn unreadable_module_degrades_to_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8(dir.path());
    write_file(&root.join("garbage.dll"), b"not a pe image");

    let graph = managed_only().analyze_directory(&root, None).unwrap();
    assert_eq!(graph.node_count(), 1);

    let node = graph.nodes().next().unwrap();
    assert_eq!(node.module().binary_kind(), BinaryKind::Unknown);
    assert_eq!(node.module().binary_name(), "garbage");
    assert!(!node.module().loader_error().is_empty());
    // The hash is still computed for the best-effort record.
    assert_eq!(node.module().content_hash().len(), 32);
}

#[test]
fn inspection_cache_returns_the_same_record() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8(dir.path());
    let path = root.join("Mod.dll");
    write_file(&path, &simple_image("Mod", (1, 0, 0, 0), &[]));

    let analyzer = managed_only();
    let first = analyzer.inspect_cached(&path, None).unwrap();
    let second = analyzer.inspect_cached(&path, None).unwrap();
    assert!(Arc::ptr_eq(&first, &second), "second lookup must hit the cache");
}

#[test]
fn package_cache_annotates_inspected_modules() {
    let dir = tempfile::tempdir().unwrap();
    let pkg_root = utf8(dir.path()).join("pkg_root");
    let module_path = pkg_root.join("foundation.runtime/5.3.1/lib/frameworkA/Foundation.JSON.dll");
    write_file(&module_path, &simple_image("Foundation.JSON", (5, 3, 1, 0), &[]));

    let index = PackageIndex::initialize_with_cache(
        std::slice::from_ref(&pkg_root),
        utf8(dir.path()).join("hash-cache.bin"),
    );
    let module = managed_only()
        .inspect_cached(&module_path, Some(&index))
        .unwrap();

    let packages: Vec<_> = module.packages().iter().cloned().collect();
    assert_eq!(packages, vec![PackageId::new("foundation.runtime", "5.3.1")]);
}

#[test]
fn single_file_analysis_produces_root_and_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8(dir.path());
    let path = root.join("Mod.dll");
    write_file(
        &path,
        &simple_image("Mod", (1, 0, 0, 0), &[("Foundation", (1, 8, 5, 0))]),
    );

    let graph = managed_only().analyze_file(&path, None).unwrap();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    graph.verify().unwrap();
}
