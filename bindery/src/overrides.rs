// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binding-override rules parsed from sidecar configuration documents.
//!
//! A module file `App.dll` may ship with a sidecar `App.dll.config`, an
//! XML document whose `dependentAssembly` elements redirect reference
//! versions and attach codebase path hints. Parsing is deliberately
//! forgiving: a malformed rule is logged and skipped, a malformed document
//! yields no rules at all, and neither ever fails inspection.

use crate::Reference;
use camino::{Utf8Path, Utf8PathBuf};
use framework_spec::Version;
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;

/// Override application iterates to a fixpoint; redirect chains written in
/// reverse document order converge one step per pass, so cap the passes.
const MAX_PASSES: usize = 5;

/// A single binding-override rule: a version-range redirect and/or a
/// codebase hint for one binary name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OverrideRule {
    name: String,
    min_version: Version,
    max_version: Version,
    new_version: Option<Version>,
    codebase: String,
}

impl OverrideRule {
    /// Creates a version redirect covering the inclusive range
    /// `[min_version, max_version]`.
    pub fn redirect(
        name: impl Into<String>,
        min_version: Version,
        max_version: Version,
        new_version: Version,
    ) -> Self {
        Self {
            name: name.into(),
            min_version,
            max_version,
            new_version: Some(new_version),
            codebase: String::new(),
        }
    }

    /// Creates a codebase rule: a singleton-range redirect that maps
    /// `version` to itself and attaches `href` as the codebase hint.
    pub fn codebase(name: impl Into<String>, version: Version, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: version,
            max_version: version,
            new_version: Some(version),
            codebase: href.into(),
        }
    }

    /// Returns the binary name this rule targets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the inclusive version range this rule applies to.
    pub fn version_range(&self) -> (Version, Version) {
        (self.min_version, self.max_version)
    }

    /// Returns the redirect target version, if any.
    pub fn new_version(&self) -> Option<Version> {
        self.new_version
    }

    /// Returns the codebase hint, or `""` when there is none.
    pub fn codebase_hint(&self) -> &str {
        &self.codebase
    }
}

/// Loads the override rules for a binary at `binary_path` from its sidecar
/// `<path>.config` document, in document order.
///
/// Missing sidecar, unreadable sidecar, and malformed XML all produce an
/// empty list (with a logged warning where something was actually wrong).
pub fn load_override_rules(binary_path: &Utf8Path) -> Vec<OverrideRule> {
    let config_path = Utf8PathBuf::from(format!("{}.config", binary_path));
    if !config_path.is_file() {
        return Vec::new();
    }
    match fs::read_to_string(&config_path) {
        Ok(xml) => parse_config(&xml),
        Err(err) => {
            warn!("failed to read sidecar config {}: {}", config_path, err);
            Vec::new()
        }
    }
}

/// Parses a sidecar configuration document into override rules, in
/// document order. Never fails; see [`load_override_rules`].
pub fn parse_config(xml: &str) -> Vec<OverrideRule> {
    let mut reader = Reader::from_str(xml);
    let mut rules = Vec::new();

    // State for the dependentAssembly element currently being walked. The
    // identity element may appear after its sibling redirects, so rules are
    // held back until the end tag.
    let mut in_dependent = false;
    let mut identity_name: Option<String> = None;
    let mut pending: Vec<PendingRule> = Vec::new();

    loop {
        match reader.read_event() {
            Err(err) => {
                warn!("malformed sidecar config, ignoring all rules: {}", err);
                return Vec::new();
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                match element.local_name().as_ref() {
                    b"dependentAssembly" => {
                        in_dependent = true;
                        identity_name = None;
                        pending.clear();
                    }
                    b"assemblyIdentity" if in_dependent => {
                        identity_name = attr_value(&element, b"name");
                    }
                    b"bindingRedirect" if in_dependent => {
                        collect_redirect(&element, &mut pending);
                    }
                    b"codeBase" if in_dependent => {
                        collect_codebase(&element, &mut pending);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(element)) if element.local_name().as_ref() == b"dependentAssembly" => {
                if let Some(name) = identity_name.take() {
                    rules.extend(pending.drain(..).map(|rule| rule.into_rule(&name)));
                } else {
                    pending.clear();
                }
                in_dependent = false;
            }
            Ok(_) => {}
        }
    }

    rules
}

/// A rule parsed before its assembly identity is known.
struct PendingRule {
    min_version: Version,
    max_version: Version,
    new_version: Version,
    codebase: String,
}

impl PendingRule {
    fn into_rule(self, name: &str) -> OverrideRule {
        OverrideRule {
            name: name.to_owned(),
            min_version: self.min_version,
            max_version: self.max_version,
            new_version: Some(self.new_version),
            codebase: self.codebase,
        }
    }
}

fn collect_redirect(element: &BytesStart<'_>, pending: &mut Vec<PendingRule>) {
    let old_version = match attr_value(element, b"oldVersion") {
        Some(value) => value,
        None => return,
    };
    let new_version = match attr_value(element, b"newVersion") {
        Some(value) => value,
        None => return,
    };

    let (min_str, max_str) = match old_version.split_once('-') {
        Some((min, max)) => (min.trim(), max.trim()),
        None => (old_version.trim(), old_version.trim()),
    };

    let parsed = (|| -> Result<PendingRule, framework_spec::VersionParseError> {
        Ok(PendingRule {
            min_version: min_str.parse()?,
            max_version: max_str.parse()?,
            new_version: new_version.trim().parse()?,
            codebase: String::new(),
        })
    })();

    match parsed {
        Ok(rule) => pending.push(rule),
        Err(err) => warn!(
            "skipping binding redirect {} -> {}: {}",
            old_version, new_version, err
        ),
    }
}

fn collect_codebase(element: &BytesStart<'_>, pending: &mut Vec<PendingRule>) {
    let version = match attr_value(element, b"version") {
        Some(value) => value,
        None => return,
    };
    let href = match attr_value(element, b"href") {
        Some(value) => value,
        None => return,
    };

    match version.trim().parse::<Version>() {
        Ok(version) => pending.push(PendingRule {
            min_version: version,
            max_version: version,
            new_version: version,
            codebase: href,
        }),
        Err(err) => warn!("skipping codebase entry for version {}: {}", version, err),
    }
}

fn attr_value(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    for attr in element.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            return attr.unescape_value().ok().map(|value| value.into_owned());
        }
    }
    None
}

/// Applies override rules to a reference list, iterating to a fixpoint.
///
/// A rule applies to a reference when the names match case-insensitively
/// and the reference's effective version falls inside the rule's inclusive
/// range. Application is order-stable (rules run in document order) and
/// idempotent once the fixpoint is reached; the pass count is capped so a
/// cyclic rule set still terminates.
pub fn apply_overrides(references: &mut [Reference], rules: &[OverrideRule]) {
    if rules.is_empty() {
        return;
    }

    for _ in 0..MAX_PASSES {
        let mut changed = false;
        for reference in references.iter_mut() {
            let mut effective = match reference.effective_version {
                Some(version) => version,
                None => continue,
            };
            for rule in rules {
                if !rule.name.eq_ignore_ascii_case(&reference.binary_name) {
                    continue;
                }
                if effective < rule.min_version || effective > rule.max_version {
                    continue;
                }
                if let Some(new_version) = rule.new_version {
                    if new_version != effective {
                        effective = new_version;
                        reference.effective_version = Some(new_version);
                        changed = true;
                    }
                }
                if !rule.codebase.is_empty() && reference.codebase_hint != rule.codebase {
                    reference.codebase_hint = rule.codebase.clone();
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}
