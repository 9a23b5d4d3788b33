// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Error, FrameworkKind, FrameworkVersion, Version};

/// Decides whether a module targeting `source` may legally depend on a
/// module targeting `target`.
///
/// The rules approximate the published framework-compatibility matrix:
///
/// * an [`Unknown`](FrameworkKind::Unknown) kind on either side is legal
///   (nothing can be proven about it);
/// * within one kind, the source must be at least as new as the target;
/// * `.NETStandard` targets are governed by the standard-support table
///   below;
/// * a `.NETCoreApp` source binding a `.NETFramework` target is treated as
///   legal (a coarse approximation, kept as-is);
/// * `.NETFramework` and `.NETStandard` sources may not bind `.NETCoreApp`
///   targets.
///
/// | standard | framework source | core source |
/// |----------|------------------|-------------|
/// | 1.0, 1.1 | any              | any         |
/// | 1.2      | ≥ 4.5.1          | any         |
/// | 1.3      | ≥ 4.6            | any         |
/// | 1.4-1.6  | ≥ 4.6.1          | any         |
/// | 2.0      | ≥ 4.6.1          | ≥ 2.0       |
/// | 2.1      | illegal          | ≥ 3.0       |
///
/// # Errors
///
/// Returns [`Error::UnsupportedStandardVersion`] for a `.NETStandard`
/// target version with no row in the table.
pub fn legal(source: &FrameworkVersion, target: &FrameworkVersion) -> Result<bool, Error> {
    use FrameworkKind::*;

    if source.is_unknown() || target.is_unknown() {
        return Ok(true);
    }
    if source.kind() == target.kind() {
        return Ok(source.version() >= target.version());
    }

    match (source.kind(), target.kind()) {
        (_, Standard) => standard_target(source, target.version()),
        (CoreApp, Framework) => Ok(true),
        (Standard, Framework) => Ok(false),
        (Framework, CoreApp) | (Standard, CoreApp) => Ok(false),
        (Unknown, _) | (_, Unknown) | (Framework, Framework) | (CoreApp, CoreApp) => {
            unreachable!("handled above")
        }
    }
}

fn standard_target(source: &FrameworkVersion, standard: Version) -> Result<bool, Error> {
    use FrameworkKind::*;

    let source_kind = source.kind();
    let source_version = source.version();
    let framework_at_least = |minimum: Version| source_kind == Framework && source_version >= minimum;

    match (standard.major(), standard.minor()) {
        (1, 0) | (1, 1) => Ok(true),
        (1, 2) => Ok(framework_at_least(Version::new(4, 5, 1, 0)) || source_kind == CoreApp),
        (1, 3) => Ok(framework_at_least(Version::new(4, 6, 0, 0)) || source_kind == CoreApp),
        (1, 4) | (1, 5) | (1, 6) => {
            Ok(framework_at_least(Version::new(4, 6, 1, 0)) || source_kind == CoreApp)
        }
        (2, 0) => Ok(framework_at_least(Version::new(4, 6, 1, 0))
            || (source_kind == CoreApp && source_version >= Version::new(2, 0, 0, 0))),
        (2, 1) => Ok(source_kind == CoreApp && source_version >= Version::new(3, 0, 0, 0)),
        _ => Err(Error::UnsupportedStandardVersion(standard)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framework(version: &str) -> FrameworkVersion {
        FrameworkVersion::new(FrameworkKind::Framework, version.parse().unwrap())
    }

    fn standard(version: &str) -> FrameworkVersion {
        FrameworkVersion::new(FrameworkKind::Standard, version.parse().unwrap())
    }

    fn core(version: &str) -> FrameworkVersion {
        FrameworkVersion::new(FrameworkKind::CoreApp, version.parse().unwrap())
    }

    #[test]
    fn unknown_is_always_legal() {
        let unknown = FrameworkVersion::unknown();
        assert_eq!(legal(&unknown, &framework("4.5")), Ok(true));
        assert_eq!(legal(&core("3.1"), &unknown), Ok(true));
    }

    #[test]
    fn same_kind_compares_versions() {
        assert_eq!(legal(&framework("4.6"), &framework("4.5")), Ok(true));
        assert_eq!(legal(&framework("4.5"), &framework("4.6")), Ok(false));
        assert_eq!(legal(&core("3.1"), &core("3.1")), Ok(true));
    }

    #[test]
    fn standard_table() {
        // 1.0/1.1: anything goes.
        assert_eq!(legal(&framework("2.0"), &standard("1.0")), Ok(true));
        assert_eq!(legal(&framework("2.0"), &standard("1.1")), Ok(true));

        // 1.2 needs framework 4.5.1.
        assert_eq!(legal(&framework("4.5"), &standard("1.2")), Ok(false));
        assert_eq!(legal(&framework("4.5.1"), &standard("1.2")), Ok(true));

        // 1.3 needs framework 4.6.
        assert_eq!(legal(&framework("4.5.2"), &standard("1.3")), Ok(false));
        assert_eq!(legal(&framework("4.6"), &standard("1.3")), Ok(true));

        // 1.4-1.6 need framework 4.6.1; core is always fine below 2.0.
        for minor in ["1.4", "1.5", "1.6"] {
            assert_eq!(legal(&framework("4.6"), &standard(minor)), Ok(false));
            assert_eq!(legal(&framework("4.6.1"), &standard(minor)), Ok(true));
            assert_eq!(legal(&core("1.0"), &standard(minor)), Ok(true));
        }

        // 2.0 needs framework 4.6.1 or core 2.0.
        assert_eq!(legal(&framework("4.6.1"), &standard("2.0")), Ok(true));
        assert_eq!(legal(&core("1.1"), &standard("2.0")), Ok(false));
        assert_eq!(legal(&core("2.0"), &standard("2.0")), Ok(true));

        // 2.1 shuts framework sources out entirely.
        assert_eq!(legal(&framework("4.8"), &standard("2.1")), Ok(false));
        assert_eq!(legal(&core("2.2"), &standard("2.1")), Ok(false));
        assert_eq!(legal(&core("3.0"), &standard("2.1")), Ok(true));
    }

    #[test]
    fn unsupported_standard_version() {
        assert_eq!(
            legal(&framework("4.8"), &standard("2.2")),
            Err(Error::UnsupportedStandardVersion("2.2".parse().unwrap())),
        );
    }

    #[test]
    fn cross_kind_rules() {
        assert_eq!(legal(&core("3.1"), &framework("4.8")), Ok(true));
        assert_eq!(legal(&framework("4.8"), &core("3.1")), Ok(false));
        assert_eq!(legal(&standard("2.0"), &core("3.1")), Ok(false));
        assert_eq!(legal(&standard("2.0"), &framework("4.8")), Ok(false));
    }
}
