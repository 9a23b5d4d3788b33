// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The compact positional binary layout used to persist module records.
//!
//! The format is deliberately simple and stable:
//!
//! * strings are UTF-8 prefixed with a 7-bit variable-length length;
//! * versions are serialized as their rendered string form, with the empty
//!   string standing for "absent";
//! * enumerations are 32-bit little-endian integers in declaration order;
//! * collections are preceded by a 32-bit little-endian count.
//!
//! Round-tripping a record through [`encode_module`] and [`decode_module`]
//! produces a value-equal record; the subprocess bridge and the persistent
//! hash cache both ride on these primitives.

use crate::{BinaryKind, Error, ModuleData, PackageId, Platform, Reference, ReferenceKind};
use camino::Utf8PathBuf;
use framework_spec::{FrameworkKind, FrameworkVersion, Version};

/// Encodes a module record into its wire form.
pub fn encode_module(module: &ModuleData) -> Vec<u8> {
    let mut buf = Vec::new();
    put_string(
        &mut buf,
        module.file_path.as_ref().map_or("", |path| path.as_str()),
    );
    put_string(&mut buf, &module.binary_name);
    put_string(&mut buf, &module.full_name);
    put_version(&mut buf, module.version);
    put_string(&mut buf, &module.framework_id);
    put_i32(&mut buf, framework_kind_to_wire(module.framework.kind()));
    put_version(&mut buf, Some(module.framework.version()));
    put_i32(&mut buf, platform_to_wire(module.platform));
    put_i32(&mut buf, binary_kind_to_wire(module.binary_kind));
    put_string(&mut buf, &module.content_hash);
    put_string(&mut buf, &module.loader_error);

    put_u32(&mut buf, module.references.len() as u32);
    for reference in &module.references {
        put_reference(&mut buf, reference);
    }
    put_u32(&mut buf, module.packages.len() as u32);
    for package in &module.packages {
        put_string(&mut buf, package.name());
        put_string(&mut buf, package.version());
    }
    buf
}

/// Decodes a module record from its wire form.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the bytes are truncated or malformed.
/// This is recoverable: callers surface it as a loader error.
pub fn decode_module(bytes: &[u8]) -> Result<ModuleData, Error> {
    let mut cursor = Cursor::new(bytes);
    let module = decode_module_inner(&mut cursor)?;
    if !cursor.at_end() {
        return Err(Error::Serialization(format!(
            "{} trailing bytes after module record",
            cursor.remaining()
        )));
    }
    Ok(module)
}

fn decode_module_inner(cursor: &mut Cursor<'_>) -> Result<ModuleData, Error> {
    let file_path = cursor.read_string()?;
    let binary_name = cursor.read_string()?;
    let full_name = cursor.read_string()?;
    let version = read_version(cursor)?;
    let framework_id = cursor.read_string()?;
    let framework_kind = framework_kind_from_wire(cursor.read_i32()?)?;
    let framework_version = read_version(cursor)?.unwrap_or_default();
    let platform = platform_from_wire(cursor.read_i32()?)?;
    let binary_kind = binary_kind_from_wire(cursor.read_i32()?)?;
    let content_hash = cursor.read_string()?;
    let loader_error = cursor.read_string()?;

    let reference_count = cursor.read_u32()?;
    let mut references = Vec::with_capacity(clamp_capacity(reference_count, cursor.remaining()));
    for _ in 0..reference_count {
        references.push(read_reference(cursor)?);
    }

    let package_count = cursor.read_u32()?;
    let mut packages = std::collections::BTreeSet::new();
    for _ in 0..package_count {
        let name = cursor.read_string()?;
        let version = cursor.read_string()?;
        packages.insert(PackageId::new(name, version));
    }

    Ok(ModuleData {
        file_path: if file_path.is_empty() {
            None
        } else {
            Some(Utf8PathBuf::from(file_path))
        },
        binary_name,
        full_name,
        version,
        framework_id,
        framework: FrameworkVersion::new(framework_kind, framework_version),
        platform,
        binary_kind,
        content_hash,
        loader_error,
        references,
        packages,
    })
}

fn put_reference(buf: &mut Vec<u8>, reference: &Reference) {
    put_string(buf, &reference.binary_name);
    put_version(buf, reference.declared_version);
    put_version(buf, reference.effective_version);
    put_i32(buf, reference_kind_to_wire(reference.kind));
    put_string(buf, &reference.full_name);
    put_string(buf, &reference.codebase_hint);
}

fn read_reference(cursor: &mut Cursor<'_>) -> Result<Reference, Error> {
    let binary_name = cursor.read_string()?;
    let declared_version = read_version(cursor)?;
    let effective_version = read_version(cursor)?;
    let kind = reference_kind_from_wire(cursor.read_i32()?)?;
    let full_name = cursor.read_string()?;
    let codebase_hint = cursor.read_string()?;
    Ok(Reference {
        binary_name,
        declared_version,
        effective_version,
        full_name,
        codebase_hint,
        kind,
    })
}

fn put_version(buf: &mut Vec<u8>, version: Option<Version>) {
    match version {
        Some(version) => put_string(buf, &version.to_string()),
        None => put_string(buf, ""),
    }
}

fn read_version(cursor: &mut Cursor<'_>) -> Result<Option<Version>, Error> {
    let s = cursor.read_string()?;
    if s.is_empty() {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|err| Error::Serialization(format!("bad version: {}", err)))
}

// Counts come off the wire unvalidated; cap pre-allocation by what could
// possibly fit in the remaining bytes.
fn clamp_capacity(count: u32, remaining: usize) -> usize {
    (count as usize).min(remaining)
}

// ---
// Enum wire values. Explicit matches rather than `as` casts so that
// reordering a declaration is a compile error here instead of a silent
// format change.
// ---

fn binary_kind_to_wire(kind: BinaryKind) -> i32 {
    match kind {
        BinaryKind::Managed => 0,
        BinaryKind::Native => 1,
        BinaryKind::Unknown => 2,
    }
}

fn binary_kind_from_wire(value: i32) -> Result<BinaryKind, Error> {
    match value {
        0 => Ok(BinaryKind::Managed),
        1 => Ok(BinaryKind::Native),
        2 => Ok(BinaryKind::Unknown),
        other => Err(Error::Serialization(format!("bad binary kind {}", other))),
    }
}

fn platform_to_wire(platform: Platform) -> i32 {
    match platform {
        Platform::Unknown => 0,
        Platform::AnyCpu => 1,
        Platform::AnyCpuPrefer32 => 2,
        Platform::Amd64 => 3,
        Platform::X86 => 4,
    }
}

fn platform_from_wire(value: i32) -> Result<Platform, Error> {
    match value {
        0 => Ok(Platform::Unknown),
        1 => Ok(Platform::AnyCpu),
        2 => Ok(Platform::AnyCpuPrefer32),
        3 => Ok(Platform::Amd64),
        4 => Ok(Platform::X86),
        other => Err(Error::Serialization(format!("bad platform {}", other))),
    }
}

fn reference_kind_to_wire(kind: ReferenceKind) -> i32 {
    match kind {
        ReferenceKind::ManagedRef => 0,
        ReferenceKind::PlatformInvoke => 1,
        ReferenceKind::NativeImport => 2,
        ReferenceKind::Unknown => 3,
    }
}

fn reference_kind_from_wire(value: i32) -> Result<ReferenceKind, Error> {
    match value {
        0 => Ok(ReferenceKind::ManagedRef),
        1 => Ok(ReferenceKind::PlatformInvoke),
        2 => Ok(ReferenceKind::NativeImport),
        3 => Ok(ReferenceKind::Unknown),
        other => Err(Error::Serialization(format!(
            "bad reference kind {}",
            other
        ))),
    }
}

fn framework_kind_to_wire(kind: FrameworkKind) -> i32 {
    match kind {
        FrameworkKind::Framework => 0,
        FrameworkKind::Standard => 1,
        FrameworkKind::CoreApp => 2,
        FrameworkKind::Unknown => 3,
    }
}

fn framework_kind_from_wire(value: i32) -> Result<FrameworkKind, Error> {
    match value {
        0 => Ok(FrameworkKind::Framework),
        1 => Ok(FrameworkKind::Standard),
        2 => Ok(FrameworkKind::CoreApp),
        3 => Ok(FrameworkKind::Unknown),
        other => Err(Error::Serialization(format!(
            "bad framework kind {}",
            other
        ))),
    }
}

// ---
// Primitives, shared with the persistent hash cache.
// ---

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Writes a 7-bit variable-length unsigned integer.
pub(crate) fn put_varint(buf: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Writes a varint-length-prefixed UTF-8 string.
pub(crate) fn put_string(buf: &mut Vec<u8>, value: &str) {
    put_varint(buf, value.len() as u32);
    buf.extend_from_slice(value.as_bytes());
}

/// A checked reader over a wire-encoded byte slice.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::Serialization(format!(
                "unexpected end of input: wanted {} bytes, {} left",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Error> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, Error> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a 7-bit variable-length unsigned integer.
    pub(crate) fn read_varint(&mut self) -> Result<u32, Error> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.take(1)?[0];
            if shift == 28 && byte > 0x0F {
                return Err(Error::Serialization("varint overflows u32".to_owned()));
            }
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::Serialization("varint too long".to_owned()))
    }

    /// Reads a varint-length-prefixed UTF-8 string.
    pub(crate) fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Serialization("string is not valid UTF-8".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample_module() -> ModuleData {
        let mut module = ModuleData::new(BinaryKind::Managed);
        module.file_path = Some(Utf8PathBuf::from("/opt/app/Mod.dll"));
        module.binary_name = "Mod".to_owned();
        module.full_name = "Mod, Version=20.0.3613.0, Culture=neutral".to_owned();
        module.version = Some("20.0.3613.0".parse().unwrap());
        module.framework_id = ".NETFramework,Version=v4.5".to_owned();
        module.framework = FrameworkVersion::parse(".NETFramework,Version=v4.5");
        module.platform = Platform::AnyCpu;
        module.content_hash = "9e107d9d372bb6826bd81d3542a419d6".to_owned();
        module.references = vec![
            Reference::managed(
                "Foundation",
                Some("1.8.5".parse().unwrap()),
                "Foundation, Version=1.8.5.0, Culture=neutral",
            ),
            Reference::platform_invoke("native_audio"),
        ];
        module.packages.insert(PackageId::new("mod.runtime", "20.0.3613"));
        module
    }

    #[test]
    fn round_trip_sample() {
        let module = sample_module();
        let decoded = decode_module(&encode_module(&module)).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn round_trip_empty() {
        let module = ModuleData::new(BinaryKind::Unknown);
        let decoded = decode_module(&encode_module(&module)).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn truncated_input_errors() {
        let bytes = encode_module(&sample_module());
        for len in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            decode_module(&bytes[..len]).expect_err("truncated record should not decode");
        }
    }

    #[test]
    fn trailing_bytes_error() {
        let mut bytes = encode_module(&sample_module());
        bytes.push(0);
        decode_module(&bytes).expect_err("trailing bytes should not decode");
    }

    #[test]
    fn varint_round_trips() {
        for value in [0u32, 1, 0x7F, 0x80, 0x3FFF, 0x4000, u32::MAX] {
            let mut buf = Vec::new();
            put_varint(&mut buf, value);
            assert_eq!(Cursor::new(&buf).read_varint().unwrap(), value);
        }
    }

    fn arb_version() -> impl Strategy<Value = Option<framework_spec::Version>> {
        proptest::option::of((0u32..100, 0u32..100, 0u32..5000, 0u32..100).prop_map(
            |(major, minor, build, revision)| {
                framework_spec::Version::new(major, minor, build, revision)
            },
        ))
    }

    fn arb_reference() -> impl Strategy<Value = Reference> {
        (
            "[A-Za-z][A-Za-z0-9._]{0,20}",
            arb_version(),
            arb_version(),
            prop_oneof![
                Just(ReferenceKind::ManagedRef),
                Just(ReferenceKind::PlatformInvoke),
                Just(ReferenceKind::NativeImport),
                Just(ReferenceKind::Unknown),
            ],
            "[ -~]{0,30}",
        )
            .prop_map(|(name, declared, effective, kind, codebase)| Reference {
                binary_name: name,
                declared_version: declared,
                effective_version: effective,
                full_name: String::new(),
                codebase_hint: codebase,
                kind,
            })
    }

    proptest! {
        #[test]
        fn round_trip_any_references(references in proptest::collection::vec(arb_reference(), 0..8)) {
            let mut module = ModuleData::new(BinaryKind::Managed);
            module.references = references;
            let decoded = decode_module(&encode_module(&module)).unwrap();
            prop_assert_eq!(decoded, module);
        }
    }
}
