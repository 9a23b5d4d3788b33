// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A pure reader for managed PE images.
//!
//! This reads just enough of the PE headers and CLI metadata tables to
//! answer inspection questions: assembly identity, processor platform,
//! referenced assemblies, and platform-invoke import targets. It never
//! maps, loads, or executes the image, so no loader isolation is required
//! around it.
//!
//! Layout references are ECMA-335 (metadata) and the PE/COFF spec
//! (headers). Only the compressed `#~` table stream is supported; images
//! carrying the uncompressed `#-` form are rejected.

use crate::module::Platform;
use framework_spec::Version;
use std::collections::BTreeSet;
use std::fmt;

const MACHINE_I386: u16 = 0x14C;
const MACHINE_AMD64: u16 = 0x8664;

const COMIMAGE_FLAGS_ILONLY: u32 = 0x1;
const COMIMAGE_FLAGS_32BITREQUIRED: u32 = 0x2;
const COMIMAGE_FLAGS_32BITPREFERRED: u32 = 0x20000;

// Metadata table ids.
const TABLE_MODULE: usize = 0x00;
const TABLE_TYPE_REF: usize = 0x01;
const TABLE_TYPE_DEF: usize = 0x02;
const TABLE_FIELD_PTR: usize = 0x03;
const TABLE_FIELD: usize = 0x04;
const TABLE_METHOD_PTR: usize = 0x05;
const TABLE_METHOD_DEF: usize = 0x06;
const TABLE_PARAM_PTR: usize = 0x07;
const TABLE_PARAM: usize = 0x08;
const TABLE_INTERFACE_IMPL: usize = 0x09;
const TABLE_MEMBER_REF: usize = 0x0A;
const TABLE_CONSTANT: usize = 0x0B;
const TABLE_CUSTOM_ATTRIBUTE: usize = 0x0C;
const TABLE_FIELD_MARSHAL: usize = 0x0D;
const TABLE_DECL_SECURITY: usize = 0x0E;
const TABLE_CLASS_LAYOUT: usize = 0x0F;
const TABLE_FIELD_LAYOUT: usize = 0x10;
const TABLE_STANDALONE_SIG: usize = 0x11;
const TABLE_EVENT_MAP: usize = 0x12;
const TABLE_EVENT_PTR: usize = 0x13;
const TABLE_EVENT: usize = 0x14;
const TABLE_PROPERTY_MAP: usize = 0x15;
const TABLE_PROPERTY_PTR: usize = 0x16;
const TABLE_PROPERTY: usize = 0x17;
const TABLE_METHOD_SEMANTICS: usize = 0x18;
const TABLE_METHOD_IMPL: usize = 0x19;
const TABLE_MODULE_REF: usize = 0x1A;
const TABLE_TYPE_SPEC: usize = 0x1B;
const TABLE_IMPL_MAP: usize = 0x1C;
const TABLE_FIELD_RVA: usize = 0x1D;
const TABLE_ENC_LOG: usize = 0x1E;
const TABLE_ENC_MAP: usize = 0x1F;
const TABLE_ASSEMBLY: usize = 0x20;
const TABLE_ASSEMBLY_PROCESSOR: usize = 0x21;
const TABLE_ASSEMBLY_OS: usize = 0x22;
const TABLE_ASSEMBLY_REF: usize = 0x23;
const TABLE_ASSEMBLY_REF_PROCESSOR: usize = 0x24;
const TABLE_ASSEMBLY_REF_OS: usize = 0x25;
const TABLE_FILE: usize = 0x26;
const TABLE_EXPORTED_TYPE: usize = 0x27;
const TABLE_MANIFEST_RESOURCE: usize = 0x28;
const TABLE_NESTED_CLASS: usize = 0x29;
const TABLE_GENERIC_PARAM: usize = 0x2A;
const TABLE_METHOD_SPEC: usize = 0x2B;
const TABLE_GENERIC_PARAM_CONSTRAINT: usize = 0x2C;

const TABLE_COUNT: usize = 0x2D;

/// A failure while decoding a managed PE image.
#[derive(Clone, Debug)]
pub(crate) struct PeError(pub(crate) String);

impl PeError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for PeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PeError {}

type Result<T> = std::result::Result<T, PeError>;

/// Everything the managed inspector needs from an image.
#[derive(Clone, Debug)]
pub(crate) struct RawAssembly {
    /// The assembly name from the manifest, if the image has one.
    pub(crate) assembly_name: Option<String>,
    /// The module name, usually the file name with its extension.
    pub(crate) module_name: String,
    pub(crate) version: Option<Version>,
    pub(crate) culture: String,
    /// The raw target-framework attribute value, or `""`.
    pub(crate) framework_id: String,
    pub(crate) platform: Platform,
    pub(crate) references: Vec<RawAssemblyRef>,
    /// Platform-invoke import module names, as written in metadata.
    pub(crate) pinvoke_imports: BTreeSet<String>,
}

/// One row of the assembly-reference table.
#[derive(Clone, Debug)]
pub(crate) struct RawAssemblyRef {
    pub(crate) name: String,
    pub(crate) version: Version,
    pub(crate) culture: String,
}

/// Reads the identity and references of a managed image.
pub(crate) fn read_assembly(data: &[u8]) -> Result<RawAssembly> {
    let image = Bytes(data);

    // DOS header, then the PE signature it points at.
    if image.u16(0)? != u16::from_le_bytes(*b"MZ") {
        return Err(PeError::new("not a PE image: missing MZ signature"));
    }
    let pe_off = image.u32(0x3C)? as usize;
    if image.slice(pe_off, 4)? != b"PE\0\0" {
        return Err(PeError::new("not a PE image: missing PE signature"));
    }

    let coff = pe_off + 4;
    let machine = image.u16(coff)?;
    let section_count = image.u16(coff + 2)? as usize;
    let optional_size = image.u16(coff + 16)? as usize;

    let opt = coff + 20;
    let magic = image.u16(opt)?;
    let pe32_plus = match magic {
        0x10B => false,
        0x20B => true,
        other => return Err(PeError::new(format!("bad optional header magic {:#x}", other))),
    };

    let dir_count_off = opt + if pe32_plus { 108 } else { 92 };
    let dirs = opt + if pe32_plus { 112 } else { 96 };
    let dir_count = image.u32(dir_count_off)? as usize;
    if dir_count < 15 {
        return Err(PeError::new("not a managed module: no CLI data directory"));
    }
    let cli_rva = image.u32(dirs + 14 * 8)? as usize;
    if cli_rva == 0 {
        return Err(PeError::new("not a managed module: empty CLI data directory"));
    }

    let sections = read_sections(&image, opt + optional_size, section_count)?;

    // CLI header: metadata location plus the image flags that drive the
    // platform classification.
    let cli = rva_to_offset(&sections, cli_rva)?;
    let metadata_rva = image.u32(cli + 8)? as usize;
    let flags = image.u32(cli + 16)?;
    let platform = classify_platform(machine, pe32_plus, flags);

    let metadata = Metadata::read(&image, &sections, metadata_rva)?;
    let tables = TableStream::read(&metadata)?;

    let module_name = tables.module_name(&metadata)?;
    let mut assembly_name = None;
    let mut version = None;
    let mut culture = String::new();
    if tables.row_count(TABLE_ASSEMBLY) > 0 {
        let row = tables.assembly_row(&metadata)?;
        assembly_name = Some(row.name);
        version = Some(row.version);
        culture = row.culture;
    }

    let references = tables.assembly_refs(&metadata)?;
    let pinvoke_imports = tables.pinvoke_imports(&metadata)?;
    let framework_id = tables.target_framework(&metadata)?.unwrap_or_default();

    Ok(RawAssembly {
        assembly_name,
        module_name,
        version,
        culture,
        framework_id,
        platform,
        references,
        pinvoke_imports,
    })
}

/// Derives the processor platform from the COFF machine field, the
/// optional-header magic, and the CLI image flags.
pub(crate) fn classify_platform(machine: u16, pe32_plus: bool, cli_flags: u32) -> Platform {
    if pe32_plus && machine == MACHINE_AMD64 {
        return Platform::Amd64;
    }
    if machine == MACHINE_I386 {
        if cli_flags & COMIMAGE_FLAGS_32BITREQUIRED != 0 {
            return Platform::X86;
        }
        if cli_flags & COMIMAGE_FLAGS_ILONLY != 0 {
            if cli_flags & COMIMAGE_FLAGS_32BITPREFERRED != 0 {
                return Platform::AnyCpuPrefer32;
            }
            return Platform::AnyCpu;
        }
    }
    Platform::Unknown
}

// ---
// Raw byte access
// ---

struct Bytes<'a>(&'a [u8]);

impl<'a> Bytes<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.0
            .get(offset..offset.checked_add(len).ok_or_else(|| PeError::new("offset overflow"))?)
            .ok_or_else(|| {
                PeError::new(format!(
                    "truncated image: wanted {} bytes at offset {:#x}",
                    len, offset
                ))
            })
    }

    fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    fn u16(&self, offset: usize) -> Result<u16> {
        let bytes = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&self, offset: usize) -> Result<u64> {
        let bytes = self.slice(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }
}

struct Section {
    virtual_address: usize,
    virtual_size: usize,
    raw_offset: usize,
    raw_size: usize,
}

fn read_sections(image: &Bytes<'_>, table_offset: usize, count: usize) -> Result<Vec<Section>> {
    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let row = table_offset + i * 40;
        sections.push(Section {
            virtual_size: image.u32(row + 8)? as usize,
            virtual_address: image.u32(row + 12)? as usize,
            raw_size: image.u32(row + 16)? as usize,
            raw_offset: image.u32(row + 20)? as usize,
        });
    }
    Ok(sections)
}

fn rva_to_offset(sections: &[Section], rva: usize) -> Result<usize> {
    for section in sections {
        let size = section.virtual_size.max(section.raw_size);
        if rva >= section.virtual_address && rva < section.virtual_address + size {
            return Ok(rva - section.virtual_address + section.raw_offset);
        }
    }
    Err(PeError::new(format!("RVA {:#x} is not in any section", rva)))
}

// ---
// Metadata root and heaps
// ---

struct Metadata<'a> {
    tables: &'a [u8],
    strings: &'a [u8],
    blobs: &'a [u8],
}

impl<'a> Metadata<'a> {
    fn read(image: &Bytes<'a>, sections: &[Section], metadata_rva: usize) -> Result<Self> {
        let root = rva_to_offset(sections, metadata_rva)?;
        if image.u32(root)? != 0x424A_5342 {
            return Err(PeError::new("bad metadata signature"));
        }
        let version_len = image.u32(root + 12)? as usize;
        let stream_count_off = root + 16 + version_len + 2;
        let stream_count = image.u16(stream_count_off)? as usize;

        let mut tables = None;
        let mut strings = None;
        let mut blobs = None;

        let mut header = stream_count_off + 2;
        for _ in 0..stream_count {
            let offset = image.u32(header)? as usize;
            let size = image.u32(header + 4)? as usize;

            // Name: zero-terminated, padded to a 4-byte boundary.
            let name_start = header + 8;
            let mut name_end = name_start;
            while image.u8(name_end)? != 0 {
                name_end += 1;
            }
            let name = image.slice(name_start, name_end - name_start)?;
            let data = image.slice(root + offset, size)?;
            match name {
                b"#~" => tables = Some(data),
                b"#-" => {
                    return Err(PeError::new(
                        "uncompressed metadata tables are not supported",
                    ))
                }
                b"#Strings" => strings = Some(data),
                b"#Blob" => blobs = Some(data),
                _ => {}
            }

            let name_len = name_end - name_start + 1;
            header = name_start + (name_len + 3) / 4 * 4;
        }

        Ok(Self {
            tables: tables.ok_or_else(|| PeError::new("no #~ table stream"))?,
            strings: strings.unwrap_or(&[]),
            blobs: blobs.unwrap_or(&[]),
        })
    }

    /// Looks up a zero-terminated UTF-8 string in the `#Strings` heap.
    fn string_at(&self, index: u32) -> Result<String> {
        let index = index as usize;
        if index == 0 {
            return Ok(String::new());
        }
        let tail = self
            .strings
            .get(index..)
            .ok_or_else(|| PeError::new(format!("string index {:#x} out of range", index)))?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| PeError::new("unterminated string in #Strings heap"))?;
        String::from_utf8(tail[..end].to_vec())
            .map_err(|_| PeError::new("non-UTF-8 string in #Strings heap"))
    }

    /// Looks up a length-prefixed blob in the `#Blob` heap.
    fn blob_at(&self, index: u32) -> Result<&'a [u8]> {
        let index = index as usize;
        if index == 0 {
            return Ok(&[]);
        }
        let tail = self
            .blobs
            .get(index..)
            .ok_or_else(|| PeError::new(format!("blob index {:#x} out of range", index)))?;
        let (len, prefix) = read_compressed_u32(tail)?;
        tail.get(prefix..prefix + len as usize)
            .ok_or_else(|| PeError::new("truncated blob in #Blob heap"))
    }
}

/// Decodes an ECMA-335 compressed unsigned integer, returning the value and
/// the number of prefix bytes consumed.
pub(crate) fn read_compressed_u32(data: &[u8]) -> Result<(u32, usize)> {
    let b0 = *data.first().ok_or_else(|| PeError::new("empty compressed integer"))?;
    if b0 & 0x80 == 0 {
        return Ok((u32::from(b0), 1));
    }
    if b0 & 0xC0 == 0x80 {
        let b1 = *data.get(1).ok_or_else(|| PeError::new("truncated compressed integer"))?;
        return Ok(((u32::from(b0 & 0x3F) << 8) | u32::from(b1), 2));
    }
    if b0 & 0xE0 == 0xC0 {
        if data.len() < 4 {
            return Err(PeError::new("truncated compressed integer"));
        }
        let value = (u32::from(b0 & 0x1F) << 24)
            | (u32::from(data[1]) << 16)
            | (u32::from(data[2]) << 8)
            | u32::from(data[3]);
        return Ok((value, 4));
    }
    Err(PeError::new("invalid compressed integer prefix"))
}

/// Parses a custom-attribute value blob holding a single string argument,
/// e.g. the target-framework attribute. Returns `None` for a null string.
pub(crate) fn read_string_attribute(blob: &[u8]) -> Result<Option<String>> {
    if blob.len() < 2 || blob[0] != 0x01 || blob[1] != 0x00 {
        return Err(PeError::new("bad custom attribute prolog"));
    }
    let tail = &blob[2..];
    if tail.first() == Some(&0xFF) {
        return Ok(None);
    }
    let (len, prefix) = read_compressed_u32(tail)?;
    let bytes = tail
        .get(prefix..prefix + len as usize)
        .ok_or_else(|| PeError::new("truncated custom attribute string"))?;
    String::from_utf8(bytes.to_vec())
        .map(Some)
        .map_err(|_| PeError::new("non-UTF-8 custom attribute string"))
}

// ---
// Table stream
// ---

/// Coded-index groups, identified by their tag width and member tables.
#[derive(Clone, Copy)]
enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl Coded {
    fn tag_bits(self) -> u32 {
        match self {
            Coded::TypeDefOrRef
            | Coded::HasConstant
            | Coded::HasDeclSecurity
            | Coded::Implementation
            | Coded::ResolutionScope => 2,
            Coded::HasFieldMarshal
            | Coded::HasSemantics
            | Coded::MethodDefOrRef
            | Coded::MemberForwarded
            | Coded::TypeOrMethodDef => 1,
            Coded::MemberRefParent | Coded::CustomAttributeType => 3,
            Coded::HasCustomAttribute => 5,
        }
    }

    fn members(self) -> &'static [usize] {
        match self {
            Coded::TypeDefOrRef => &[TABLE_TYPE_DEF, TABLE_TYPE_REF, TABLE_TYPE_SPEC],
            Coded::HasConstant => &[TABLE_FIELD, TABLE_PARAM, TABLE_PROPERTY],
            Coded::HasCustomAttribute => &[
                TABLE_METHOD_DEF,
                TABLE_FIELD,
                TABLE_TYPE_REF,
                TABLE_TYPE_DEF,
                TABLE_PARAM,
                TABLE_INTERFACE_IMPL,
                TABLE_MEMBER_REF,
                TABLE_MODULE,
                TABLE_DECL_SECURITY,
                TABLE_PROPERTY,
                TABLE_EVENT,
                TABLE_STANDALONE_SIG,
                TABLE_MODULE_REF,
                TABLE_TYPE_SPEC,
                TABLE_ASSEMBLY,
                TABLE_ASSEMBLY_REF,
                TABLE_FILE,
                TABLE_EXPORTED_TYPE,
                TABLE_MANIFEST_RESOURCE,
                TABLE_GENERIC_PARAM,
                TABLE_GENERIC_PARAM_CONSTRAINT,
                TABLE_METHOD_SPEC,
            ],
            Coded::HasFieldMarshal => &[TABLE_FIELD, TABLE_PARAM],
            Coded::HasDeclSecurity => &[TABLE_TYPE_DEF, TABLE_METHOD_DEF, TABLE_ASSEMBLY],
            Coded::MemberRefParent => &[
                TABLE_TYPE_DEF,
                TABLE_TYPE_REF,
                TABLE_MODULE_REF,
                TABLE_METHOD_DEF,
                TABLE_TYPE_SPEC,
            ],
            Coded::HasSemantics => &[TABLE_EVENT, TABLE_PROPERTY],
            Coded::MethodDefOrRef => &[TABLE_METHOD_DEF, TABLE_MEMBER_REF],
            Coded::MemberForwarded => &[TABLE_FIELD, TABLE_METHOD_DEF],
            Coded::Implementation => &[TABLE_FILE, TABLE_ASSEMBLY_REF, TABLE_EXPORTED_TYPE],
            Coded::CustomAttributeType => &[TABLE_METHOD_DEF, TABLE_MEMBER_REF],
            Coded::ResolutionScope => &[
                TABLE_MODULE,
                TABLE_MODULE_REF,
                TABLE_ASSEMBLY_REF,
                TABLE_TYPE_REF,
            ],
            Coded::TypeOrMethodDef => &[TABLE_TYPE_DEF, TABLE_METHOD_DEF],
        }
    }
}

/// Tags within `HasCustomAttribute`.
const HCA_TAG_ASSEMBLY: u32 = 14;
/// Tags within `CustomAttributeType`.
const CAT_TAG_MEMBER_REF: u32 = 3;
/// Tags within `MemberRefParent`.
const MRP_TAG_TYPE_REF: u32 = 1;

struct TableStream {
    row_counts: [u32; TABLE_COUNT],
    wide_strings: bool,
    wide_guids: bool,
    wide_blobs: bool,
    /// Byte offset of each table's rows within the `#~` stream.
    table_offsets: [usize; TABLE_COUNT],
    row_sizes: [usize; TABLE_COUNT],
}

impl TableStream {
    fn read(metadata: &Metadata<'_>) -> Result<Self> {
        let stream = Bytes(metadata.tables);
        let heap_sizes = stream.u8(6)?;
        let valid = stream.u64(8)?;

        if valid >> TABLE_COUNT != 0 {
            return Err(PeError::new("unsupported metadata table present"));
        }

        let mut row_counts = [0u32; TABLE_COUNT];
        let mut pos = 24;
        for (table, count) in row_counts.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = stream.u32(pos)?;
                pos += 4;
            }
        }

        let mut tables = Self {
            row_counts,
            wide_strings: heap_sizes & 0x1 != 0,
            wide_guids: heap_sizes & 0x2 != 0,
            wide_blobs: heap_sizes & 0x4 != 0,
            table_offsets: [0; TABLE_COUNT],
            row_sizes: [0; TABLE_COUNT],
        };

        for table in 0..TABLE_COUNT {
            tables.row_sizes[table] = tables.row_size(table);
            tables.table_offsets[table] = pos;
            pos += tables.row_sizes[table] * tables.row_counts[table] as usize;
        }
        if pos > metadata.tables.len() {
            return Err(PeError::new("truncated #~ table stream"));
        }

        Ok(tables)
    }

    fn row_count(&self, table: usize) -> u32 {
        self.row_counts[table]
    }

    fn string_size(&self) -> usize {
        if self.wide_strings {
            4
        } else {
            2
        }
    }

    fn guid_size(&self) -> usize {
        if self.wide_guids {
            4
        } else {
            2
        }
    }

    fn blob_size(&self) -> usize {
        if self.wide_blobs {
            4
        } else {
            2
        }
    }

    fn index_size(&self, table: usize) -> usize {
        if self.row_counts[table] > 0xFFFF {
            4
        } else {
            2
        }
    }

    fn coded_size(&self, coded: Coded) -> usize {
        let max_rows = coded
            .members()
            .iter()
            .map(|&table| self.row_counts[table])
            .max()
            .unwrap_or(0);
        if u64::from(max_rows) >= 1u64 << (16 - coded.tag_bits()) {
            4
        } else {
            2
        }
    }

    /// The fixed ECMA-335 row schema, reduced to byte sizes.
    fn row_size(&self, table: usize) -> usize {
        let s = self.string_size();
        let g = self.guid_size();
        let b = self.blob_size();
        match table {
            TABLE_MODULE => 2 + s + 3 * g,
            TABLE_TYPE_REF => self.coded_size(Coded::ResolutionScope) + 2 * s,
            TABLE_TYPE_DEF => {
                4 + 2 * s
                    + self.coded_size(Coded::TypeDefOrRef)
                    + self.index_size(TABLE_FIELD)
                    + self.index_size(TABLE_METHOD_DEF)
            }
            TABLE_FIELD_PTR => self.index_size(TABLE_FIELD),
            TABLE_FIELD => 2 + s + b,
            TABLE_METHOD_PTR => self.index_size(TABLE_METHOD_DEF),
            TABLE_METHOD_DEF => 4 + 2 + 2 + s + b + self.index_size(TABLE_PARAM),
            TABLE_PARAM_PTR => self.index_size(TABLE_PARAM),
            TABLE_PARAM => 2 + 2 + s,
            TABLE_INTERFACE_IMPL => {
                self.index_size(TABLE_TYPE_DEF) + self.coded_size(Coded::TypeDefOrRef)
            }
            TABLE_MEMBER_REF => self.coded_size(Coded::MemberRefParent) + s + b,
            TABLE_CONSTANT => 1 + 1 + self.coded_size(Coded::HasConstant) + b,
            TABLE_CUSTOM_ATTRIBUTE => {
                self.coded_size(Coded::HasCustomAttribute)
                    + self.coded_size(Coded::CustomAttributeType)
                    + b
            }
            TABLE_FIELD_MARSHAL => self.coded_size(Coded::HasFieldMarshal) + b,
            TABLE_DECL_SECURITY => 2 + self.coded_size(Coded::HasDeclSecurity) + b,
            TABLE_CLASS_LAYOUT => 2 + 4 + self.index_size(TABLE_TYPE_DEF),
            TABLE_FIELD_LAYOUT => 4 + self.index_size(TABLE_FIELD),
            TABLE_STANDALONE_SIG => b,
            TABLE_EVENT_MAP => self.index_size(TABLE_TYPE_DEF) + self.index_size(TABLE_EVENT),
            TABLE_EVENT_PTR => self.index_size(TABLE_EVENT),
            TABLE_EVENT => 2 + s + self.coded_size(Coded::TypeDefOrRef),
            TABLE_PROPERTY_MAP => {
                self.index_size(TABLE_TYPE_DEF) + self.index_size(TABLE_PROPERTY)
            }
            TABLE_PROPERTY_PTR => self.index_size(TABLE_PROPERTY),
            TABLE_PROPERTY => 2 + s + b,
            TABLE_METHOD_SEMANTICS => {
                2 + self.index_size(TABLE_METHOD_DEF) + self.coded_size(Coded::HasSemantics)
            }
            TABLE_METHOD_IMPL => {
                self.index_size(TABLE_TYPE_DEF) + 2 * self.coded_size(Coded::MethodDefOrRef)
            }
            TABLE_MODULE_REF => s,
            TABLE_TYPE_SPEC => b,
            TABLE_IMPL_MAP => {
                2 + self.coded_size(Coded::MemberForwarded) + s + self.index_size(TABLE_MODULE_REF)
            }
            TABLE_FIELD_RVA => 4 + self.index_size(TABLE_FIELD),
            TABLE_ENC_LOG => 4 + 4,
            TABLE_ENC_MAP => 4,
            TABLE_ASSEMBLY => 4 + 8 + 4 + b + 2 * s,
            TABLE_ASSEMBLY_PROCESSOR => 4,
            TABLE_ASSEMBLY_OS => 4 + 4 + 4,
            TABLE_ASSEMBLY_REF => 8 + 4 + b + 2 * s + b,
            TABLE_ASSEMBLY_REF_PROCESSOR => 4 + self.index_size(TABLE_ASSEMBLY_REF),
            TABLE_ASSEMBLY_REF_OS => 4 + 4 + 4 + self.index_size(TABLE_ASSEMBLY_REF),
            TABLE_FILE => 4 + s + b,
            TABLE_EXPORTED_TYPE => 4 + 4 + 2 * s + self.coded_size(Coded::Implementation),
            TABLE_MANIFEST_RESOURCE => 4 + 4 + s + self.coded_size(Coded::Implementation),
            TABLE_NESTED_CLASS => 2 * self.index_size(TABLE_TYPE_DEF),
            TABLE_GENERIC_PARAM => {
                2 + 2 + self.coded_size(Coded::TypeOrMethodDef) + s
            }
            TABLE_METHOD_SPEC => self.coded_size(Coded::MethodDefOrRef) + b,
            TABLE_GENERIC_PARAM_CONSTRAINT => {
                self.index_size(TABLE_GENERIC_PARAM) + self.coded_size(Coded::TypeDefOrRef)
            }
            _ => unreachable!("table id out of range"),
        }
    }

    /// Positions a cursor at a zero-based row of a table.
    fn row<'a>(&'a self, metadata: &Metadata<'a>, table: usize, row: u32) -> Result<RowCursor<'a>> {
        if row >= self.row_counts[table] {
            return Err(PeError::new(format!(
                "row {} out of range for table {:#x}",
                row, table
            )));
        }
        Ok(RowCursor {
            tables: self,
            data: metadata.tables,
            pos: self.table_offsets[table] + self.row_sizes[table] * row as usize,
        })
    }

    fn module_name(&self, metadata: &Metadata<'_>) -> Result<String> {
        if self.row_count(TABLE_MODULE) == 0 {
            return Err(PeError::new("metadata has no module row"));
        }
        let mut row = self.row(metadata, TABLE_MODULE, 0)?;
        row.skip(2)?; // Generation
        let name = row.string_index()?;
        metadata.string_at(name)
    }

    fn assembly_row(&self, metadata: &Metadata<'_>) -> Result<AssemblyRow> {
        let mut row = self.row(metadata, TABLE_ASSEMBLY, 0)?;
        row.skip(4)?; // HashAlgId
        let version = row.version()?;
        row.skip(4)?; // Flags
        row.skip(self.blob_size())?; // PublicKey
        let name = metadata.string_at(row.string_index()?)?;
        let culture = metadata.string_at(row.string_index()?)?;
        Ok(AssemblyRow {
            name,
            version,
            culture,
        })
    }

    fn assembly_refs(&self, metadata: &Metadata<'_>) -> Result<Vec<RawAssemblyRef>> {
        let count = self.row_count(TABLE_ASSEMBLY_REF);
        let mut references = Vec::with_capacity(count as usize);
        for i in 0..count {
            let mut row = self.row(metadata, TABLE_ASSEMBLY_REF, i)?;
            let version = row.version()?;
            row.skip(4)?; // Flags
            row.skip(self.blob_size())?; // PublicKeyOrToken
            let name = metadata.string_at(row.string_index()?)?;
            let culture = metadata.string_at(row.string_index()?)?;
            references.push(RawAssemblyRef {
                name,
                version,
                culture,
            });
        }
        Ok(references)
    }

    /// Collects the module names referenced by platform-invoke stubs.
    fn pinvoke_imports(&self, metadata: &Metadata<'_>) -> Result<BTreeSet<String>> {
        let mut imports = BTreeSet::new();
        for i in 0..self.row_count(TABLE_IMPL_MAP) {
            let mut row = self.row(metadata, TABLE_IMPL_MAP, i)?;
            row.skip(2)?; // MappingFlags
            row.skip(self.coded_size(Coded::MemberForwarded))?;
            row.skip(self.string_size())?; // ImportName
            let scope = row.index(TABLE_MODULE_REF)?;
            if scope == 0 || scope > self.row_count(TABLE_MODULE_REF) {
                continue;
            }
            let mut module_ref = self.row(metadata, TABLE_MODULE_REF, scope - 1)?;
            let name = metadata.string_at(module_ref.string_index()?)?;
            if !name.is_empty() {
                imports.insert(name);
            }
        }
        Ok(imports)
    }

    /// Finds the assembly-level target-framework attribute, if present.
    fn target_framework(&self, metadata: &Metadata<'_>) -> Result<Option<String>> {
        if self.row_count(TABLE_ASSEMBLY) == 0 {
            return Ok(None);
        }
        for i in 0..self.row_count(TABLE_CUSTOM_ATTRIBUTE) {
            let mut row = self.row(metadata, TABLE_CUSTOM_ATTRIBUTE, i)?;
            let parent = row.coded(Coded::HasCustomAttribute)?;
            let attr_type = row.coded(Coded::CustomAttributeType)?;
            let value = row.blob_index()?;

            let parent_tag = parent & 0x1F;
            let parent_row = parent >> 5;
            if parent_tag != HCA_TAG_ASSEMBLY || parent_row != 1 {
                continue;
            }

            // The attribute constructor is a MemberRef whose parent TypeRef
            // names the attribute type.
            if attr_type & 0x7 != CAT_TAG_MEMBER_REF {
                continue;
            }
            let member_ref_row = attr_type >> 3;
            if member_ref_row == 0 || member_ref_row > self.row_count(TABLE_MEMBER_REF) {
                continue;
            }
            let mut member_ref = self.row(metadata, TABLE_MEMBER_REF, member_ref_row - 1)?;
            let class = member_ref.coded(Coded::MemberRefParent)?;
            if class & 0x7 != MRP_TAG_TYPE_REF {
                continue;
            }
            let type_ref_row = class >> 3;
            if type_ref_row == 0 || type_ref_row > self.row_count(TABLE_TYPE_REF) {
                continue;
            }
            let mut type_ref = self.row(metadata, TABLE_TYPE_REF, type_ref_row - 1)?;
            type_ref.skip(self.coded_size(Coded::ResolutionScope))?;
            let type_name = metadata.string_at(type_ref.string_index()?)?;
            if type_name != "TargetFrameworkAttribute" {
                continue;
            }

            let blob = metadata.blob_at(value)?;
            return read_string_attribute(blob);
        }
        Ok(None)
    }
}

struct AssemblyRow {
    name: String,
    version: Version,
    culture: String,
}

/// A cursor over the fields of one table row.
struct RowCursor<'a> {
    tables: &'a TableStream,
    data: &'a [u8],
    pos: usize,
}

impl RowCursor<'_> {
    fn skip(&mut self, bytes: usize) -> Result<()> {
        self.pos += bytes;
        if self.pos > self.data.len() {
            return Err(PeError::new("row cursor ran off the table stream"));
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u32> {
        let value = Bytes(self.data).u16(self.pos)?;
        self.pos += 2;
        Ok(u32::from(value))
    }

    fn u32(&mut self) -> Result<u32> {
        let value = Bytes(self.data).u32(self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    fn sized(&mut self, size: usize) -> Result<u32> {
        match size {
            2 => self.u16(),
            4 => self.u32(),
            _ => unreachable!("index sizes are 2 or 4"),
        }
    }

    fn string_index(&mut self) -> Result<u32> {
        let size = self.tables.string_size();
        self.sized(size)
    }

    fn blob_index(&mut self) -> Result<u32> {
        let size = self.tables.blob_size();
        self.sized(size)
    }

    fn index(&mut self, table: usize) -> Result<u32> {
        let size = self.tables.index_size(table);
        self.sized(size)
    }

    fn coded(&mut self, coded: Coded) -> Result<u32> {
        let size = self.tables.coded_size(coded);
        self.sized(size)
    }

    /// Reads a four-field u16 version (assembly tables).
    fn version(&mut self) -> Result<Version> {
        let major = self.u16()?;
        let minor = self.u16()?;
        let build = self.u16()?;
        let revision = self.u16()?;
        Ok(Version::new(major, minor, build, revision))
    }
}
