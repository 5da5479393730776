//! Container header detection for asset files.
//!
//! Two header styles exist in the wild. Repackaged files start with a fixed
//! 20-byte tagged header carrying the file kind and content version outright.
//! Files shipped with original clients start with nothing but a 4-byte build
//! signature; those are resolved through the known-version table.

use std::{fmt, io, io::Cursor};

use crate::binary_utils::{read_bytes, read_u16_le, read_u32_le, read_u8, ByteWriter};
use crate::data::versions::VersionTable;

pub const TAGGED_MAGIC: [u8; 8] = *b"OTASSETS";
pub const TAGGED_HEADER_LEN: usize = 20;
pub const LEGACY_HEADER_LEN: usize = 4;

/// Offset of the feature-flags byte inside a tagged header.
pub const FEATURE_FLAGS_OFFSET: usize = 15;

/// Feature bits carried in the tagged header.
pub mod features {
    pub const EXTENDED: u8 = 1 << 0;
    pub const TRANSPARENCY: u8 = 1 << 1;
    pub const FRAME_GROUPS: u8 = 1 << 2;
    pub const FRAME_DURATIONS: u8 = 1 << 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    SpriteAtlas,
    ObjectDefinitions,
}

impl AssetKind {
    pub fn as_byte(self) -> u8 {
        match self {
            AssetKind::SpriteAtlas => 1,
            AssetKind::ObjectDefinitions => 2,
        }
    }

    fn from_byte(byte: u8) -> Option<AssetKind> {
        match byte {
            1 => Some(AssetKind::SpriteAtlas),
            2 => Some(AssetKind::ObjectDefinitions),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetKind::SpriteAtlas => "sprite atlas",
            AssetKind::ObjectDefinitions => "object definitions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    Tagged,
    Legacy,
}

#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub kind: AssetKind,
    pub style: HeaderStyle,
    /// Version of the container layout itself, not of the payload.
    pub format_version: u16,
    pub content_version: u32,
    pub features: u8,
    /// Build signature for legacy files, 0 for tagged ones.
    pub signature: u32,
    pub payload_offset: usize,
}

impl ContainerHeader {
    /// A tagged header for a freshly created file.
    pub fn tagged(kind: AssetKind, content_version: u32, features: u8) -> ContainerHeader {
        ContainerHeader {
            kind,
            style: HeaderStyle::Tagged,
            format_version: 1,
            content_version,
            features,
            signature: 0,
            payload_offset: TAGGED_HEADER_LEN,
        }
    }

    pub fn transparency(&self) -> bool {
        self.features & features::TRANSPARENCY != 0
    }
}

#[derive(Debug)]
pub enum ContainerError {
    /// Neither the tagged magic nor any known legacy signature matched.
    UnknownMagic,
    /// The file is a recognized container but not of the expected kind.
    FileKindMismatch { expected: AssetKind, found: u8 },
    Io(io::Error),
}

impl From<io::Error> for ContainerError {
    fn from(err: io::Error) -> Self {
        ContainerError::Io(err)
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::UnknownMagic => {
                write!(f, "Unrecognized file: no container magic or known signature")
            }
            ContainerError::FileKindMismatch { expected, found } => write!(
                f,
                "Expected a {} container, found file kind {}",
                expected.label(),
                found
            ),
            ContainerError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ContainerError {}

/// Detects the container header of `buffer`, expecting a file of `expected`
/// kind, and returns the header with the payload offset filled in.
pub fn detect(
    buffer: &[u8],
    expected: AssetKind,
    table: &VersionTable,
) -> Result<ContainerHeader, ContainerError> {
    if buffer.len() >= TAGGED_HEADER_LEN && buffer[..TAGGED_MAGIC.len()] == TAGGED_MAGIC {
        return detect_tagged(buffer, expected);
    }
    if buffer.len() >= LEGACY_HEADER_LEN {
        return detect_legacy(buffer, expected, table);
    }
    Err(ContainerError::UnknownMagic)
}

fn detect_tagged(buffer: &[u8], expected: AssetKind) -> Result<ContainerHeader, ContainerError> {
    let mut cursor = Cursor::new(buffer);
    read_bytes(&mut cursor, TAGGED_MAGIC.len())?;

    let kind_byte = read_u8(&mut cursor)?;
    match AssetKind::from_byte(kind_byte) {
        Some(kind) if kind == expected => {}
        _ => {
            return Err(ContainerError::FileKindMismatch {
                expected,
                found: kind_byte,
            })
        }
    }

    let format_version = read_u16_le(&mut cursor)?;
    let content_version = read_u32_le(&mut cursor)?;
    let feature_flags = read_u8(&mut cursor)?;
    read_bytes(&mut cursor, 4)?; // reserved

    Ok(ContainerHeader {
        kind: expected,
        style: HeaderStyle::Tagged,
        format_version,
        content_version,
        features: feature_flags,
        signature: 0,
        payload_offset: TAGGED_HEADER_LEN,
    })
}

fn detect_legacy(
    buffer: &[u8],
    expected: AssetKind,
    table: &VersionTable,
) -> Result<ContainerHeader, ContainerError> {
    let mut cursor = Cursor::new(buffer);
    let signature = read_u32_le(&mut cursor)?;

    let entry = match expected {
        AssetKind::ObjectDefinitions => table.by_dat_signature(signature),
        AssetKind::SpriteAtlas => table.by_spr_signature(signature),
    };
    if let Some(version) = entry {
        return Ok(ContainerHeader {
            kind: expected,
            style: HeaderStyle::Legacy,
            format_version: 0,
            content_version: version.value,
            features: 0,
            signature,
            payload_offset: LEGACY_HEADER_LEN,
        });
    }

    // A signature from the other table means the caller mixed the files up.
    let other = match expected {
        AssetKind::ObjectDefinitions => table.by_spr_signature(signature),
        AssetKind::SpriteAtlas => table.by_dat_signature(signature),
    };
    if other.is_some() {
        let found = match expected {
            AssetKind::ObjectDefinitions => AssetKind::SpriteAtlas.as_byte(),
            AssetKind::SpriteAtlas => AssetKind::ObjectDefinitions.as_byte(),
        };
        return Err(ContainerError::FileKindMismatch { expected, found });
    }

    Err(ContainerError::UnknownMagic)
}

/// Writes `header` in its own style. Tagged headers are always 20 bytes,
/// legacy ones write the 4-byte signature and nothing else.
pub fn write_header(writer: &mut ByteWriter, header: &ContainerHeader) {
    match header.style {
        HeaderStyle::Tagged => {
            writer.write_bytes(&TAGGED_MAGIC);
            writer.write_u8(header.kind.as_byte());
            writer.write_u16_le(header.format_version);
            writer.write_u32_le(header.content_version);
            writer.write_u8(header.features);
            writer.write_bytes(&[0u8; 4]);
        }
        HeaderStyle::Legacy => {
            writer.write_u32_le(header.signature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged_buffer(kind_byte: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TAGGED_MAGIC);
        buf.push(kind_byte);
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&1098u32.to_le_bytes());
        buf.push(features::EXTENDED | features::FRAME_GROUPS);
        buf.extend_from_slice(&[0; 4]);
        buf
    }

    #[test]
    fn detects_tagged_header() {
        let buf = tagged_buffer(2);
        let header = detect(&buf, AssetKind::ObjectDefinitions, &VersionTable::builtin()).unwrap();
        assert_eq!(header.style, HeaderStyle::Tagged);
        assert_eq!(header.content_version, 1098);
        assert_eq!(header.payload_offset, TAGGED_HEADER_LEN);
        assert!(header.features & features::EXTENDED != 0);
    }

    #[test]
    fn tagged_header_round_trips() {
        let buf = tagged_buffer(1);
        let header = detect(&buf, AssetKind::SpriteAtlas, &VersionTable::builtin()).unwrap();
        let mut writer = ByteWriter::new();
        write_header(&mut writer, &header);
        assert_eq!(writer.into_inner(), buf);
    }

    #[test]
    fn rejects_wrong_file_kind() {
        let buf = tagged_buffer(1);
        let err = detect(&buf, AssetKind::ObjectDefinitions, &VersionTable::builtin()).unwrap_err();
        match err {
            ContainerError::FileKindMismatch { expected, found } => {
                assert_eq!(expected, AssetKind::ObjectDefinitions);
                assert_eq!(found, 1);
            }
            other => panic!("expected FileKindMismatch, got {:?}", other),
        }
    }

    #[test]
    fn detects_legacy_signature() {
        let mut buf = 0x493D_607Au32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[0; 8]);
        let header = detect(&buf, AssetKind::ObjectDefinitions, &VersionTable::builtin()).unwrap();
        assert_eq!(header.style, HeaderStyle::Legacy);
        assert_eq!(header.content_version, 860);
        assert_eq!(header.payload_offset, LEGACY_HEADER_LEN);
    }

    #[test]
    fn legacy_signature_of_other_kind_is_a_kind_mismatch() {
        let buf = 0x493D_5F4Cu32.to_le_bytes().to_vec(); // 8.60 sprite signature
        let err = detect(&buf, AssetKind::ObjectDefinitions, &VersionTable::builtin()).unwrap_err();
        assert!(matches!(err, ContainerError::FileKindMismatch { .. }));
    }

    #[test]
    fn unknown_magic_is_a_typed_error() {
        let buf = [0xAA, 0xBB, 0xCC, 0xDD, 0x00];
        let err = detect(&buf, AssetKind::ObjectDefinitions, &VersionTable::builtin()).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownMagic));

        let tiny = [0x01];
        let err = detect(&tiny, AssetKind::SpriteAtlas, &VersionTable::builtin()).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownMagic));
    }
}
