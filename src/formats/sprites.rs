//! Sprite atlas codec.
//!
//! The file is an offset index followed by run-length-compressed sprite
//! records. Each record paints a 32x32 RGBA canvas from (skip, run) tuples:
//! `skip` leaves that many pixels transparent, `run` copies that many literal
//! pixels. Untouched records are copied verbatim when compiling; only
//! overridden sprite ids are re-compressed.

use std::{collections::BTreeMap, fmt, io, io::Cursor};

use crate::binary_utils::{read_bytes, read_u16_le, read_u32_le, seek_to, ByteWriter};
use crate::containers::{self, AssetKind, ContainerError};
use crate::data::sprites::{SpriteAtlas, SPRITE_BYTES, SPRITE_PIXELS};
use crate::data::versions::VersionTable;
use crate::formats::Era;

/// Transparency key written into the three unused lead bytes of a record.
const TRANSPARENT_KEY: [u8; 3] = [0xFF, 0x00, 0xFF];
/// Bytes of record header before the tuple stream: key + compressed length.
const RECORD_HEADER_LEN: usize = 5;

#[derive(Debug)]
pub enum SpriteError {
    Container(ContainerError),
    /// An index offset or length field points outside the file.
    RecordOutOfBounds { id: u32 },
    /// A record paints more than the 1024 pixels of the canvas.
    PixelOverflow { id: u32 },
    /// A pixel buffer handed to the encoder is not exactly 32x32 RGBA.
    BadPixelBuffer { len: usize },
    /// More sprites than the u16 index of this era can describe.
    AtlasTooLarge { count: u32 },
    Io(io::Error),
}

impl From<io::Error> for SpriteError {
    fn from(err: io::Error) -> Self {
        SpriteError::Io(err)
    }
}

impl From<ContainerError> for SpriteError {
    fn from(err: ContainerError) -> Self {
        SpriteError::Container(err)
    }
}

impl fmt::Display for SpriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpriteError::Container(err) => write!(f, "Container error: {}", err),
            SpriteError::RecordOutOfBounds { id } => {
                write!(f, "Sprite {}: record lies outside the file", id)
            }
            SpriteError::PixelOverflow { id } => {
                write!(f, "Sprite {}: record paints past the 32x32 canvas", id)
            }
            SpriteError::BadPixelBuffer { len } => write!(
                f,
                "Pixel buffer has {} bytes, expected {} (32x32 RGBA)",
                len, SPRITE_BYTES
            ),
            SpriteError::AtlasTooLarge { count } => write!(
                f,
                "{} sprites do not fit the u16 index of this format version",
                count
            ),
            SpriteError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for SpriteError {}

/// Parses a sprite atlas using the built-in version table.
pub fn parse_sprite_atlas(buffer: &[u8]) -> Result<SpriteAtlas, SpriteError> {
    parse_sprite_atlas_with(buffer, &VersionTable::builtin())
}

pub fn parse_sprite_atlas_with(
    buffer: &[u8],
    table: &VersionTable,
) -> Result<SpriteAtlas, SpriteError> {
    let header = containers::detect(buffer, AssetKind::SpriteAtlas, table)?;
    let era = Era::from_version(header.content_version);

    let mut cursor = Cursor::new(buffer);
    seek_to(&mut cursor, header.payload_offset as u64)?;

    let count = if era.long_atlas_index {
        read_u32_le(&mut cursor)?
    } else {
        read_u16_le(&mut cursor)? as u32
    };

    let mut offsets = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        offsets.push(read_u32_le(&mut cursor)?);
    }

    Ok(SpriteAtlas::from_parse(
        era,
        header,
        count,
        offsets,
        buffer.to_vec(),
    ))
}

/// Slices the raw record bytes of `id` out of the atlas buffer, or `None`
/// for empty/out-of-range ids. The span is the 5-byte record header plus the
/// declared compressed length.
fn record_bytes(atlas: &SpriteAtlas, id: u32) -> Result<Option<&[u8]>, SpriteError> {
    let offset = match atlas.offset_of(id) {
        Some(offset) => offset as usize,
        None => return Ok(None),
    };
    let data = atlas.data();
    if offset + RECORD_HEADER_LEN > data.len() {
        return Err(SpriteError::RecordOutOfBounds { id });
    }
    let compressed_len =
        u16::from_le_bytes([data[offset + 3], data[offset + 4]]) as usize;
    let end = offset + RECORD_HEADER_LEN + compressed_len;
    if end > data.len() {
        return Err(SpriteError::RecordOutOfBounds { id });
    }
    Ok(Some(&data[offset..end]))
}

/// Decodes sprite `id` into a 32x32 RGBA buffer, or `None` when the slot is
/// empty. Pixels no tuple reaches stay fully transparent.
pub fn decode_sprite(atlas: &SpriteAtlas, id: u32) -> Result<Option<Vec<u8>>, SpriteError> {
    let record = match record_bytes(atlas, id)? {
        Some(record) => record,
        None => return Ok(None),
    };

    let mut canvas = vec![0u8; SPRITE_BYTES];
    let tuples = &record[RECORD_HEADER_LEN..];
    let mut cursor = Cursor::new(tuples);
    let mut pixel = 0usize;

    while (cursor.position() as usize) < tuples.len() {
        let skip = read_u16_le(&mut cursor)? as usize;
        let run = read_u16_le(&mut cursor)? as usize;
        pixel += skip;
        if pixel + run > SPRITE_PIXELS {
            return Err(SpriteError::PixelOverflow { id });
        }
        if run > 0 {
            let literals = read_bytes(&mut cursor, run * 4)?;
            canvas[pixel * 4..(pixel + run) * 4].copy_from_slice(&literals);
            pixel += run;
        }
    }

    Ok(Some(canvas))
}

/// True when every byte of the RGBA buffer is zero; such a sprite compiles
/// to an empty index slot.
pub fn is_blank_sprite(pixels: &[u8]) -> bool {
    pixels.iter().all(|b| *b == 0)
}

fn pixel_is_transparent(pixels: &[u8], index: usize) -> bool {
    pixels[index * 4..index * 4 + 4] == [0, 0, 0, 0]
}

/// Compresses a 32x32 RGBA buffer into one sprite record (header included):
/// maximal transparent stretches become skips, maximal literal stretches
/// become runs. Trailing transparency is implicit and costs no tuple.
pub fn encode_sprite(pixels: &[u8]) -> Result<Vec<u8>, SpriteError> {
    if pixels.len() != SPRITE_BYTES {
        return Err(SpriteError::BadPixelBuffer { len: pixels.len() });
    }

    let mut tuples = ByteWriter::new();
    let mut pixel = 0usize;
    while pixel < SPRITE_PIXELS {
        let mut skip = 0usize;
        while pixel < SPRITE_PIXELS && pixel_is_transparent(pixels, pixel) {
            skip += 1;
            pixel += 1;
        }
        if pixel >= SPRITE_PIXELS {
            break;
        }
        let run_start = pixel;
        while pixel < SPRITE_PIXELS && !pixel_is_transparent(pixels, pixel) {
            pixel += 1;
        }
        let run = pixel - run_start;
        tuples.write_u16_le(skip as u16);
        tuples.write_u16_le(run as u16);
        tuples.write_bytes(&pixels[run_start * 4..pixel * 4]);
    }

    let tuples = tuples.into_inner();
    let mut record = ByteWriter::with_capacity(RECORD_HEADER_LEN + tuples.len());
    record.write_bytes(&TRANSPARENT_KEY);
    record.write_u16_le(tuples.len() as u16);
    record.write_bytes(&tuples);
    Ok(record.into_inner())
}

/// Compiles the atlas into file bytes.
///
/// `overrides` maps sprite ids to replacement pixel buffers; ids beyond the
/// current count grow the atlas. Every other record is copied verbatim from
/// the original file.
pub fn compile_sprite_atlas(
    atlas: &SpriteAtlas,
    overrides: &BTreeMap<u32, Vec<u8>>,
) -> Result<Vec<u8>, SpriteError> {
    let count = atlas
        .sprite_count()
        .max(overrides.keys().next_back().copied().unwrap_or(0));
    if !atlas.era.long_atlas_index && count > u16::MAX as u32 {
        return Err(SpriteError::AtlasTooLarge { count });
    }

    let count_field_len = if atlas.era.long_atlas_index { 4 } else { 2 };
    let base = atlas.header.payload_offset + count_field_len + 4 * count as usize;

    let mut offsets = Vec::with_capacity(count as usize);
    let mut records = ByteWriter::new();
    for id in 1..=count {
        let offset = match overrides.get(&id) {
            Some(pixels) if is_blank_sprite(pixels) => 0,
            Some(pixels) => {
                let offset = base + records.len();
                records.write_bytes(&encode_sprite(pixels)?);
                offset as u32
            }
            None => match record_bytes(atlas, id)? {
                Some(record) => {
                    let offset = base + records.len();
                    records.write_bytes(record);
                    offset as u32
                }
                None => 0,
            },
        };
        offsets.push(offset);
    }

    let mut writer = ByteWriter::with_capacity(base + records.len());
    containers::write_header(&mut writer, &atlas.header);
    if atlas.era.long_atlas_index {
        writer.write_u32_le(count);
    } else {
        writer.write_u16_le(count as u16);
    }
    for offset in offsets {
        writer.write_u32_le(offset);
    }
    writer.write_bytes(records.as_slice());
    Ok(writer.into_inner())
}
