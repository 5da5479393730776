//! Object definition file codec.
//!
//! The payload is a strictly sequential stream: four category counts, then
//! one record per internal id in ascending order. Records are self-delimiting
//! but carry no length, so there is no random access; parsing and compiling
//! both walk the whole stream. Records that were never touched in memory are
//! re-emitted from their captured original bytes, which keeps a load/save
//! cycle lossless even where old files contain oddities the model does not
//! represent.

use std::{fmt, io, io::Cursor};

use crate::binary_utils::{read_i8, read_u16_le, read_u32_le, read_u8, seek_to, ByteWriter};
use crate::containers::{
    self, AssetKind, ContainerError, ContainerHeader, HeaderStyle, FEATURE_FLAGS_OFFSET,
};
use crate::data::things::{
    Animation, FrameDuration, FrameGroup, ObjectModel, ThingAttr, ThingCategory, ThingRecord,
    MIN_THING_ID,
};
use crate::data::versions::VersionTable;
use crate::formats::{flags, Era};
use std::collections::BTreeMap;

#[derive(Debug)]
pub enum ThingError {
    Container(ContainerError),
    /// An attribute id with no mapping in the active era: the stream is
    /// desynchronized and nothing after this point can be trusted.
    UnknownAttribute { thing_id: u32, raw_id: u8 },
    /// An attribute value whose shape does not match its payload.
    InvalidPayload { thing_id: u32, attr: ThingAttr },
    /// A sprite id too large for the u16 slots of the target era.
    SpriteIdOverflow { thing_id: u32, sprite_id: u32 },
    Io(io::Error),
}

impl From<io::Error> for ThingError {
    fn from(err: io::Error) -> Self {
        ThingError::Io(err)
    }
}

impl From<ContainerError> for ThingError {
    fn from(err: ContainerError) -> Self {
        ThingError::Container(err)
    }
}

impl fmt::Display for ThingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThingError::Container(err) => write!(f, "Container error: {}", err),
            ThingError::UnknownAttribute { thing_id, raw_id } => write!(
                f,
                "Thing {}: unknown attribute id {} for this format version",
                thing_id, raw_id
            ),
            ThingError::InvalidPayload { thing_id, attr } => write!(
                f,
                "Thing {}: attribute {:?} carries a mismatched payload",
                thing_id, attr
            ),
            ThingError::SpriteIdOverflow { thing_id, sprite_id } => write!(
                f,
                "Thing {}: sprite id {} does not fit the u16 slots of this format version",
                thing_id, sprite_id
            ),
            ThingError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ThingError {}

/// What to do with the tagged-header feature byte when compiling a model
/// that was not edited at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderPolicy {
    /// Recompute the byte from the era (extended ids, transparency, frame
    /// groups, frame durations). Default; keeps stale headers honest.
    #[default]
    PatchFeatureFlags,
    /// Return the input fully untouched.
    Preserve,
}

/// Parses an object definition file using the built-in version table.
pub fn parse_object_definitions(buffer: &[u8]) -> Result<ObjectModel, ThingError> {
    parse_object_definitions_with(buffer, &VersionTable::builtin())
}

pub fn parse_object_definitions_with(
    buffer: &[u8],
    table: &VersionTable,
) -> Result<ObjectModel, ThingError> {
    let header = containers::detect(buffer, AssetKind::ObjectDefinitions, table)?;
    let era = Era::from_version(header.content_version);

    let mut cursor = Cursor::new(buffer);
    seek_to(&mut cursor, header.payload_offset as u64)?;

    let counts = [
        read_u16_le(&mut cursor)?,
        read_u16_le(&mut cursor)?,
        read_u16_le(&mut cursor)?,
        read_u16_le(&mut cursor)?,
    ];

    let mut things = BTreeMap::new();
    let mut id = MIN_THING_ID;
    for (category, count) in ThingCategory::ALL.into_iter().zip(counts) {
        for _ in 0..count {
            let start = cursor.position() as usize;
            let record_flags = flags::decode_flags(&mut cursor, era, id)?;
            let frame_groups = decode_frame_groups(&mut cursor, era, category, id)?;
            let end = cursor.position() as usize;
            things.insert(
                id,
                ThingRecord::from_parse(
                    id,
                    category,
                    record_flags,
                    frame_groups,
                    buffer[start..end].to_vec(),
                ),
            );
            id += 1;
        }
    }

    Ok(ObjectModel::from_parse(
        era,
        header,
        counts,
        things,
        buffer.to_vec(),
    ))
}

fn decode_frame_groups(
    cursor: &mut Cursor<&[u8]>,
    era: Era,
    category: ThingCategory,
    thing_id: u32,
) -> Result<Vec<FrameGroup>, ThingError> {
    let mut groups = Vec::new();
    if category == ThingCategory::Outfit && era.frame_groups {
        let count = read_u8(cursor)?;
        for _ in 0..count {
            let group_type = read_u8(cursor)?;
            groups.push(decode_frame_group(cursor, era, group_type, thing_id)?);
        }
    } else {
        groups.push(decode_frame_group(cursor, era, 0, thing_id)?);
    }
    Ok(groups)
}

fn decode_frame_group(
    cursor: &mut Cursor<&[u8]>,
    era: Era,
    group_type: u8,
    _thing_id: u32,
) -> Result<FrameGroup, ThingError> {
    let width = read_u8(cursor)?;
    let height = read_u8(cursor)?;
    if width > 1 || height > 1 {
        // Exact render size hint; recomputed on write.
        read_u8(cursor)?;
    }
    let layers = read_u8(cursor)?;
    let pattern_x = read_u8(cursor)?;
    let pattern_y = read_u8(cursor)?;
    let pattern_z = if era.pattern_z { read_u8(cursor)? } else { 1 };
    let frames = read_u8(cursor)?;

    let animation = if frames > 1 && era.frame_durations {
        let asynchronous = read_u8(cursor)? != 0;
        let loop_count = read_u32_le(cursor)?;
        let start_frame = read_i8(cursor)?;
        let mut durations = Vec::with_capacity(frames as usize);
        for _ in 0..frames {
            durations.push(FrameDuration {
                minimum: read_u32_le(cursor)?,
                maximum: read_u32_le(cursor)?,
            });
        }
        Some(Animation {
            asynchronous,
            loop_count,
            start_frame,
            durations,
        })
    } else {
        None
    };

    let mut group = FrameGroup {
        group_type,
        width,
        height,
        layers,
        pattern_x,
        pattern_y,
        pattern_z,
        frames,
        animation,
        sprites: Vec::new(),
    };

    let slots = group.sprite_count();
    // No preallocation by slot count: a corrupt geometry byte would ask for
    // gigabytes before the reads below could fail on the real buffer end.
    for _ in 0..slots {
        let sprite_id = if era.extended_sprites {
            read_u32_le(cursor)?
        } else {
            read_u16_le(cursor)? as u32
        };
        group.sprites.push(sprite_id);
    }
    Ok(group)
}

/// Compiles `model` back into file bytes.
///
/// When the model is pristine (parsed and never touched) the original buffer
/// is returned as-is, except that `HeaderPolicy::PatchFeatureFlags` rewrites
/// the tagged-header feature byte from the era. Otherwise the stream is
/// rebuilt record by record, copying the captured bytes of untouched records
/// verbatim and re-encoding only what changed.
pub fn compile_object_definitions(
    model: &ObjectModel,
    policy: HeaderPolicy,
) -> Result<Vec<u8>, ThingError> {
    let features = match policy {
        HeaderPolicy::PatchFeatureFlags => {
            model.era.feature_bits(model.header.transparency())
        }
        HeaderPolicy::Preserve => model.header.features,
    };

    if model.is_pristine() {
        if let Some(source) = model.source() {
            let mut out = source.to_vec();
            if model.header.style == HeaderStyle::Tagged
                && policy == HeaderPolicy::PatchFeatureFlags
            {
                out[FEATURE_FLAGS_OFFSET] = features;
            }
            return Ok(out);
        }
    }

    let mut writer = ByteWriter::with_capacity(
        model.source().map(|s| s.len()).unwrap_or(64),
    );
    let mut header = model.header.clone();
    header.features = features;
    containers::write_header(&mut writer, &header);

    for category in ThingCategory::ALL {
        writer.write_u16_le(model.count(category));
    }

    for category in ThingCategory::ALL {
        for id in model.id_range(category) {
            match model.get(id) {
                Some(record) => match record.cached_bytes() {
                    Some(raw) => writer.write_bytes(raw),
                    None => encode_record(&mut writer, record, model.era)?,
                },
                None => write_placeholder(&mut writer, category, model.era),
            }
        }
    }

    Ok(writer.into_inner())
}

fn encode_record(
    writer: &mut ByteWriter,
    record: &ThingRecord,
    era: Era,
) -> Result<(), ThingError> {
    flags::encode_flags(writer, record.flags(), era, record.id())?;

    let groups = record.frame_groups();
    if record.category() == ThingCategory::Outfit && era.frame_groups {
        writer.write_u8(groups.len() as u8);
        for group in groups {
            writer.write_u8(group.group_type);
            encode_frame_group(writer, group, era, record.id())?;
        }
    } else {
        // Single-group categories keep only the primary group; extra groups
        // exist solely in frame-group eras.
        match groups.first() {
            Some(group) => encode_frame_group(writer, group, era, record.id())?,
            None => write_placeholder_group(writer, era),
        }
    }
    Ok(())
}

fn encode_frame_group(
    writer: &mut ByteWriter,
    group: &FrameGroup,
    era: Era,
    thing_id: u32,
) -> Result<(), ThingError> {
    writer.write_u8(group.width);
    writer.write_u8(group.height);
    if group.width > 1 || group.height > 1 {
        let exact_size = 32u32 * u32::from(group.width.max(group.height));
        writer.write_u8(exact_size.min(255) as u8);
    }
    writer.write_u8(group.layers);
    writer.write_u8(group.pattern_x);
    writer.write_u8(group.pattern_y);
    if era.pattern_z {
        writer.write_u8(group.pattern_z);
    }
    writer.write_u8(group.frames);

    if group.frames > 1 && era.frame_durations {
        let default_animation;
        let animation = match &group.animation {
            Some(animation) => animation,
            None => {
                default_animation = Animation::with_frames(group.frames);
                &default_animation
            }
        };
        writer.write_u8(animation.asynchronous as u8);
        writer.write_u32_le(animation.loop_count);
        writer.write_i8(animation.start_frame);
        for frame in 0..group.frames as usize {
            let duration = animation
                .durations
                .get(frame)
                .copied()
                .unwrap_or_default();
            writer.write_u32_le(duration.minimum);
            writer.write_u32_le(duration.maximum);
        }
    }

    for slot in 0..group.sprite_count() {
        let sprite_id = group.sprites.get(slot).copied().unwrap_or(0);
        if era.extended_sprites {
            writer.write_u32_le(sprite_id);
        } else {
            if sprite_id > u16::MAX as u32 {
                return Err(ThingError::SpriteIdOverflow {
                    thing_id,
                    sprite_id,
                });
            }
            writer.write_u16_le(sprite_id as u16);
        }
    }
    Ok(())
}

/// Minimal well-formed record for an id with no backing entry: an empty flag
/// stream and a single blank 1x1 frame group.
fn write_placeholder(writer: &mut ByteWriter, category: ThingCategory, era: Era) {
    writer.write_u8(flags::LAST_FLAG);
    if category == ThingCategory::Outfit && era.frame_groups {
        writer.write_u8(1); // group count
        writer.write_u8(0); // group type
    }
    write_placeholder_group(writer, era);
}

fn write_placeholder_group(writer: &mut ByteWriter, era: Era) {
    writer.write_u8(1); // width
    writer.write_u8(1); // height
    writer.write_u8(1); // layers
    writer.write_u8(1); // pattern x
    writer.write_u8(1); // pattern y
    if era.pattern_z {
        writer.write_u8(1);
    }
    writer.write_u8(1); // frames
    if era.extended_sprites {
        writer.write_u32_le(0);
    } else {
        writer.write_u16_le(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::things::FlagValue;

    /// 7.10 object file: one item (id 100) with ground speed 150 and a
    /// 1x1x1x1x1x1x1 frame group holding sprite id 5.
    fn legacy_scenario_buffer() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x3D0D_6F34u32.to_le_bytes()); // 7.10 signature
        buf.extend_from_slice(&1u16.to_le_bytes()); // items
        buf.extend_from_slice(&0u16.to_le_bytes()); // outfits
        buf.extend_from_slice(&0u16.to_le_bytes()); // effects
        buf.extend_from_slice(&0u16.to_le_bytes()); // distance effects
        buf.push(0); // ground attribute
        buf.extend_from_slice(&150u16.to_le_bytes()); // speed
        buf.push(0xFF); // flag terminator
        buf.extend_from_slice(&[1, 1, 1, 1, 1, 1]); // w h layers px py frames
        buf.extend_from_slice(&5u16.to_le_bytes()); // sprite id
        buf
    }

    #[test]
    fn pristine_legacy_round_trip_is_byte_exact() {
        let buf = legacy_scenario_buffer();
        let model = parse_object_definitions(&buf).unwrap();
        assert_eq!(model.era.version, 710);
        assert_eq!(model.count(ThingCategory::Item), 1);

        let out = compile_object_definitions(&model, HeaderPolicy::PatchFeatureFlags).unwrap();
        // Legacy headers carry no feature byte; the file must be identical.
        assert_eq!(out, buf);
    }

    #[test]
    fn dirty_record_preserves_semantics() {
        let buf = legacy_scenario_buffer();
        let mut model = parse_object_definitions(&buf).unwrap();
        model.get_mut(100).unwrap().mark_modified();

        let out = compile_object_definitions(&model, HeaderPolicy::PatchFeatureFlags).unwrap();
        let reparsed = parse_object_definitions(&out).unwrap();
        let record = reparsed.get(100).unwrap();
        assert_eq!(record.flags().quantity(ThingAttr::Ground), Some(150));
        assert_eq!(record.frame_groups()[0].sprites, vec![5]);
    }

    #[test]
    fn parsed_record_exposes_flags_and_geometry() {
        let buf = legacy_scenario_buffer();
        let model = parse_object_definitions(&buf).unwrap();
        let record = model.get(100).unwrap();
        assert_eq!(record.category(), ThingCategory::Item);
        assert_eq!(
            record.flags().get(ThingAttr::Ground),
            Some(&FlagValue::Quantity(150))
        );
        let group = &record.frame_groups()[0];
        assert_eq!(group.sprite_count(), 1);
        assert!(record.cached_bytes().is_some());
    }

    fn tagged_modern_buffer() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&containers::TAGGED_MAGIC);
        buf.push(AssetKind::ObjectDefinitions.as_byte());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&1098u32.to_le_bytes());
        buf.push(0); // stale feature byte, recomputed on compile
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(&0u16.to_le_bytes()); // items
        buf.extend_from_slice(&1u16.to_le_bytes()); // outfits
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        // Outfit 100: no flags, one frame group with two animation frames.
        buf.push(0xFF);
        buf.push(1); // group count
        buf.push(0); // group type
        buf.extend_from_slice(&[1, 1, 1, 1, 1, 1]); // w h layers px py pz
        buf.push(2); // frames
        buf.push(1); // asynchronous
        buf.extend_from_slice(&0u32.to_le_bytes()); // loop count
        buf.push(0); // start frame
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&200u32.to_le_bytes());
        buf.extend_from_slice(&300u32.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes()); // sprite ids (u32)
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf
    }

    #[test]
    fn tagged_fast_path_patches_only_the_feature_byte() {
        let buf = tagged_modern_buffer();
        let model = parse_object_definitions(&buf).unwrap();

        let out = compile_object_definitions(&model, HeaderPolicy::PatchFeatureFlags).unwrap();
        assert_ne!(out, buf);
        let expected_features = containers::features::EXTENDED
            | containers::features::FRAME_GROUPS
            | containers::features::FRAME_DURATIONS;
        assert_eq!(out[FEATURE_FLAGS_OFFSET], expected_features);
        // Everything but that byte is identical.
        let mut patched = buf.clone();
        patched[FEATURE_FLAGS_OFFSET] = expected_features;
        assert_eq!(out, patched);

        let preserved = compile_object_definitions(&model, HeaderPolicy::Preserve).unwrap();
        assert_eq!(preserved, buf);
    }

    #[test]
    fn outfit_frame_groups_round_trip_through_the_slow_path() {
        let buf = tagged_modern_buffer();
        let mut model = parse_object_definitions(&buf).unwrap();
        model.get_mut(100).unwrap().mark_modified();

        let out = compile_object_definitions(&model, HeaderPolicy::Preserve).unwrap();
        let reparsed = parse_object_definitions(&out).unwrap();
        let group = &reparsed.get(100).unwrap().frame_groups()[0];
        assert_eq!(group.frames, 2);
        assert_eq!(group.sprites, vec![7, 8]);
        let animation = group.animation.as_ref().unwrap();
        assert!(animation.asynchronous);
        assert_eq!(animation.durations[1].maximum, 300);
    }

    #[test]
    fn missing_record_compiles_to_a_placeholder() {
        let buf = legacy_scenario_buffer();
        let model = parse_object_definitions(&buf).unwrap();
        // Rebuild the model with the record dropped but the count kept.
        let sparse = ObjectModel::from_parse(
            model.era,
            model.header.clone(),
            [1, 0, 0, 0],
            BTreeMap::new(),
            buf.clone(),
        );
        // A missing record forces the slow path despite the retained source.
        assert!(!sparse.is_pristine());

        let out = compile_object_definitions(&sparse, HeaderPolicy::Preserve).unwrap();
        let reparsed = parse_object_definitions(&out).unwrap();
        let record = reparsed.get(100).unwrap();
        assert!(record.flags().is_empty());
        assert_eq!(record.frame_groups()[0].sprites, vec![0]);
    }

    #[test]
    fn sprite_id_overflow_is_rejected_on_u16_eras() {
        let era = Era::from_version(710);
        let mut record = ThingRecord::new(100, ThingCategory::Item);
        record.frame_groups_mut()[0].sprites = vec![0x1_0000];
        let mut writer = ByteWriter::new();
        let err = encode_record(&mut writer, &record, era).unwrap_err();
        assert!(matches!(err, ThingError::SpriteIdOverflow { .. }));
    }

    #[test]
    fn truncated_buffer_is_unexpected_eof() {
        let mut buf = legacy_scenario_buffer();
        buf.truncate(buf.len() - 3);
        let err = parse_object_definitions(&buf).unwrap_err();
        match err {
            ThingError::Io(io_err) => {
                assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected Io(UnexpectedEof), got {:?}", other),
        }
    }

    #[test]
    fn flag_stream_with_unmapped_id_fails_with_thing_context() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x3D0D_6F34u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&[0u8; 6]); // empty outfit/effect/distance counts
        buf.push(200); // unmapped attribute id
        let err = parse_object_definitions(&buf).unwrap_err();
        assert!(matches!(
            err,
            ThingError::UnknownAttribute {
                thing_id: 100,
                raw_id: 200
            }
        ));
    }
}
