//! Attribute-flag stream codec.
//!
//! On disk every thing starts with a sequence of (attribute id, payload)
//! pairs closed by the terminator byte 255. Which byte means which attribute
//! changed several times over the client's history; [`ATTR_TABLE`] is the one
//! declarative description of those mappings, and both the decoder and the
//! encoder are driven from it. There are no hand-written per-direction
//! branches here on purpose: the historical source of corrupt files was the
//! two directions drifting apart.

use std::io::Cursor;

use crate::binary_utils::{read_string, read_u16_le, read_u8, ByteWriter};
use crate::data::things::{FlagValue, MarketInfo, ThingAttr, ThingFlags};
use crate::formats::things::ThingError;
use crate::formats::{Era, FlagScheme};

/// Terminator byte closing every attribute stream.
pub const LAST_FLAG: u8 = 0xFF;

/// Payload shape following an attribute id on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadShape {
    None,
    /// One u16: speed, text length, height, color, slot, action id.
    Quantity,
    /// Light intensity and color, u16 each.
    Light,
    /// Drawing offset x/y, u16 each; eras without the payload default to 8/8.
    Displacement,
    /// Market listing: three u16, a string, two more u16.
    Market,
}

/// One row of the declarative table: a canonical attribute, its payload
/// shape, and its disk id under each flag scheme (`None` = the scheme can
/// not represent the attribute).
struct AttrDef {
    attr: ThingAttr,
    payload: PayloadShape,
    /// Disk ids indexed as [Pre740, V740, V755, V1000].
    disk: [Option<u8>; 4],
}

const fn def(
    attr: ThingAttr,
    payload: PayloadShape,
    disk: [Option<u8>; 4],
) -> AttrDef {
    AttrDef {
        attr,
        payload,
        disk,
    }
}

/// Canonical attributes and their disk ids per scheme.
///
/// Pre740 and V755 are the identity except where noted. V740 shifts 1..=15 up
/// by one (with force-use/multi-use swapped) and maps 16..=27 through a fixed
/// table. V1000 inserts no-move-animation at 16 and shifts everything from 16
/// upward by one; chargeable has no V1000 id because the shifted value would
/// collide with the terminator.
#[rustfmt::skip]
const ATTR_TABLE: &[AttrDef] = &[
    def(ThingAttr::Ground,          PayloadShape::Quantity,     [Some(0),   Some(0),   Some(0),   Some(0)]),
    def(ThingAttr::GroundBorder,    PayloadShape::None,         [Some(1),   None,      Some(1),   Some(1)]),
    def(ThingAttr::OnBottom,        PayloadShape::None,         [Some(2),   Some(1),   Some(2),   Some(2)]),
    def(ThingAttr::OnTop,           PayloadShape::None,         [Some(3),   Some(2),   Some(3),   Some(3)]),
    def(ThingAttr::Container,       PayloadShape::None,         [Some(4),   Some(3),   Some(4),   Some(4)]),
    def(ThingAttr::Stackable,       PayloadShape::None,         [Some(5),   Some(4),   Some(5),   Some(5)]),
    def(ThingAttr::ForceUse,        PayloadShape::None,         [Some(6),   Some(6),   Some(6),   Some(6)]),
    def(ThingAttr::MultiUse,        PayloadShape::None,         [Some(7),   Some(5),   Some(7),   Some(7)]),
    def(ThingAttr::Writable,        PayloadShape::Quantity,     [Some(8),   Some(7),   Some(8),   Some(8)]),
    def(ThingAttr::WritableOnce,    PayloadShape::Quantity,     [Some(9),   Some(8),   Some(9),   Some(9)]),
    def(ThingAttr::FluidContainer,  PayloadShape::None,         [Some(10),  Some(9),   Some(10),  Some(10)]),
    def(ThingAttr::Splash,          PayloadShape::None,         [Some(11),  Some(10),  Some(11),  Some(11)]),
    def(ThingAttr::Unpassable,      PayloadShape::None,         [Some(12),  Some(11),  Some(12),  Some(12)]),
    def(ThingAttr::Unmovable,       PayloadShape::None,         [Some(13),  Some(12),  Some(13),  Some(13)]),
    def(ThingAttr::BlockMissile,    PayloadShape::None,         [Some(14),  Some(13),  Some(14),  Some(14)]),
    def(ThingAttr::BlockPathfind,   PayloadShape::None,         [Some(15),  Some(14),  Some(15),  Some(15)]),
    def(ThingAttr::Pickupable,      PayloadShape::None,         [Some(16),  Some(15),  Some(16),  Some(17)]),
    def(ThingAttr::Hangable,        PayloadShape::None,         [Some(17),  Some(24),  Some(17),  Some(18)]),
    def(ThingAttr::HookSouth,       PayloadShape::None,         [Some(18),  Some(25),  Some(18),  Some(19)]),
    def(ThingAttr::HookEast,        PayloadShape::None,         [Some(19),  Some(26),  Some(19),  Some(20)]),
    def(ThingAttr::Rotateable,      PayloadShape::None,         [Some(20),  Some(22),  Some(20),  Some(21)]),
    def(ThingAttr::Light,           PayloadShape::Light,        [Some(21),  Some(16),  Some(21),  Some(22)]),
    def(ThingAttr::DontHide,        PayloadShape::None,         [Some(22),  None,      Some(22),  Some(23)]),
    def(ThingAttr::Translucent,     PayloadShape::None,         [Some(23),  None,      None,      Some(24)]),
    def(ThingAttr::Displacement,    PayloadShape::Displacement, [Some(24),  Some(20),  Some(24),  Some(25)]),
    def(ThingAttr::Elevation,       PayloadShape::Quantity,     [Some(25),  Some(19),  Some(25),  Some(26)]),
    def(ThingAttr::LyingObject,     PayloadShape::None,         [Some(26),  Some(23),  Some(26),  Some(27)]),
    def(ThingAttr::AnimateAlways,   PayloadShape::None,         [Some(27),  Some(27),  Some(27),  Some(28)]),
    def(ThingAttr::MinimapColor,    PayloadShape::Quantity,     [Some(28),  Some(21),  Some(28),  Some(29)]),
    def(ThingAttr::LensHelp,        PayloadShape::Quantity,     [Some(29),  None,      Some(29),  Some(30)]),
    def(ThingAttr::FullGround,      PayloadShape::None,         [Some(30),  Some(18),  Some(30),  Some(31)]),
    def(ThingAttr::IgnoreLook,      PayloadShape::None,         [Some(31),  None,      Some(31),  Some(32)]),
    def(ThingAttr::Cloth,           PayloadShape::Quantity,     [Some(32),  None,      Some(32),  Some(33)]),
    def(ThingAttr::Market,          PayloadShape::Market,       [Some(33),  None,      Some(33),  Some(34)]),
    def(ThingAttr::Usable,          PayloadShape::Quantity,     [Some(34),  None,      Some(34),  Some(35)]),
    def(ThingAttr::Wrappable,       PayloadShape::None,         [Some(35),  None,      Some(35),  Some(36)]),
    def(ThingAttr::Unwrappable,     PayloadShape::None,         [Some(36),  None,      Some(36),  Some(37)]),
    def(ThingAttr::TopEffect,       PayloadShape::None,         [Some(37),  None,      Some(37),  Some(38)]),
    def(ThingAttr::FloorChange,     PayloadShape::None,         [None,      Some(17),  Some(23),  None]),
    def(ThingAttr::NoMoveAnimation, PayloadShape::None,         [None,      None,      None,      Some(16)]),
    def(ThingAttr::Chargeable,      PayloadShape::None,         [Some(254), Some(254), Some(254), None]),
];

fn scheme_slot(scheme: FlagScheme) -> usize {
    match scheme {
        FlagScheme::Pre740 => 0,
        FlagScheme::V740 => 1,
        FlagScheme::V755 => 2,
        FlagScheme::V1000 => 3,
    }
}

fn attr_for_disk_id(scheme: FlagScheme, disk_id: u8) -> Option<&'static AttrDef> {
    let slot = scheme_slot(scheme);
    ATTR_TABLE.iter().find(|d| d.disk[slot] == Some(disk_id))
}

fn disk_id_for_attr(scheme: FlagScheme, attr: ThingAttr) -> Option<u8> {
    let slot = scheme_slot(scheme);
    ATTR_TABLE
        .iter()
        .find(|d| d.attr == attr)
        .and_then(|d| d.disk[slot])
}

fn payload_shape(attr: ThingAttr) -> PayloadShape {
    ATTR_TABLE
        .iter()
        .find(|d| d.attr == attr)
        .map(|d| d.payload)
        .unwrap_or(PayloadShape::None)
}

/// Decodes one attribute stream up to and including the terminator.
///
/// `thing_id` is only used for error reporting; an unknown disk id is fatal
/// because the stream carries no lengths and desynchronizes immediately.
pub fn decode_flags(
    cursor: &mut Cursor<&[u8]>,
    era: Era,
    thing_id: u32,
) -> Result<ThingFlags, ThingError> {
    let mut flags = ThingFlags::new();
    loop {
        let disk_id = read_u8(cursor)?;
        if disk_id == LAST_FLAG {
            break;
        }
        let definition = attr_for_disk_id(era.scheme, disk_id).ok_or(
            ThingError::UnknownAttribute {
                thing_id,
                raw_id: disk_id,
            },
        )?;
        let value = read_payload(cursor, definition.payload, era)?;
        flags.insert(definition.attr, value);
    }
    Ok(flags)
}

fn read_payload(
    cursor: &mut Cursor<&[u8]>,
    shape: PayloadShape,
    era: Era,
) -> Result<FlagValue, ThingError> {
    let value = match shape {
        PayloadShape::None => FlagValue::Set,
        PayloadShape::Quantity => FlagValue::Quantity(read_u16_le(cursor)?),
        PayloadShape::Light => FlagValue::Light {
            intensity: read_u16_le(cursor)?,
            color: read_u16_le(cursor)?,
        },
        PayloadShape::Displacement => {
            if era.displacement_payload() {
                FlagValue::Displacement {
                    x: read_u16_le(cursor)?,
                    y: read_u16_le(cursor)?,
                }
            } else {
                FlagValue::Displacement { x: 8, y: 8 }
            }
        }
        PayloadShape::Market => {
            let category = read_u16_le(cursor)?;
            let trade_as = read_u16_le(cursor)?;
            let show_as = read_u16_le(cursor)?;
            let name = read_string(cursor)?;
            let restrict_vocation = read_u16_le(cursor)?;
            let required_level = read_u16_le(cursor)?;
            FlagValue::Market(MarketInfo {
                category,
                trade_as,
                show_as,
                name,
                restrict_vocation,
                required_level,
            })
        }
    };
    Ok(value)
}

/// Encodes an attribute bag, terminator included, in ascending canonical
/// order. Attributes the era can not represent are dropped; this is how
/// saving to an older format sheds the newer flags.
pub fn encode_flags(
    writer: &mut ByteWriter,
    flags: &ThingFlags,
    era: Era,
    thing_id: u32,
) -> Result<(), ThingError> {
    for (attr, value) in flags.iter() {
        let disk_id = match disk_id_for_attr(era.scheme, attr) {
            Some(id) => id,
            None => continue,
        };
        writer.write_u8(disk_id);
        write_payload(writer, payload_shape(attr), value, era, thing_id, attr)?;
    }
    writer.write_u8(LAST_FLAG);
    Ok(())
}

fn write_payload(
    writer: &mut ByteWriter,
    shape: PayloadShape,
    value: &FlagValue,
    era: Era,
    thing_id: u32,
    attr: ThingAttr,
) -> Result<(), ThingError> {
    match (shape, value) {
        (PayloadShape::None, FlagValue::Set) => {}
        (PayloadShape::Quantity, FlagValue::Quantity(quantity)) => {
            writer.write_u16_le(*quantity);
        }
        (PayloadShape::Light, FlagValue::Light { intensity, color }) => {
            writer.write_u16_le(*intensity);
            writer.write_u16_le(*color);
        }
        (PayloadShape::Displacement, FlagValue::Displacement { x, y }) => {
            if era.displacement_payload() {
                writer.write_u16_le(*x);
                writer.write_u16_le(*y);
            }
        }
        (PayloadShape::Market, FlagValue::Market(market)) => {
            writer.write_u16_le(market.category);
            writer.write_u16_le(market.trade_as);
            writer.write_u16_le(market.show_as);
            writer.write_string(&market.name)?;
            writer.write_u16_le(market.restrict_vocation);
            writer.write_u16_le(market.required_level);
        }
        _ => {
            return Err(ThingError::InvalidPayload { thing_id, attr });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn round_trip(flags: &ThingFlags, era: Era) -> ThingFlags {
        let mut writer = ByteWriter::new();
        encode_flags(&mut writer, flags, era, 100).unwrap();
        let bytes = writer.into_inner();
        let mut cursor = Cursor::new(&bytes[..]);
        let decoded = decode_flags(&mut cursor, era, 100).unwrap();
        assert_eq!(cursor.position() as usize, bytes.len());
        decoded
    }

    fn representable(flags: &ThingFlags, era: Era) -> ThingFlags {
        let mut kept = ThingFlags::new();
        for (attr, value) in flags.iter() {
            if disk_id_for_attr(era.scheme, attr).is_none() {
                continue;
            }
            // Eras without a displacement payload decode to the fixed offset.
            if attr == ThingAttr::Displacement && !era.displacement_payload() {
                kept.insert(attr, FlagValue::Displacement { x: 8, y: 8 });
            } else {
                kept.insert(attr, value.clone());
            }
        }
        kept
    }

    fn full_bag() -> ThingFlags {
        let mut flags = ThingFlags::new();
        for definition in ATTR_TABLE {
            let value = match definition.payload {
                PayloadShape::None => FlagValue::Set,
                PayloadShape::Quantity => FlagValue::Quantity(150),
                PayloadShape::Light => FlagValue::Light {
                    intensity: 7,
                    color: 215,
                },
                PayloadShape::Displacement => FlagValue::Displacement { x: 8, y: 16 },
                PayloadShape::Market => FlagValue::Market(MarketInfo {
                    category: 4,
                    trade_as: 3500,
                    show_as: 3500,
                    name: String::from("crystal coin"),
                    restrict_vocation: 0,
                    required_level: 0,
                }),
            };
            flags.insert(definition.attr, value);
        }
        flags
    }

    #[test]
    fn disk_ids_are_unique_within_every_scheme() {
        for scheme in [
            FlagScheme::Pre740,
            FlagScheme::V740,
            FlagScheme::V755,
            FlagScheme::V1000,
        ] {
            let slot = scheme_slot(scheme);
            let mut seen: HashMap<u8, ThingAttr> = HashMap::new();
            for definition in ATTR_TABLE {
                if let Some(disk_id) = definition.disk[slot] {
                    assert_ne!(disk_id, LAST_FLAG, "{:?} uses the terminator", scheme);
                    if let Some(previous) = seen.insert(disk_id, definition.attr) {
                        panic!(
                            "{:?}: disk id {} claimed by {:?} and {:?}",
                            scheme, disk_id, previous, definition.attr
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn every_era_round_trips_its_representable_attributes() {
        for version in [710, 740, 755, 860, 1010, 1098] {
            let era = Era::from_version(version);
            let bag = representable(&full_bag(), era);
            assert_eq!(round_trip(&bag, era), bag, "era {}", version);
        }
    }

    #[test]
    fn v1000_shift_matches_the_documented_mapping() {
        let era = Era::from_version(1010);
        let mut flags = ThingFlags::new();
        flags.set(ThingAttr::NoMoveAnimation);
        flags.insert(ThingAttr::Usable, FlagValue::Quantity(1));

        let mut writer = ByteWriter::new();
        encode_flags(&mut writer, &flags, era, 100).unwrap();
        // Canonical order: usable (34) first on disk id 35, then
        // no-move-animation (253) on disk id 16.
        assert_eq!(writer.into_inner(), vec![35, 1, 0, 16, LAST_FLAG]);
    }

    #[test]
    fn v740_table_matches_the_documented_mapping() {
        let era = Era::from_version(740);
        // disk 5 means multi-use, disk 6 force-use (swapped relative to +1).
        let bytes = [5u8, 6, 16, 3, 0, 215, 0, 17, LAST_FLAG];
        let mut cursor = Cursor::new(&bytes[..]);
        let decoded = decode_flags(&mut cursor, era, 100).unwrap();
        assert!(decoded.contains(ThingAttr::MultiUse));
        assert!(decoded.contains(ThingAttr::ForceUse));
        assert!(decoded.contains(ThingAttr::FloorChange));
        assert_eq!(
            decoded.get(ThingAttr::Light),
            Some(&FlagValue::Light {
                intensity: 3,
                color: 215
            })
        );
    }

    #[test]
    fn v755_reads_disk_23_as_floor_change() {
        let era = Era::from_version(860);
        let bytes = [23u8, LAST_FLAG];
        let mut cursor = Cursor::new(&bytes[..]);
        let decoded = decode_flags(&mut cursor, era, 100).unwrap();
        assert!(decoded.contains(ThingAttr::FloorChange));
        assert!(!decoded.contains(ThingAttr::Translucent));
    }

    #[test]
    fn displacement_payload_is_era_gated() {
        let old = Era::from_version(710);
        let bytes = [24u8, LAST_FLAG];
        let mut cursor = Cursor::new(&bytes[..]);
        let decoded = decode_flags(&mut cursor, old, 100).unwrap();
        assert_eq!(
            decoded.get(ThingAttr::Displacement),
            Some(&FlagValue::Displacement { x: 8, y: 8 })
        );

        let modern = Era::from_version(860);
        let bytes = [24u8, 12, 0, 14, 0, LAST_FLAG];
        let mut cursor = Cursor::new(&bytes[..]);
        let decoded = decode_flags(&mut cursor, modern, 100).unwrap();
        assert_eq!(
            decoded.get(ThingAttr::Displacement),
            Some(&FlagValue::Displacement { x: 12, y: 14 })
        );
    }

    #[test]
    fn unknown_disk_id_is_fatal() {
        let era = Era::from_version(1098);
        // 250 is unassigned under every scheme.
        let bytes = [250u8, LAST_FLAG];
        let mut cursor = Cursor::new(&bytes[..]);
        let err = decode_flags(&mut cursor, era, 123).unwrap_err();
        match err {
            ThingError::UnknownAttribute { thing_id, raw_id } => {
                assert_eq!(thing_id, 123);
                assert_eq!(raw_id, 250);
            }
            other => panic!("expected UnknownAttribute, got {:?}", other),
        }
    }

    #[test]
    fn down_conversion_drops_unrepresentable_attributes() {
        let era = Era::from_version(740);
        let mut flags = ThingFlags::new();
        flags.insert(ThingAttr::Market, FlagValue::Market(MarketInfo::default()));
        flags.set(ThingAttr::Stackable);

        let mut writer = ByteWriter::new();
        encode_flags(&mut writer, &flags, era, 100).unwrap();
        // Market has no 7.40 representation; only stackable (disk 4) remains.
        assert_eq!(writer.into_inner(), vec![4, LAST_FLAG]);
    }

    #[test]
    fn payload_mismatch_is_rejected() {
        let era = Era::from_version(860);
        let mut flags = ThingFlags::new();
        flags.insert(ThingAttr::Ground, FlagValue::Set);
        let mut writer = ByteWriter::new();
        let err = encode_flags(&mut writer, &flags, era, 100).unwrap_err();
        assert!(matches!(err, ThingError::InvalidPayload { .. }));
    }
}
