//! In-memory model of the object definition file.
//!
//! A "thing" is one item/outfit/effect/distance-effect definition. Things are
//! addressed by a dense internal id space starting at [`MIN_THING_ID`],
//! partitioned by category: items first, then outfits, effects and distance
//! effects, each range following the previous one with no gaps.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::containers::ContainerHeader;
use crate::formats::Era;

/// First internal id; ids below this are reserved by the client.
pub const MIN_THING_ID: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThingCategory {
    Item,
    Outfit,
    Effect,
    Distance,
}

impl ThingCategory {
    pub const ALL: [ThingCategory; 4] = [
        ThingCategory::Item,
        ThingCategory::Outfit,
        ThingCategory::Effect,
        ThingCategory::Distance,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ThingCategory::Item => "item",
            ThingCategory::Outfit => "outfit",
            ThingCategory::Effect => "effect",
            ThingCategory::Distance => "distance effect",
        }
    }
}

/// Canonical attribute ids.
///
/// The discriminants are the on-disk ids of the classic era; other eras remap
/// on the way in and out (see `formats::flags`). 252..=254 sit outside the
/// dense range so they can never collide with a shifted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ThingAttr {
    Ground = 0,
    GroundBorder = 1,
    OnBottom = 2,
    OnTop = 3,
    Container = 4,
    Stackable = 5,
    ForceUse = 6,
    MultiUse = 7,
    Writable = 8,
    WritableOnce = 9,
    FluidContainer = 10,
    Splash = 11,
    Unpassable = 12,
    Unmovable = 13,
    BlockMissile = 14,
    BlockPathfind = 15,
    Pickupable = 16,
    Hangable = 17,
    HookSouth = 18,
    HookEast = 19,
    Rotateable = 20,
    Light = 21,
    DontHide = 22,
    Translucent = 23,
    Displacement = 24,
    Elevation = 25,
    LyingObject = 26,
    AnimateAlways = 27,
    MinimapColor = 28,
    LensHelp = 29,
    FullGround = 30,
    IgnoreLook = 31,
    Cloth = 32,
    Market = 33,
    Usable = 34,
    Wrappable = 35,
    Unwrappable = 36,
    TopEffect = 37,
    FloorChange = 252,
    NoMoveAnimation = 253,
    Chargeable = 254,
}

/// Market listing details carried by the market attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketInfo {
    pub category: u16,
    pub trade_as: u16,
    pub show_as: u16,
    pub name: String,
    pub restrict_vocation: u16,
    pub required_level: u16,
}

/// Typed payload of one attribute flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Plain boolean flag with no payload.
    Set,
    /// Single u16 payload: ground speed, writable length, elevation height,
    /// minimap color, lens help id, cloth slot or default action.
    Quantity(u16),
    Light { intensity: u16, color: u16 },
    Displacement { x: u16, y: u16 },
    Market(MarketInfo),
}

/// The attribute-flag bag of one thing, ordered by canonical id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingFlags {
    entries: BTreeMap<ThingAttr, FlagValue>,
}

impl ThingFlags {
    pub fn new() -> ThingFlags {
        ThingFlags::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, attr: ThingAttr) -> bool {
        self.entries.contains_key(&attr)
    }

    pub fn get(&self, attr: ThingAttr) -> Option<&FlagValue> {
        self.entries.get(&attr)
    }

    /// Sets a payload-less flag.
    pub fn set(&mut self, attr: ThingAttr) {
        self.entries.insert(attr, FlagValue::Set);
    }

    pub fn insert(&mut self, attr: ThingAttr, value: FlagValue) {
        self.entries.insert(attr, value);
    }

    pub fn remove(&mut self, attr: ThingAttr) -> Option<FlagValue> {
        self.entries.remove(&attr)
    }

    /// Iterates in ascending canonical id order.
    pub fn iter(&self) -> impl Iterator<Item = (ThingAttr, &FlagValue)> {
        self.entries.iter().map(|(attr, value)| (*attr, value))
    }

    /// The u16 payload of `attr`, when present and quantity-shaped.
    pub fn quantity(&self, attr: ThingAttr) -> Option<u16> {
        match self.entries.get(&attr) {
            Some(FlagValue::Quantity(value)) => Some(*value),
            _ => None,
        }
    }
}

pub const DEFAULT_FRAME_DURATION: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDuration {
    pub minimum: u32,
    pub maximum: u32,
}

impl Default for FrameDuration {
    fn default() -> Self {
        FrameDuration {
            minimum: DEFAULT_FRAME_DURATION,
            maximum: DEFAULT_FRAME_DURATION,
        }
    }
}

/// Animation timing metadata of a frame group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    pub asynchronous: bool,
    pub loop_count: u32,
    pub start_frame: i8,
    /// One entry per animation frame.
    pub durations: Vec<FrameDuration>,
}

impl Animation {
    pub fn with_frames(frames: u8) -> Animation {
        Animation {
            asynchronous: false,
            loop_count: 0,
            start_frame: 0,
            durations: vec![FrameDuration::default(); frames as usize],
        }
    }
}

/// One pose/animation configuration of a thing.
///
/// The seven geometry dimensions span a flat sprite-slot array; the invariant
/// `sprites.len() == sprite_count()` must be restored with
/// [`FrameGroup::resize_sprites`] after any geometry edit.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGroup {
    /// Group type byte (0 = idle, 1 = moving); only meaningful for outfits
    /// in frame-group eras.
    pub group_type: u8,
    /// Tile width of one drawing, in 32-pixel sprites.
    pub width: u8,
    /// Tile height of one drawing, in 32-pixel sprites.
    pub height: u8,
    pub layers: u8,
    pub pattern_x: u8,
    pub pattern_y: u8,
    pub pattern_z: u8,
    /// Number of animation frames.
    pub frames: u8,
    pub animation: Option<Animation>,
    /// Flat sprite-id array, one slot per coordinate tuple; id 0 is blank.
    pub sprites: Vec<u32>,
}

impl Default for FrameGroup {
    fn default() -> Self {
        FrameGroup {
            group_type: 0,
            width: 1,
            height: 1,
            layers: 1,
            pattern_x: 1,
            pattern_y: 1,
            pattern_z: 1,
            frames: 1,
            animation: None,
            sprites: vec![0],
        }
    }
}

impl FrameGroup {
    /// Total number of sprite slots: the product of all seven dimensions.
    pub fn sprite_count(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.layers as usize
            * self.pattern_x as usize
            * self.pattern_y as usize
            * self.pattern_z as usize
            * self.frames as usize
    }

    /// Maps a coordinate tuple to its flat sprite-slot index.
    ///
    /// Nesting order, outermost first: frame, pattern z, pattern y,
    /// pattern x, layer, tile y, tile x. Every consumer of sprite slots
    /// (codec, sheet composer, sheet slicer) must go through this one
    /// function; a divergent copy would silently misalign lookups.
    pub fn sprite_index(
        &self,
        frame: usize,
        pattern_x: usize,
        pattern_y: usize,
        pattern_z: usize,
        layer: usize,
        x: usize,
        y: usize,
    ) -> usize {
        (((((frame * self.pattern_z as usize + pattern_z) * self.pattern_y as usize + pattern_y)
            * self.pattern_x as usize
            + pattern_x)
            * self.layers as usize
            + layer)
            * self.height as usize
            + y)
            * self.width as usize
            + x
    }

    /// Restores the sprite-array invariant after a geometry edit, padding
    /// with blank sprites or truncating as needed.
    pub fn resize_sprites(&mut self) {
        self.sprites.resize(self.sprite_count(), 0);
    }
}

/// Provenance of a record relative to the file it was parsed from.
///
/// `Cached` carries the exact original on-disk bytes of the record and is
/// only reachable through parsing; every mutating accessor on
/// [`ThingRecord`] switches the record to `Modified`, so a stale cache can
/// not survive an edit.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    Cached(Vec<u8>),
    Modified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThingRecord {
    id: u32,
    category: ThingCategory,
    flags: ThingFlags,
    frame_groups: Vec<FrameGroup>,
    state: RecordState,
}

impl ThingRecord {
    /// A fresh, empty record (one default frame group, no flags).
    pub fn new(id: u32, category: ThingCategory) -> ThingRecord {
        ThingRecord {
            id,
            category,
            flags: ThingFlags::new(),
            frame_groups: vec![FrameGroup::default()],
            state: RecordState::Modified,
        }
    }

    pub(crate) fn from_parse(
        id: u32,
        category: ThingCategory,
        flags: ThingFlags,
        frame_groups: Vec<FrameGroup>,
        raw: Vec<u8>,
    ) -> ThingRecord {
        ThingRecord {
            id,
            category,
            flags,
            frame_groups,
            state: RecordState::Cached(raw),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        // Ids are positional in the file, not part of the record encoding,
        // so renumbering does not invalidate the cached bytes.
        self.id = id;
    }

    pub fn category(&self) -> ThingCategory {
        self.category
    }

    pub fn flags(&self) -> &ThingFlags {
        &self.flags
    }

    pub fn frame_groups(&self) -> &[FrameGroup] {
        &self.frame_groups
    }

    pub fn flags_mut(&mut self) -> &mut ThingFlags {
        self.state = RecordState::Modified;
        &mut self.flags
    }

    pub fn frame_groups_mut(&mut self) -> &mut Vec<FrameGroup> {
        self.state = RecordState::Modified;
        &mut self.frame_groups
    }

    pub fn mark_modified(&mut self) {
        self.state = RecordState::Modified;
    }

    pub fn is_modified(&self) -> bool {
        matches!(self.state, RecordState::Modified)
    }

    /// The exact original on-disk bytes, when the record is untouched.
    pub fn cached_bytes(&self) -> Option<&[u8]> {
        match &self.state {
            RecordState::Cached(raw) => Some(raw),
            RecordState::Modified => None,
        }
    }
}

/// The parsed object definition file.
#[derive(Debug, Clone)]
pub struct ObjectModel {
    pub era: Era,
    pub header: ContainerHeader,
    counts: [u16; 4],
    things: BTreeMap<u32, ThingRecord>,
    source: Option<Vec<u8>>,
}

impl ObjectModel {
    pub fn new(era: Era, header: ContainerHeader) -> ObjectModel {
        ObjectModel {
            era,
            header,
            counts: [0; 4],
            things: BTreeMap::new(),
            source: None,
        }
    }

    pub(crate) fn from_parse(
        era: Era,
        header: ContainerHeader,
        counts: [u16; 4],
        things: BTreeMap<u32, ThingRecord>,
        source: Vec<u8>,
    ) -> ObjectModel {
        ObjectModel {
            era,
            header,
            counts,
            things,
            source: Some(source),
        }
    }

    fn category_slot(category: ThingCategory) -> usize {
        match category {
            ThingCategory::Item => 0,
            ThingCategory::Outfit => 1,
            ThingCategory::Effect => 2,
            ThingCategory::Distance => 3,
        }
    }

    pub fn count(&self, category: ThingCategory) -> u16 {
        self.counts[Self::category_slot(category)]
    }

    pub fn total_count(&self) -> u32 {
        self.counts.iter().map(|c| *c as u32).sum()
    }

    /// The contiguous id range of `category`: items start at
    /// [`MIN_THING_ID`], the other categories follow without gaps.
    pub fn id_range(&self, category: ThingCategory) -> Range<u32> {
        let mut start = MIN_THING_ID;
        for earlier in ThingCategory::ALL {
            if earlier == category {
                break;
            }
            start += self.count(earlier) as u32;
        }
        start..start + self.count(category) as u32
    }

    pub fn category_of(&self, id: u32) -> Option<ThingCategory> {
        ThingCategory::ALL
            .into_iter()
            .find(|category| self.id_range(*category).contains(&id))
    }

    pub fn get(&self, id: u32) -> Option<&ThingRecord> {
        self.things.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut ThingRecord> {
        self.things.get_mut(&id)
    }

    pub fn things(&self) -> impl Iterator<Item = &ThingRecord> {
        self.things.values()
    }

    /// The original file bytes, available until the model is restructured.
    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    /// True when the original buffer is retained, every counted id has its
    /// record, and no record was touched; compiling such a model can return
    /// the input verbatim.
    pub fn is_pristine(&self) -> bool {
        self.source.is_some()
            && self.things.len() as u32 == self.total_count()
            && self.things.values().all(|t| !t.is_modified())
    }

    /// Appends an empty record at the end of `category`'s id range and
    /// returns its id. Records in later categories are renumbered up by one.
    pub fn append(&mut self, category: ThingCategory) -> u32 {
        let new_id = self.id_range(category).end;
        self.shift_ids_from(new_id, 1);
        self.counts[Self::category_slot(category)] += 1;
        self.things.insert(new_id, ThingRecord::new(new_id, category));
        self.source = None;
        new_id
    }

    /// Removes the highest-id record of `category`. Arbitrary-position
    /// removal is deliberately unsupported: it would renumber every higher
    /// id, which is exactly what the append/remove-last discipline avoids.
    pub fn remove_last(&mut self, category: ThingCategory) -> Option<ThingRecord> {
        let range = self.id_range(category);
        if range.is_empty() {
            return None;
        }
        let last_id = range.end - 1;
        let removed = self.things.remove(&last_id);
        self.counts[Self::category_slot(category)] -= 1;
        self.shift_ids_from(last_id + 1, -1);
        self.source = None;
        removed
    }

    fn shift_ids_from(&mut self, first: u32, delta: i64) {
        let tail: Vec<u32> = self.things.range(first..).map(|(id, _)| *id).collect();
        // Walk away from the shift direction so renumbered ids never collide.
        let ordered: Box<dyn Iterator<Item = u32>> = if delta > 0 {
            Box::new(tail.into_iter().rev())
        } else {
            Box::new(tail.into_iter())
        };
        for id in ordered {
            if let Some(mut record) = self.things.remove(&id) {
                let new_id = (id as i64 + delta) as u32;
                record.set_id(new_id);
                self.things.insert(new_id, record);
            }
        }
    }
}
