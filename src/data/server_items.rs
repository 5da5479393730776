//! Server-side item metadata.
//!
//! Server items mirror client things but live in their own id space: many
//! server ids can point at the same client id. Only the fields the metadata
//! table serializes are structured; everything else editors attach travels
//! in the open property bag.

use std::collections::BTreeMap;

use crate::data::things::{ThingAttr, ThingRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ServerItemGroup {
    None = 0,
    Ground = 1,
    Container = 2,
    Weapon = 3,
    Ammunition = 4,
    Armor = 5,
    Charges = 6,
    Teleport = 7,
    MagicField = 8,
    Writable = 9,
    Key = 10,
    Splash = 11,
    Fluid = 12,
    Door = 13,
    /// Legacy classification; items in this group are dropped from the
    /// compiled table entirely.
    Deprecated = 14,
}

/// Bits of the flags field in the compiled metadata table.
pub mod item_flags {
    pub const BLOCK_SOLID: u32 = 1 << 0;
    pub const BLOCK_PROJECTILE: u32 = 1 << 1;
    pub const BLOCK_PATHFIND: u32 = 1 << 2;
    pub const HAS_ELEVATION: u32 = 1 << 3;
    pub const USABLE: u32 = 1 << 4;
    pub const PICKUPABLE: u32 = 1 << 5;
    pub const MOVABLE: u32 = 1 << 6;
    pub const STACKABLE: u32 = 1 << 7;
    pub const ALWAYS_ON_TOP: u32 = 1 << 13;
    pub const READABLE: u32 = 1 << 14;
    pub const ROTATABLE: u32 = 1 << 15;
    pub const HANGABLE: u32 = 1 << 16;
    pub const HOOK_SOUTH: u32 = 1 << 17;
    pub const HOOK_EAST: u32 = 1 << 18;
    pub const CLIENT_CHARGES: u32 = 1 << 22;
    pub const IGNORE_LOOK: u32 = 1 << 23;
    pub const ANIMATED: u32 = 1 << 24;
    pub const FULL_GROUND: u32 = 1 << 25;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerItemRecord {
    pub server_id: u16,
    /// Cross-reference into the object model's internal id space.
    pub client_id: u16,
    pub group: ServerItemGroup,
    pub flags: u32,
    /// Editor-attached details not covered by the structured fields.
    pub properties: BTreeMap<String, String>,
}

impl ServerItemRecord {
    pub fn new(server_id: u16, client_id: u16) -> ServerItemRecord {
        ServerItemRecord {
            server_id,
            client_id,
            group: ServerItemGroup::None,
            flags: 0,
            properties: BTreeMap::new(),
        }
    }

    /// Derives group and flags from a client record's attributes, the way
    /// a freshly generated server table classifies items.
    pub fn from_thing(server_id: u16, thing: &ThingRecord) -> ServerItemRecord {
        let flags = derive_flags(thing);
        let group = derive_group(thing);
        ServerItemRecord {
            server_id,
            client_id: thing.id() as u16,
            group,
            flags,
            properties: BTreeMap::new(),
        }
    }
}

fn derive_group(thing: &ThingRecord) -> ServerItemGroup {
    let flags = thing.flags();
    if flags.contains(ThingAttr::Ground) {
        ServerItemGroup::Ground
    } else if flags.contains(ThingAttr::Container) {
        ServerItemGroup::Container
    } else if flags.contains(ThingAttr::Splash) {
        ServerItemGroup::Splash
    } else if flags.contains(ThingAttr::FluidContainer) {
        ServerItemGroup::Fluid
    } else {
        ServerItemGroup::None
    }
}

fn derive_flags(thing: &ThingRecord) -> u32 {
    let attrs = thing.flags();
    let mut flags = 0u32;
    let mut put = |set: bool, bit: u32| {
        if set {
            flags |= bit;
        }
    };
    put(attrs.contains(ThingAttr::Unpassable), item_flags::BLOCK_SOLID);
    put(
        attrs.contains(ThingAttr::BlockMissile),
        item_flags::BLOCK_PROJECTILE,
    );
    put(
        attrs.contains(ThingAttr::BlockPathfind),
        item_flags::BLOCK_PATHFIND,
    );
    put(attrs.contains(ThingAttr::Elevation), item_flags::HAS_ELEVATION);
    put(
        attrs.contains(ThingAttr::Usable) || attrs.contains(ThingAttr::MultiUse),
        item_flags::USABLE,
    );
    put(attrs.contains(ThingAttr::Pickupable), item_flags::PICKUPABLE);
    put(!attrs.contains(ThingAttr::Unmovable), item_flags::MOVABLE);
    put(attrs.contains(ThingAttr::Stackable), item_flags::STACKABLE);
    put(attrs.contains(ThingAttr::OnTop), item_flags::ALWAYS_ON_TOP);
    put(
        attrs.contains(ThingAttr::Writable) || attrs.contains(ThingAttr::WritableOnce),
        item_flags::READABLE,
    );
    put(attrs.contains(ThingAttr::Rotateable), item_flags::ROTATABLE);
    put(attrs.contains(ThingAttr::Hangable), item_flags::HANGABLE);
    put(attrs.contains(ThingAttr::HookSouth), item_flags::HOOK_SOUTH);
    put(attrs.contains(ThingAttr::HookEast), item_flags::HOOK_EAST);
    put(
        attrs.contains(ThingAttr::Chargeable),
        item_flags::CLIENT_CHARGES,
    );
    put(attrs.contains(ThingAttr::IgnoreLook), item_flags::IGNORE_LOOK);
    put(attrs.contains(ThingAttr::FullGround), item_flags::FULL_GROUND);
    let animated = thing
        .frame_groups()
        .iter()
        .any(|group| group.frames > 1);
    put(animated, item_flags::ANIMATED);
    flags
}

/// The server item table plus the version stamp written into its root.
#[derive(Debug, Clone)]
pub struct ServerItemTable {
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    pub description: String,
    items: BTreeMap<u16, ServerItemRecord>,
}

impl ServerItemTable {
    pub fn new(
        major_version: u32,
        minor_version: u32,
        build_number: u32,
        description: String,
    ) -> ServerItemTable {
        ServerItemTable {
            major_version,
            minor_version,
            build_number,
            description,
            items: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, record: ServerItemRecord) {
        self.items.insert(record.server_id, record);
    }

    pub fn get(&self, server_id: u16) -> Option<&ServerItemRecord> {
        self.items.get(&server_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in ascending server-id order.
    pub fn iter(&self) -> impl Iterator<Item = &ServerItemRecord> {
        self.items.values()
    }
}
