//! In-memory model of the sprite atlas file.

use crate::containers::ContainerHeader;
use crate::formats::Era;

/// Sprites are fixed 32x32 squares.
pub const SPRITE_DIMENSION: u32 = 32;
pub const SPRITE_PIXELS: usize = (SPRITE_DIMENSION * SPRITE_DIMENSION) as usize;
/// Byte size of one decoded RGBA sprite buffer.
pub const SPRITE_BYTES: usize = SPRITE_PIXELS * 4;

/// The parsed sprite atlas: an offset index over the original file buffer.
///
/// Sprite ids are 1-based and dense up to `sprite_count`; an offset of 0
/// marks an intentionally empty slot. Decoding stays cheap because the
/// records are only sliced out of `data` on demand, and compiling copies
/// untouched records straight back out of it.
#[derive(Debug, Clone)]
pub struct SpriteAtlas {
    pub era: Era,
    pub header: ContainerHeader,
    count: u32,
    /// Absolute file offsets, indexed by id - 1.
    offsets: Vec<u32>,
    /// The entire original file.
    data: Vec<u8>,
}

impl SpriteAtlas {
    /// An empty atlas for building a file from scratch.
    pub fn new(era: Era, header: ContainerHeader) -> SpriteAtlas {
        SpriteAtlas {
            era,
            header,
            count: 0,
            offsets: Vec::new(),
            data: Vec::new(),
        }
    }

    pub(crate) fn from_parse(
        era: Era,
        header: ContainerHeader,
        count: u32,
        offsets: Vec<u32>,
        data: Vec<u8>,
    ) -> SpriteAtlas {
        SpriteAtlas {
            era,
            header,
            count,
            offsets,
            data,
        }
    }

    pub fn sprite_count(&self) -> u32 {
        self.count
    }

    /// The absolute record offset of `id`, or `None` when the id is out of
    /// range or marks an empty sprite.
    pub fn offset_of(&self, id: u32) -> Option<u32> {
        if id == 0 || id > self.count {
            return None;
        }
        match self.offsets.get((id - 1) as usize) {
            Some(0) | None => None,
            Some(offset) => Some(*offset),
        }
    }

    pub fn has_sprite(&self, id: u32) -> bool {
        self.offset_of(id).is_some()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
