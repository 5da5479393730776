//! A paired object-definition + sprite-atlas editing session.
//!
//! `AssetPack` owns both parsed files and the sprite overrides accumulated by
//! imports, so a whole edit session can be loaded, modified and saved as one
//! unit. The two files must speak the same content version; mixing eras
//! produces files the client refuses to load.

use std::{
    collections::{BTreeMap, HashMap},
    fmt, fs,
    hash::Hasher,
    io,
    path::Path,
};

use image::RgbaImage;
use twox_hash::XxHash64;

use crate::data::sprites::SpriteAtlas;
use crate::data::things::ObjectModel;
use crate::data::versions::VersionTable;
use crate::formats::sprites::{
    compile_sprite_atlas, decode_sprite, is_blank_sprite, parse_sprite_atlas_with, SpriteError,
};
use crate::formats::things::{
    compile_object_definitions, parse_object_definitions_with, HeaderPolicy, ThingError,
};
use crate::graphics::sheet::{slice_sheet, SheetLayout};
use crate::graphics::SheetError;

#[derive(Debug)]
pub enum AssetError {
    Thing(ThingError),
    Sprite(SpriteError),
    Sheet(SheetError),
    Io(io::Error),
    /// No thing with this internal id.
    UnknownThing(u32),
    /// Object and sprite file disagree on the content version.
    VersionMismatch { objects: u32, sprites: u32 },
}

impl From<ThingError> for AssetError {
    fn from(err: ThingError) -> Self {
        AssetError::Thing(err)
    }
}

impl From<SpriteError> for AssetError {
    fn from(err: SpriteError) -> Self {
        AssetError::Sprite(err)
    }
}

impl From<SheetError> for AssetError {
    fn from(err: SheetError) -> Self {
        AssetError::Sheet(err)
    }
}

impl From<io::Error> for AssetError {
    fn from(err: io::Error) -> Self {
        AssetError::Io(err)
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::Thing(err) => write!(f, "Object definitions: {}", err),
            AssetError::Sprite(err) => write!(f, "Sprite atlas: {}", err),
            AssetError::Sheet(err) => write!(f, "Sheet: {}", err),
            AssetError::Io(err) => write!(f, "I/O error: {}", err),
            AssetError::UnknownThing(id) => write!(f, "No thing with id {}", id),
            AssetError::VersionMismatch { objects, sprites } => write!(
                f,
                "Object file is version {} but sprite file is version {}",
                objects, sprites
            ),
        }
    }
}

impl std::error::Error for AssetError {}

/// Outcome of one sheet import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Tiles that received a freshly allocated sprite id.
    pub new_sprites: usize,
    /// Tiles identical to another tile of this import.
    pub deduplicated: usize,
    /// Fully transparent tiles, mapped to sprite id 0.
    pub blank: usize,
}

pub struct AssetPack {
    pub objects: ObjectModel,
    pub atlas: SpriteAtlas,
    sprite_overrides: BTreeMap<u32, Vec<u8>>,
}

impl AssetPack {
    pub fn load(dat_path: &Path, spr_path: &Path) -> Result<AssetPack, AssetError> {
        AssetPack::load_with(dat_path, spr_path, &VersionTable::builtin())
    }

    pub fn load_with(
        dat_path: &Path,
        spr_path: &Path,
        table: &VersionTable,
    ) -> Result<AssetPack, AssetError> {
        let dat_bytes = fs::read(dat_path)?;
        let spr_bytes = fs::read(spr_path)?;
        let objects = parse_object_definitions_with(&dat_bytes, table)?;
        let atlas = parse_sprite_atlas_with(&spr_bytes, table)?;
        if objects.era.version != atlas.era.version {
            return Err(AssetError::VersionMismatch {
                objects: objects.era.version,
                sprites: atlas.era.version,
            });
        }
        Ok(AssetPack {
            objects,
            atlas,
            sprite_overrides: BTreeMap::new(),
        })
    }

    /// Compiles and writes both files.
    pub fn save(
        &self,
        dat_path: &Path,
        spr_path: &Path,
        policy: HeaderPolicy,
    ) -> Result<(), AssetError> {
        let dat_bytes = compile_object_definitions(&self.objects, policy)?;
        let spr_bytes = compile_sprite_atlas(&self.atlas, &self.sprite_overrides)?;
        fs::write(dat_path, dat_bytes)?;
        fs::write(spr_path, spr_bytes)?;
        Ok(())
    }

    /// Pixels of `id` with pending overrides taken into account.
    pub fn sprite_pixels(&self, id: u32) -> Result<Option<Vec<u8>>, AssetError> {
        if let Some(pixels) = self.sprite_overrides.get(&id) {
            if is_blank_sprite(pixels) {
                return Ok(None);
            }
            return Ok(Some(pixels.clone()));
        }
        Ok(decode_sprite(&self.atlas, id)?)
    }

    pub fn override_sprite(&mut self, id: u32, pixels: Vec<u8>) {
        self.sprite_overrides.insert(id, pixels);
    }

    pub fn pending_overrides(&self) -> usize {
        self.sprite_overrides.len()
    }

    fn next_sprite_id(&self) -> u32 {
        let pending = self
            .sprite_overrides
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0);
        self.atlas.sprite_count().max(pending) + 1
    }

    /// Slices a sheet image into the given frame group of `thing_id`.
    ///
    /// Blank tiles become sprite id 0 and tiles with identical pixels share
    /// one allocated id, so importing a sheet full of repetition does not
    /// balloon the atlas. The record is marked modified through its mutating
    /// accessor.
    pub fn import_sheet(
        &mut self,
        thing_id: u32,
        group_index: usize,
        image: &RgbaImage,
    ) -> Result<ImportSummary, AssetError> {
        let group = self
            .objects
            .get(thing_id)
            .ok_or(AssetError::UnknownThing(thing_id))?
            .frame_groups()
            .get(group_index)
            .cloned()
            .ok_or(AssetError::Sheet(SheetError::MissingGroup {
                thing_id,
                group: group_index,
            }))?;

        let tiles = slice_sheet(&group, image)?;

        let mut summary = ImportSummary::default();
        let mut by_hash: HashMap<u64, u32> = HashMap::new();
        let mut next_id = self.next_sprite_id();
        let mut sprite_ids = Vec::with_capacity(tiles.len());
        for tile in &tiles {
            if is_blank_sprite(tile) {
                summary.blank += 1;
                sprite_ids.push(0);
                continue;
            }
            let mut hasher = XxHash64::default();
            hasher.write(tile);
            let hash = hasher.finish();
            match by_hash.get(&hash) {
                Some(existing) => {
                    summary.deduplicated += 1;
                    sprite_ids.push(*existing);
                }
                None => {
                    let id = next_id;
                    next_id += 1;
                    by_hash.insert(hash, id);
                    self.sprite_overrides.insert(id, tile.clone());
                    summary.new_sprites += 1;
                    sprite_ids.push(id);
                }
            }
        }

        let record = self
            .objects
            .get_mut(thing_id)
            .ok_or(AssetError::UnknownThing(thing_id))?;
        record.frame_groups_mut()[group_index].sprites = sprite_ids;
        Ok(summary)
    }

    /// Layout of the sheet `export` and `import` agree on for this group.
    pub fn sheet_layout(&self, thing_id: u32, group_index: usize) -> Result<SheetLayout, AssetError> {
        let record = self
            .objects
            .get(thing_id)
            .ok_or(AssetError::UnknownThing(thing_id))?;
        let group = record.frame_groups().get(group_index).ok_or(AssetError::Sheet(
            SheetError::MissingGroup {
                thing_id,
                group: group_index,
            },
        ))?;
        Ok(SheetLayout::of(group))
    }
}
