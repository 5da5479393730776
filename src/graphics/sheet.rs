//! Frame-group sprite sheets.
//!
//! A sheet lays every sprite of one frame group out on a single PNG grid:
//! one cell per (frame, pattern, layer) combination, each cell a
//! width x height block of 32-pixel tiles. The same layout is used in both
//! directions, so a sheet exported here can be edited and imported back
//! without any repositioning.

use std::{fs, path::Path};

use image::RgbaImage;
use oxipng::{InFile, OutFile};
use serde::{Deserialize, Serialize};

use crate::data::sprites::{SpriteAtlas, SPRITE_DIMENSION};
use crate::data::things::FrameGroup;
use crate::formats::sprites::decode_sprite;
use crate::graphics::{cut_tile, overlay_sprite, SheetError};

/// Grid geometry of one sheet, also written out as the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub columns: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub width: u32,
    pub height: u32,
}

impl SheetLayout {
    /// One column per (pattern z, pattern x, layer), one row per
    /// (frame, pattern y).
    pub fn of(group: &FrameGroup) -> SheetLayout {
        let columns =
            group.pattern_z as u32 * group.pattern_x as u32 * group.layers as u32;
        let rows = group.frames as u32 * group.pattern_y as u32;
        let cell_width = group.width as u32 * SPRITE_DIMENSION;
        let cell_height = group.height as u32 * SPRITE_DIMENSION;
        SheetLayout {
            columns,
            rows,
            cell_width,
            cell_height,
            width: columns * cell_width,
            height: rows * cell_height,
        }
    }
}

/// Sidecar metadata written next to every exported sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetMetadata {
    pub thing_id: u32,
    pub category: String,
    pub group_index: usize,
    pub layers: u8,
    pub pattern_x: u8,
    pub pattern_y: u8,
    pub pattern_z: u8,
    pub frames: u8,
    pub layout: SheetLayout,
}

/// Iterates every sprite slot of `group` together with its pixel position
/// on the sheet. Tiles are placed right-to-left and bottom-to-top inside a
/// cell, matching how the client anchors multi-tile drawings.
fn for_each_slot<F>(group: &FrameGroup, layout: &SheetLayout, mut visit: F)
where
    F: FnMut(usize, u32, u32),
{
    for frame in 0..group.frames as usize {
        for pz in 0..group.pattern_z as usize {
            for py in 0..group.pattern_y as usize {
                for px in 0..group.pattern_x as usize {
                    for layer in 0..group.layers as usize {
                        let column =
                            ((pz * group.pattern_x as usize + px) * group.layers as usize
                                + layer) as u32;
                        let row = (frame * group.pattern_y as usize + py) as u32;
                        for y in 0..group.height as usize {
                            for x in 0..group.width as usize {
                                let index =
                                    group.sprite_index(frame, px, py, pz, layer, x, y);
                                let left = column * layout.cell_width
                                    + (group.width as usize - 1 - x) as u32
                                        * SPRITE_DIMENSION;
                                let top = row * layout.cell_height
                                    + (group.height as usize - 1 - y) as u32
                                        * SPRITE_DIMENSION;
                                visit(index, left, top);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Renders one frame group into a sheet image.
pub fn compose_sheet(group: &FrameGroup, atlas: &SpriteAtlas) -> Result<RgbaImage, SheetError> {
    let layout = SheetLayout::of(group);
    let mut canvas = RgbaImage::new(layout.width.max(1), layout.height.max(1));
    let mut failure = None;

    for_each_slot(group, &layout, |index, left, top| {
        if failure.is_some() {
            return;
        }
        let sprite_id = group.sprites.get(index).copied().unwrap_or(0);
        if sprite_id == 0 {
            return;
        }
        match decode_sprite(atlas, sprite_id) {
            Ok(Some(pixels)) => overlay_sprite(&mut canvas, &pixels, left, top),
            Ok(None) => {}
            Err(err) => failure = Some(err),
        }
    });

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(canvas),
    }
}

/// Cuts a sheet image back into per-slot sprite buffers, inverse of
/// [`compose_sheet`]. The image must match the group's layout exactly.
pub fn slice_sheet(group: &FrameGroup, image: &RgbaImage) -> Result<Vec<Vec<u8>>, SheetError> {
    let layout = SheetLayout::of(group);
    if image.dimensions() != (layout.width, layout.height) {
        return Err(SheetError::SizeMismatch {
            expected: (layout.width, layout.height),
            found: image.dimensions(),
        });
    }

    let mut tiles = vec![Vec::new(); group.sprite_count()];
    for_each_slot(group, &layout, |index, left, top| {
        tiles[index] = cut_tile(image, left, top);
    });
    Ok(tiles)
}

/// Saves a sheet as PNG and runs oxipng over it. A failed optimisation only
/// warns; the unoptimised file stays in place.
pub fn save_sheet_png(image: &RgbaImage, path: &Path) -> Result<(), SheetError> {
    image.save(path)?;

    let temp_path = path.with_extension("temp.png");
    fs::rename(path, &temp_path)?;
    let options = oxipng::Options::from_preset(2);
    match oxipng::optimize(
        &InFile::Path(temp_path.clone()),
        &OutFile::Path(Some(path.to_path_buf())),
        &options,
    ) {
        Ok(()) => {
            if let Err(err) = fs::remove_file(&temp_path) {
                println!("  Warning: Failed to remove temporary file: {}", err);
            }
        }
        Err(err) => {
            eprintln!(
                "Warning: oxipng optimisation failed for {}: {}. File saved unoptimised.",
                path.display(),
                err
            );
            fs::rename(&temp_path, path)?;
        }
    }
    Ok(())
}

pub fn write_metadata(metadata: &SheetMetadata, path: &Path) -> Result<(), SheetError> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::containers::{AssetKind, ContainerHeader};
    use crate::data::sprites::SPRITE_BYTES;
    use crate::formats::sprites::{compile_sprite_atlas, parse_sprite_atlas};
    use crate::formats::Era;

    fn solid_pixels(value: u8) -> Vec<u8> {
        let mut pixels = vec![0u8; SPRITE_BYTES];
        for pixel in pixels.chunks_mut(4) {
            pixel.copy_from_slice(&[value, value / 2, value / 3, 255]);
        }
        pixels
    }

    fn atlas_with(sprites: &[Vec<u8>]) -> SpriteAtlas {
        let era = Era::from_version(860);
        let header = ContainerHeader::tagged(AssetKind::SpriteAtlas, 860, 0);
        let empty = SpriteAtlas::new(era, header);
        let mut overrides = BTreeMap::new();
        for (index, pixels) in sprites.iter().enumerate() {
            overrides.insert(index as u32 + 1, pixels.clone());
        }
        let bytes = compile_sprite_atlas(&empty, &overrides).unwrap();
        parse_sprite_atlas(&bytes).unwrap()
    }

    fn two_by_one_group() -> FrameGroup {
        let mut group = FrameGroup {
            width: 2,
            pattern_x: 2,
            ..FrameGroup::default()
        };
        group.resize_sprites();
        group.sprites = vec![1, 2, 3, 4];
        group
    }

    #[test]
    fn layout_matches_geometry() {
        let group = two_by_one_group();
        let layout = SheetLayout::of(&group);
        assert_eq!(layout.columns, 2);
        assert_eq!(layout.rows, 1);
        assert_eq!(layout.cell_width, 64);
        assert_eq!(layout.cell_height, 32);
        assert_eq!((layout.width, layout.height), (128, 32));
    }

    #[test]
    fn compose_then_slice_round_trips() {
        let sprites = vec![
            solid_pixels(40),
            solid_pixels(90),
            solid_pixels(140),
            solid_pixels(190),
        ];
        let atlas = atlas_with(&sprites);
        let group = two_by_one_group();

        let sheet = compose_sheet(&group, &atlas).unwrap();
        let tiles = slice_sheet(&group, &sheet).unwrap();

        assert_eq!(tiles.len(), 4);
        for (slot, expected) in sprites.iter().enumerate() {
            assert_eq!(&tiles[slot], expected, "slot {}", slot);
        }
    }

    #[test]
    fn tile_zero_in_a_cell_is_the_rightmost_tile() {
        let sprites = vec![solid_pixels(40), solid_pixels(90)];
        let atlas = atlas_with(&sprites);
        let mut group = FrameGroup {
            width: 2,
            ..FrameGroup::default()
        };
        group.resize_sprites();
        group.sprites = vec![1, 2];

        let sheet = compose_sheet(&group, &atlas).unwrap();
        // Slot 0 (sprite 1) is drawn at the right half of the cell.
        assert_eq!(sheet.get_pixel(32, 0).0[0], 40);
        assert_eq!(sheet.get_pixel(0, 0).0[0], 90);
    }

    #[test]
    fn slicing_a_wrong_size_sheet_is_rejected() {
        let group = two_by_one_group();
        let image = RgbaImage::new(64, 64);
        let err = slice_sheet(&group, &image).unwrap_err();
        assert!(matches!(err, SheetError::SizeMismatch { .. }));
    }
}
