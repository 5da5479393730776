//! Pixel-level bridging between sprite buffers and images.
//!
//! Decoded sprites are flat 32x32 RGBA byte buffers; everything that leaves
//! or enters the editor as a picture goes through [`image::RgbaImage`].

pub mod sheet;

use std::{fmt, io};

use image::{ImageError, Rgba, RgbaImage};

use crate::data::sprites::{SPRITE_BYTES, SPRITE_DIMENSION};
use crate::formats::sprites::SpriteError;

#[derive(Debug)]
pub enum SheetError {
    Io(io::Error),
    Image(ImageError),
    Sprite(SpriteError),
    Json(serde_json::Error),
    /// An imported sheet whose dimensions do not match the frame group.
    SizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    /// The thing has no frame group at the requested index.
    MissingGroup { thing_id: u32, group: usize },
}

impl From<io::Error> for SheetError {
    fn from(err: io::Error) -> Self {
        SheetError::Io(err)
    }
}

impl From<ImageError> for SheetError {
    fn from(err: ImageError) -> Self {
        SheetError::Image(err)
    }
}

impl From<SpriteError> for SheetError {
    fn from(err: SpriteError) -> Self {
        SheetError::Sprite(err)
    }
}

impl From<serde_json::Error> for SheetError {
    fn from(err: serde_json::Error) -> Self {
        SheetError::Json(err)
    }
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::Io(err) => write!(f, "I/O error: {}", err),
            SheetError::Image(err) => write!(f, "Image error: {}", err),
            SheetError::Sprite(err) => write!(f, "Sprite error: {}", err),
            SheetError::Json(err) => write!(f, "Metadata JSON error: {}", err),
            SheetError::SizeMismatch { expected, found } => write!(
                f,
                "Sheet is {}x{}, expected {}x{} for this frame group",
                found.0, found.1, expected.0, expected.1
            ),
            SheetError::MissingGroup { thing_id, group } => {
                write!(f, "Thing {} has no frame group {}", thing_id, group)
            }
        }
    }
}

impl std::error::Error for SheetError {}

/// Wraps a decoded sprite buffer into an image.
pub fn sprite_to_image(pixels: &[u8]) -> Result<RgbaImage, SheetError> {
    if pixels.len() != SPRITE_BYTES {
        return Err(SheetError::Sprite(SpriteError::BadPixelBuffer {
            len: pixels.len(),
        }));
    }
    RgbaImage::from_raw(SPRITE_DIMENSION, SPRITE_DIMENSION, pixels.to_vec()).ok_or(
        SheetError::Sprite(SpriteError::BadPixelBuffer { len: pixels.len() }),
    )
}

/// Cuts the 32x32 tile whose top-left corner sits at (`left`, `top`) out of
/// `image`. Pixels beyond the image bounds come back fully transparent.
pub fn cut_tile(image: &RgbaImage, left: u32, top: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; SPRITE_BYTES];
    for y in 0..SPRITE_DIMENSION {
        for x in 0..SPRITE_DIMENSION {
            let src_x = left + x;
            let src_y = top + y;
            if src_x >= image.width() || src_y >= image.height() {
                continue;
            }
            let rgba = image.get_pixel(src_x, src_y).0;
            let base = ((y * SPRITE_DIMENSION + x) * 4) as usize;
            pixels[base..base + 4].copy_from_slice(&rgba);
        }
    }
    pixels
}

/// Blits a sprite buffer onto `canvas` at (`left`, `top`), skipping fully
/// transparent pixels so stacked layers composite instead of erasing.
pub fn overlay_sprite(canvas: &mut RgbaImage, pixels: &[u8], left: u32, top: u32) {
    for y in 0..SPRITE_DIMENSION {
        for x in 0..SPRITE_DIMENSION {
            let base = ((y * SPRITE_DIMENSION + x) * 4) as usize;
            let rgba = &pixels[base..base + 4];
            if rgba[3] == 0 {
                continue;
            }
            let dst_x = left + x;
            let dst_y = top + y;
            if dst_x >= canvas.width() || dst_y >= canvas.height() {
                continue;
            }
            canvas.put_pixel(dst_x, dst_y, Rgba([rgba[0], rgba[1], rgba[2], rgba[3]]));
        }
    }
}
