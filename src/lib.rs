//! Editing and recompilation of legacy game client asset files.
//!
//! The crate covers three binary formats:
//! - object definition files (items, outfits, effects, distance effects and
//!   their attribute flags + frame group geometry),
//! - the sprite atlas (32x32 run-length-compressed sprite records behind an
//!   offset index),
//! - the escaped node-tree item table handed to external map editing tools.
//!
//! Parsing yields plain in-memory models; compiling reproduces the on-disk
//! encoding, byte-exact for records that were never touched.

pub mod assets;
pub mod binary_utils;
pub mod containers;
pub mod data;
pub mod formats;
pub mod graphics;
pub mod progress;
pub mod sprite_exporter;
