//! Batch sprite-sheet export.
//!
//! Walks a range of internal ids and writes one PNG sheet plus a JSON
//! metadata sidecar per frame group, reporting progress to an optional
//! progress file along the way.

use std::path::{Path, PathBuf};

use crate::assets::{AssetError, AssetPack};
use crate::graphics::sheet::{
    compose_sheet, save_sheet_png, write_metadata, SheetLayout, SheetMetadata,
};
use crate::progress::write_progress;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportSummary {
    pub sheets: usize,
    /// Ids in the requested range with no record behind them.
    pub skipped: usize,
}

pub struct SheetExporter<'a> {
    pack: &'a AssetPack,
    output_dir: PathBuf,
    progress_path: Option<PathBuf>,
}

impl<'a> SheetExporter<'a> {
    pub fn new(pack: &'a AssetPack, output_dir: &Path) -> SheetExporter<'a> {
        SheetExporter {
            pack,
            output_dir: output_dir.to_path_buf(),
            progress_path: None,
        }
    }

    pub fn with_progress_file(mut self, path: &Path) -> SheetExporter<'a> {
        self.progress_path = Some(path.to_path_buf());
        self
    }

    /// Exports every frame group of every id in `first..=last`.
    pub fn export_range(&self, first: u32, last: u32) -> Result<ExportSummary, AssetError> {
        let total = (last.saturating_sub(first) + 1) as usize;
        let mut summary = ExportSummary::default();

        for (step, id) in (first..=last).enumerate() {
            let record = match self.pack.objects.get(id) {
                Some(record) => record,
                None => {
                    summary.skipped += 1;
                    continue;
                }
            };

            for (group_index, group) in record.frame_groups().iter().enumerate() {
                let sheet = compose_sheet(group, &self.pack.atlas)?;
                let stem = if record.frame_groups().len() > 1 {
                    format!("{}_{}", id, group_index)
                } else {
                    format!("{}", id)
                };
                let png_path = self.output_dir.join(format!("{}.png", stem));
                save_sheet_png(&sheet, &png_path)?;

                let metadata = SheetMetadata {
                    thing_id: id,
                    category: record.category().label().to_string(),
                    group_index,
                    layers: group.layers,
                    pattern_x: group.pattern_x,
                    pattern_y: group.pattern_y,
                    pattern_z: group.pattern_z,
                    frames: group.frames,
                    layout: SheetLayout::of(group),
                };
                write_metadata(&metadata, &self.output_dir.join(format!("{}.json", stem)))?;
                summary.sheets += 1;
            }

            if let Some(progress_path) = &self.progress_path {
                write_progress(
                    progress_path,
                    step + 1,
                    total,
                    "export-sheets",
                    &format!("thing {}", id),
                );
            }
        }

        println!(
            "Exported {} sheets to {:?} ({} ids skipped)",
            summary.sheets, self.output_dir, summary.skipped
        );
        Ok(summary)
    }
}
