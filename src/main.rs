use std::{error::Error, fs, path::PathBuf};

use clap::{Parser, Subcommand};

use ot_assets::assets::AssetPack;
use ot_assets::data::server_items::{ServerItemRecord, ServerItemTable};
use ot_assets::data::things::ThingCategory;
use ot_assets::data::versions::VersionTable;
use ot_assets::formats::otb::compile_server_table;
use ot_assets::formats::things::{
    compile_object_definitions, parse_object_definitions_with, HeaderPolicy,
};
use ot_assets::sprite_exporter::SheetExporter;

#[derive(Parser)]
#[command(
    name = "ot_assets",
    about = "Edit and recompile legacy client asset files"
)]
struct Cli {
    /// JSON file replacing the built-in client version table.
    #[arg(long, global = true)]
    versions: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print header and counts of an object or sprite file.
    Info {
        file: PathBuf,
        /// Treat the file as a sprite atlas instead of object definitions.
        #[arg(long)]
        sprites: bool,
    },
    /// Parse an object file and compile it back out.
    Recompile {
        dat: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Keep the header feature byte exactly as it was on disk.
        #[arg(long)]
        keep_flags: bool,
    },
    /// Export sprite sheets (PNG + JSON sidecar) for a range of ids.
    ExportSheets {
        dat: PathBuf,
        spr: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        /// First internal id; defaults to the start of the item range.
        #[arg(long)]
        first: Option<u32>,
        /// Last internal id; defaults to the end of the item range.
        #[arg(long)]
        last: Option<u32>,
        /// Progress file updated while exporting.
        #[arg(long)]
        progress: Option<PathBuf>,
    },
    /// Import an edited sheet back into a thing's frame group.
    ImportSheet {
        dat: PathBuf,
        spr: PathBuf,
        #[arg(long)]
        id: u32,
        #[arg(long, default_value_t = 0)]
        group: usize,
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        out_dat: PathBuf,
        #[arg(long)]
        out_spr: PathBuf,
    },
    /// Generate a server item metadata table from an object file.
    GenerateOtb {
        dat: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 3)]
        major: u32,
        /// Minor version; defaults to the table entry for the file's era.
        #[arg(long)]
        minor: Option<u32>,
        #[arg(long, default_value = "generated by ot_assets")]
        description: String,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let table = match &cli.versions {
        Some(path) => VersionTable::from_json_file(path)?,
        None => VersionTable::builtin(),
    };

    match cli.command {
        Command::Info { file, sprites } => {
            let bytes = fs::read(&file)?;
            if sprites {
                let atlas = ot_assets::formats::sprites::parse_sprite_atlas_with(&bytes, &table)?;
                println!("Sprite atlas {:?}", file);
                println!("  version: {}", atlas.era.version);
                println!("  sprites: {}", atlas.sprite_count());
            } else {
                let model = parse_object_definitions_with(&bytes, &table)?;
                println!("Object definitions {:?}", file);
                println!("  version: {}", model.era.version);
                for category in ThingCategory::ALL {
                    println!(
                        "  {}s: {} (ids {:?})",
                        category.label(),
                        model.count(category),
                        model.id_range(category)
                    );
                }
            }
        }
        Command::Recompile {
            dat,
            out,
            keep_flags,
        } => {
            let bytes = fs::read(&dat)?;
            let model = parse_object_definitions_with(&bytes, &table)?;
            let policy = if keep_flags {
                HeaderPolicy::Preserve
            } else {
                HeaderPolicy::PatchFeatureFlags
            };
            let compiled = compile_object_definitions(&model, policy)?;
            fs::write(&out, &compiled)?;
            println!(
                "Recompiled {:?} -> {:?} ({} bytes, {})",
                dat,
                out,
                compiled.len(),
                if compiled == bytes {
                    "byte-identical"
                } else {
                    "changed"
                }
            );
        }
        Command::ExportSheets {
            dat,
            spr,
            out_dir,
            first,
            last,
            progress,
        } => {
            let pack = AssetPack::load_with(&dat, &spr, &table)?;
            fs::create_dir_all(&out_dir)?;
            let item_range = pack.objects.id_range(ThingCategory::Item);
            let first = first.unwrap_or(item_range.start);
            let last = last.unwrap_or(item_range.end.saturating_sub(1));

            let mut exporter = SheetExporter::new(&pack, &out_dir);
            if let Some(progress_path) = &progress {
                exporter = exporter.with_progress_file(progress_path);
            }
            exporter.export_range(first, last)?;
        }
        Command::ImportSheet {
            dat,
            spr,
            id,
            group,
            image,
            out_dat,
            out_spr,
        } => {
            let mut pack = AssetPack::load_with(&dat, &spr, &table)?;
            let sheet = image::open(&image)?.to_rgba8();
            let summary = pack.import_sheet(id, group, &sheet)?;
            pack.save(&out_dat, &out_spr, HeaderPolicy::PatchFeatureFlags)?;
            println!(
                "Imported {:?} into thing {} group {}: {} new sprites, {} deduplicated, {} blank",
                image, id, group, summary.new_sprites, summary.deduplicated, summary.blank
            );
        }
        Command::GenerateOtb {
            dat,
            out,
            major,
            minor,
            description,
        } => {
            let bytes = fs::read(&dat)?;
            let model = parse_object_definitions_with(&bytes, &table)?;
            let minor = minor
                .or_else(|| table.by_value(model.era.version).map(|v| v.otb_version))
                .unwrap_or(0);

            let mut server_table = ServerItemTable::new(major, minor, 0, description);
            for id in model.id_range(ThingCategory::Item) {
                if let Some(thing) = model.get(id) {
                    server_table.insert(ServerItemRecord::from_thing(id as u16, thing));
                }
            }
            let compiled = compile_server_table(&server_table);
            fs::write(&out, &compiled)?;
            println!(
                "Wrote {} items (version {}.{}) to {:?}, {} bytes",
                server_table.len(),
                major,
                minor,
                out,
                compiled.len()
            );
        }
    }

    Ok(())
}
