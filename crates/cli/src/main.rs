//! textarc CLI — scan, read, write, extract, and round-trip-test script
//! text archives in handheld ROM images.

mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use textarc_core::{
    ArchiveFormat, Driver, RomEntries, ScanOptions, load_database_file, load_encoding_file,
};

use crate::render::Format;

// ── CLI definition ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "textarc",
    version,
    about = "textarc toolchain — extract, edit, and re-insert script text archives in ROM images"
)]
struct Cli {
    /// Output mode: "pretty" for terminal output, "json" for
    /// machine-readable JSON. Defaults to "pretty" when stdout is a TTY,
    /// "json" otherwise.
    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    output: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Export format flag shared by `read` and `extract`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum ExportFormat {
    /// Raw binary script bytes.
    #[default]
    Msg,
    /// Pretty-printed JSON dump.
    Json,
    /// Text-box extract.
    Txt,
}

impl From<ExportFormat> for ArchiveFormat {
    fn from(format: ExportFormat) -> ArchiveFormat {
        match format {
            ExportFormat::Msg => ArchiveFormat::Binary,
            ExportFormat::Json => ArchiveFormat::Structured,
            ExportFormat::Txt => ArchiveFormat::TextBoxes,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    // ── Discovery ────────────────────────────────────────────────────
    /// Sweep a ROM image for text archives and record them.
    Scan {
        /// ROM image to scan.
        #[arg(value_name = "ROM")]
        rom: PathBuf,
        /// Command database JSON.
        #[arg(long, value_name = "PATH")]
        db: PathBuf,
        /// Character table file (`XX=str` pairs).
        #[arg(long, value_name = "PATH")]
        table: Option<PathBuf>,
        /// Entry file to load before and write back after the sweep.
        #[arg(long, value_name = "PATH")]
        entries: Option<PathBuf>,
        /// Skip the plausibility gates.
        #[arg(long)]
        deep: bool,
        /// Record pointers to each discovered archive.
        #[arg(long)]
        pointers: bool,
    },

    // ── Extraction ───────────────────────────────────────────────────
    /// Read every archive recorded in the entry file and export them.
    Read {
        /// ROM image to read from.
        #[arg(value_name = "ROM")]
        rom: PathBuf,
        /// Command database JSON.
        #[arg(long, value_name = "PATH")]
        db: PathBuf,
        /// Character table file.
        #[arg(long, value_name = "PATH")]
        table: Option<PathBuf>,
        /// Entry file naming the archives.
        #[arg(long, value_name = "PATH")]
        entries: PathBuf,
        /// Directory to write `<identifier>.<ext>` files into.
        #[arg(long, short, value_name = "DIR")]
        out_dir: PathBuf,
        /// Export format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Msg)]
        format: ExportFormat,
    },

    /// Extract the text boxes of every recorded archive.
    Extract {
        /// ROM image to read from.
        #[arg(value_name = "ROM")]
        rom: PathBuf,
        /// Command database JSON.
        #[arg(long, value_name = "PATH")]
        db: PathBuf,
        /// Character table file.
        #[arg(long, value_name = "PATH")]
        table: Option<PathBuf>,
        /// Entry file naming the archives.
        #[arg(long, value_name = "PATH")]
        entries: PathBuf,
        /// Directory to write `<identifier>.txt` files into.
        #[arg(long, short, value_name = "DIR")]
        out_dir: PathBuf,
    },

    // ── Insertion ────────────────────────────────────────────────────
    /// Re-insert a binary archive into ROM free space, repointing
    /// references.
    Write {
        /// ROM image to modify.
        #[arg(value_name = "ROM")]
        rom: PathBuf,
        /// Command database JSON.
        #[arg(long, value_name = "PATH")]
        db: PathBuf,
        /// Character table file.
        #[arg(long, value_name = "PATH")]
        table: Option<PathBuf>,
        /// Entry file naming the archives.
        #[arg(long, value_name = "PATH")]
        entries: PathBuf,
        /// Binary archive file (`<identifier>.msg`).
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,
        /// Free-space offset (hex) to place the archive at.
        #[arg(long, value_name = "HEX")]
        offset: String,
        /// Where to write the modified image (defaults to in place).
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    // ── Verification ─────────────────────────────────────────────────
    /// Round-trip test every archive recorded in the entry file.
    Test {
        /// ROM image to test against.
        #[arg(value_name = "ROM")]
        rom: PathBuf,
        /// Command database JSON.
        #[arg(long, value_name = "PATH")]
        db: PathBuf,
        /// Character table file.
        #[arg(long, value_name = "PATH")]
        table: Option<PathBuf>,
        /// Entry file naming the archives.
        #[arg(long, value_name = "PATH")]
        entries: PathBuf,
    },

    /// Validate an entry file and rewrite it in canonical form.
    Entries {
        /// Entry file to check.
        #[arg(value_name = "PATH")]
        file: PathBuf,
        /// Rewrite the file with canonical formatting and annotations.
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let format = Format::resolve(cli.output.as_deref());
    if let Err(err) = run(cli.cmd, format) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run(cmd: Cmd, format: Format) -> Result<()> {
    match cmd {
        Cmd::Scan {
            rom,
            db,
            table,
            entries,
            deep,
            pointers,
        } => {
            let mut driver = build_driver(&db, table.as_deref(), None)?;
            if let Some(path) = &entries
                && path.exists()
            {
                driver.load_entries(path)?;
            }
            let image = read_image(&rom)?;
            let options = ScanOptions {
                deep,
                update_entries: true,
                scan_pointers: pointers,
                read_to_end: false,
            };
            let archives = driver.scan_rom(&image, options);
            let index: Vec<_> = archives
                .iter()
                .filter_map(|a| {
                    textarc_core::parse_identifier_offset(&a.identifier)
                        .and_then(|offset| driver.entries().get(offset))
                })
                .collect();
            render::print_archives(format, &archives, &index);
            if let Some(path) = &entries {
                driver.save_entries(path)?;
            }
            Ok(())
        }

        Cmd::Read {
            rom,
            db,
            table,
            entries,
            out_dir,
            format: export,
        } => {
            let driver = build_driver(&db, table.as_deref(), Some(&entries))?;
            let image = read_image(&rom)?;
            let stem = file_stem(&rom);
            let archives = driver
                .read_rom_archives(&image, Some(&stem))
                .context("reading archives")?;
            fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let mut written = Vec::new();
            for archive in &archives {
                written.push(driver.export_archive(archive, &out_dir, export.into())?);
            }
            render::print_exports(format, &written);
            Ok(())
        }

        Cmd::Extract {
            rom,
            db,
            table,
            entries,
            out_dir,
        } => {
            let driver = build_driver(&db, table.as_deref(), Some(&entries))?;
            let image = read_image(&rom)?;
            let stem = file_stem(&rom);
            let archives = driver
                .read_rom_archives(&image, Some(&stem))
                .context("reading archives")?;
            fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let mut written = Vec::new();
            for archive in &archives {
                written.push(driver.export_archive(
                    archive,
                    &out_dir,
                    ArchiveFormat::TextBoxes,
                )?);
            }
            render::print_exports(format, &written);
            Ok(())
        }

        Cmd::Write {
            rom,
            db,
            table,
            entries,
            archive,
            offset,
            out,
        } => {
            let mut driver = build_driver(&db, table.as_deref(), Some(&entries))?;
            let mut image = read_image(&rom)?;
            let offset = parse_hex(&offset)?;
            let parsed = driver
                .read_archive_file(&archive)
                .with_context(|| format!("reading {}", archive.display()))?;
            driver
                .insert_rom_archive(&mut image, &parsed, offset)
                .context("inserting archive")?;
            let target = out.unwrap_or(rom);
            fs::write(&target, &image).with_context(|| format!("writing {}", target.display()))?;
            driver.save_entries(&entries)?;
            render::print_exports(format, &[target]);
            Ok(())
        }

        Cmd::Test {
            rom,
            db,
            table,
            entries,
        } => {
            let driver = build_driver(&db, table.as_deref(), Some(&entries))?;
            let image = read_image(&rom)?;
            let offsets: Vec<usize> = driver.entries().iter().map(|e| e.offset).collect();
            let mut reports = Vec::new();
            for offset in offsets {
                reports.push(driver.test_round_trip(&image, offset)?);
            }
            if !render::print_round_trips(format, &reports) {
                bail!("round-trip mismatches found");
            }
            Ok(())
        }

        Cmd::Entries { file, write } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let entries = RomEntries::parse(&text).context("parsing entry file")?;
            let canonical = entries.serialize();
            if write {
                fs::write(&file, canonical)
                    .with_context(|| format!("writing {}", file.display()))?;
            } else {
                print!("{canonical}");
            }
            Ok(())
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn build_driver(
    db: &Path,
    table: Option<&Path>,
    entries: Option<&Path>,
) -> Result<Driver> {
    let database =
        load_database_file(db).with_context(|| format!("loading database {}", db.display()))?;
    let mut driver = Driver::new(database);
    if let Some(table) = table {
        let encoding = load_encoding_file(table)
            .with_context(|| format!("loading table {}", table.display()))?;
        driver.set_encoding(encoding);
    }
    if let Some(entries) = entries {
        driver
            .load_entries(entries)
            .with_context(|| format!("loading entries {}", entries.display()))?;
    }
    Ok(driver)
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rom".to_string())
}

fn parse_hex(value: &str) -> Result<usize> {
    let trimmed = value.trim_start_matches("0x").trim_start_matches("0X");
    usize::from_str_radix(trimmed, 16).with_context(|| format!("bad hex offset {value:?}"))
}
