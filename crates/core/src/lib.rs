//! textarc core library.
//!
//! Extracts, edits, and re-inserts script text archives from the ROM
//! images of old handheld-console games. The main entry points are
//! [`Driver`] for the orchestrated flows, [`ScriptReader`] /
//! [`ScriptWriter`] for the binary script codec, and
//! [`TextArchiveScanner`] for heuristic discovery.

#![warn(missing_docs)]

/// The binary script codec.
pub mod binary;
/// The core driver API.
pub mod driver;
/// Lookup-table character encoding.
pub mod encoding;
/// The persistent ROM entry index.
pub mod entries;
/// Error types.
pub mod error;
/// LZ77 trial codec in the handheld BIOS format.
pub mod lz77;
/// The text-box patcher.
pub mod patch;
/// The text-archive file/ROM scanner.
pub mod scan;
/// The in-memory byte cursor.
pub mod stream;

// ── Convenience re-exports ──────────────────────────────────────────────────

// Model types (re-exported from the command-db crate)
pub use textarc_command_db::{
    Command, CommandDatabase, CommandDefinition, Script, ScriptElement, TextArchive,
};

pub use binary::{ScriptReader, ScriptWriter};
pub use driver::{
    ArchiveFormat, Driver, RoundTripReport, archive_identifier, load_database_file,
    load_encoding_file, parse_identifier_offset,
};
pub use encoding::{TableEncoding, parameter_string, set_parameter_string};
pub use entries::{RomEntries, RomEntry};
pub use error::{Error, Result};
pub use patch::patch_archive;
pub use scan::{ScanHit, ScanOptions, TextArchiveScanner};
pub use stream::ByteCursor;
