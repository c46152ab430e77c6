//! The core driver: orchestrates read, write, scan, patch, and
//! round-trip-test flows over one command database, one optional
//! encoding, and one entry index.

use std::fs;
use std::path::{Path, PathBuf};

use textarc_command_db::{
    CommandDatabase, Directive, DirectiveKind, Script, ScriptElement, TextArchive, to_pretty_json,
};

use crate::binary::{ScriptReader, ScriptWriter};
use crate::encoding::TableEncoding;
use crate::entries::RomEntries;
use crate::error::{Error, Result};
use crate::lz77;
use crate::patch;
use crate::scan::{ScanOptions, TextArchiveScanner, strip_size_header};
use crate::stream::ByteCursor;

/// Output formats for exported archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    /// Raw binary script bytes (`.msg`).
    #[default]
    Binary,
    /// Pretty-printed JSON dump of the parsed archive (`.json`).
    Structured,
    /// Text-box extract (`.txt`).
    TextBoxes,
}

impl ArchiveFormat {
    /// Default file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Binary => "msg",
            ArchiveFormat::Structured => "json",
            ArchiveFormat::TextBoxes => "txt",
        }
    }

    /// Parse a format keyword.
    pub fn from_keyword(keyword: &str) -> Result<Self> {
        match keyword {
            "msg" | "binary" => Ok(ArchiveFormat::Binary),
            "json" | "structured" => Ok(ArchiveFormat::Structured),
            "txt" | "text-boxes" => Ok(ArchiveFormat::TextBoxes),
            other => Err(Error::invalid(
                "format",
                format!("unknown format keyword {other:?}"),
            )),
        }
    }
}

/// Result of a round-trip self test for one archive.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTripReport {
    /// The archive's identifier.
    pub identifier: String,
    /// Length of the original payload bytes.
    pub original_len: usize,
    /// Length of the re-encoded bytes.
    pub written_len: usize,
    /// Offset of the first differing byte within the common prefix.
    pub first_mismatch: Option<usize>,
}

impl RoundTripReport {
    /// Whether the re-encoding reproduces the original, allowing the
    /// final command's rewind tail to be dropped.
    pub fn is_match(&self) -> bool {
        self.first_mismatch.is_none() && self.written_len <= self.original_len
    }

    /// Original bytes the re-encoding did not reproduce at the tail.
    pub fn tail_slack(&self) -> usize {
        self.original_len.saturating_sub(self.written_len)
    }
}

/// The core API: one database, one optional encoding, one entry index.
pub struct Driver {
    database: CommandDatabase,
    encoding: Option<TableEncoding>,
    entries: RomEntries,
}

impl Driver {
    /// Create a driver over the given database with an empty entry index.
    pub fn new(database: CommandDatabase) -> Self {
        Self {
            database,
            encoding: None,
            entries: RomEntries::new(),
        }
    }

    /// The active command database.
    pub fn database(&self) -> &CommandDatabase {
        &self.database
    }

    /// Install the character encoding used for text elements.
    pub fn set_encoding(&mut self, encoding: TableEncoding) {
        self.encoding = Some(encoding);
    }

    /// The entry index.
    pub fn entries(&self) -> &RomEntries {
        &self.entries
    }

    /// The entry index, mutably.
    pub fn entries_mut(&mut self) -> &mut RomEntries {
        &mut self.entries
    }

    /// Load the entry index from its text persistence file.
    pub fn load_entries(&mut self, path: &Path) -> Result<()> {
        let text = String::from_utf8_lossy(&read_file(path)?).into_owned();
        self.entries = RomEntries::parse(&text)?;
        Ok(())
    }

    /// Save the entry index to its text persistence file.
    pub fn save_entries(&self, path: &Path) -> Result<()> {
        fs::write(path, self.entries.serialize())?;
        Ok(())
    }

    fn reader(&self) -> ScriptReader<'_> {
        let mut reader = ScriptReader::new(&self.database);
        if let Some(encoding) = &self.encoding {
            reader = reader.with_encoding(encoding);
        }
        reader
    }

    fn writer(&self) -> ScriptWriter<'_> {
        let mut writer = ScriptWriter::new(&self.database);
        if let Some(encoding) = &self.encoding {
            writer = writer.with_encoding(encoding);
        }
        writer
    }

    // ── Reading ─────────────────────────────────────────────────────────

    /// Parse a whole byte buffer as one text archive.
    pub fn read_archive_bytes(&self, data: &[u8], identifier: &str) -> Result<TextArchive> {
        let mut cursor = ByteCursor::new(data);
        self.reader().read_archive(&mut cursor, identifier, data.len())
    }

    /// Read a binary archive file; the identifier is the file stem.
    pub fn read_archive_file(&self, path: &Path) -> Result<TextArchive> {
        let data = read_file(path)?;
        let identifier = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        self.read_archive_bytes(&data, &identifier)
    }

    /// Read the archive recorded at `offset` in the entry index.
    ///
    /// Unlike the scanner, this is a direct read: format errors
    /// propagate, and an entry that declares compressed data which does
    /// not decompress is an inconsistency.
    pub fn read_rom_archive(
        &self,
        rom: &[u8],
        offset: usize,
        stem: Option<&str>,
    ) -> Result<TextArchive> {
        let entry = self
            .entries
            .get(offset)
            .ok_or_else(|| Error::invalid("offset", format!("no entry at 0x{offset:06X}")))?
            .clone();
        if offset >= rom.len() {
            return Err(Error::invalid(
                "offset",
                format!("0x{offset:06X} is past the end of the image"),
            ));
        }
        let identifier = archive_identifier(stem, offset);
        if entry.compressed {
            let (staging, _) = lz77::decompress(&rom[offset..]).ok_or_else(|| {
                Error::Inconsistency(format!(
                    "entry 0x{offset:06X} declares compressed data that does not decompress"
                ))
            })?;
            let (data, _) = strip_size_header(&staging);
            let mut cursor = ByteCursor::new(data);
            self.reader().read_archive(&mut cursor, &identifier, data.len())
        } else {
            let end = if entry.size > 0 {
                entry.end().min(rom.len())
            } else {
                rom.len()
            };
            let mut cursor = ByteCursor::new(rom);
            cursor.set_position(offset)?;
            self.reader().read_archive(&mut cursor, &identifier, end)
        }
    }

    /// Read every archive the entry index records.
    pub fn read_rom_archives(&self, rom: &[u8], stem: Option<&str>) -> Result<Vec<TextArchive>> {
        let offsets: Vec<usize> = self.entries.iter().map(|e| e.offset).collect();
        offsets
            .into_iter()
            .map(|offset| self.read_rom_archive(rom, offset, stem))
            .collect()
    }

    /// Sweep a whole image for archives, updating the entry index as
    /// options dictate.
    pub fn scan_rom(&mut self, rom: &[u8], options: ScanOptions) -> Vec<TextArchive> {
        let mut scanner = TextArchiveScanner::new(&self.database, options);
        if let Some(encoding) = &self.encoding {
            scanner = scanner.with_encoding(encoding);
        }
        scanner.sweep(rom, &mut self.entries)
    }

    // ── Writing ─────────────────────────────────────────────────────────

    /// Serialise an archive to raw binary script bytes.
    pub fn write_archive_bytes(&self, archive: &TextArchive) -> Result<Vec<u8>> {
        self.writer().write_archive(archive)
    }

    /// Write one archive into `dir` as `<identifier>.<ext>`.
    pub fn export_archive(
        &self,
        archive: &TextArchive,
        dir: &Path,
        format: ArchiveFormat,
    ) -> Result<PathBuf> {
        let path = dir.join(format!("{}.{}", archive.identifier, format.extension()));
        let contents = match format {
            ArchiveFormat::Binary => self.write_archive_bytes(archive)?,
            ArchiveFormat::Structured => to_pretty_json(archive)
                .map_err(|e| Error::Inconsistency(format!("JSON dump failed: {e}")))?
                .into_bytes(),
            ArchiveFormat::TextBoxes => {
                render_text_boxes(&self.extract_text_boxes(archive)).into_bytes()
            }
        };
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Re-insert an archive into the image at `new_offset`, re-encoding
    /// (and re-compressing when its entry is marked compressed) and
    /// repointing every recorded pointer.
    pub fn insert_rom_archive(
        &mut self,
        rom: &mut [u8],
        archive: &TextArchive,
        new_offset: usize,
    ) -> Result<()> {
        let old_offset = parse_identifier_offset(&archive.identifier).ok_or_else(|| {
            Error::invalid(
                "identifier",
                format!("{:?} does not name an offset", archive.identifier),
            )
        })?;
        let entry = self
            .entries
            .get(old_offset)
            .cloned()
            .ok_or_else(|| Error::invalid("archive", format!("no entry at 0x{old_offset:06X}")))?;

        let mut data = self.write_archive_bytes(archive)?;
        if entry.size_header {
            let len = data.len() as u32;
            let mut framed = vec![0u8, len as u8, (len >> 8) as u8, (len >> 16) as u8];
            framed.extend_from_slice(&data);
            data = framed;
        }
        if entry.compressed {
            data = lz77::compress(&data)?;
        }

        let end = new_offset
            .checked_add(data.len())
            .filter(|&end| end <= rom.len())
            .ok_or_else(|| {
                Error::invalid("offset", format!("archive does not fit at 0x{new_offset:06X}"))
            })?;
        for other in self.entries.iter() {
            if other.offset != old_offset && new_offset < other.end() && other.offset < end {
                return Err(Error::Inconsistency(format!(
                    "free space at 0x{new_offset:06X} overlaps entry 0x{:06X}",
                    other.offset
                )));
            }
        }

        rom[new_offset..end].copy_from_slice(&data);
        for &pointer in &entry.pointers {
            if pointer + 4 > rom.len() {
                return Err(Error::Inconsistency(format!(
                    "pointer offset 0x{pointer:06X} is past the end of the image"
                )));
            }
            let word = u32::from_le_bytes([
                rom[pointer],
                rom[pointer + 1],
                rom[pointer + 2],
                rom[pointer + 3],
            ]);
            let new_word = (word & 0xFF00_0000) | (new_offset as u32 & 0x00FF_FFFF);
            rom[pointer..pointer + 4].copy_from_slice(&new_word.to_le_bytes());
        }

        self.entries.remove(old_offset);
        let mut moved = entry;
        moved.offset = new_offset;
        moved.size = data.len();
        self.entries.add(moved)
    }

    // ── Text boxes & patching ───────────────────────────────────────────

    /// Reduce an archive to its text boxes: printed elements with
    /// separator and split directives marking the box boundaries.
    pub fn extract_text_boxes(&self, archive: &TextArchive) -> TextArchive {
        let mut out = TextArchive::new(archive.identifier.clone());
        for (index, script) in archive.scripts.iter().enumerate() {
            let mut extracted = Script::new(script.database_name.clone());
            extracted.elements.push(ScriptElement::Directive(Directive {
                kind: DirectiveKind::Script,
                value: index.to_string(),
            }));
            let elements = &script.elements;
            let mut i = 0usize;
            let mut seen_box = false;
            while i < elements.len() {
                let span_start = i;
                while i < elements.len() && !elements[i].is_printed() {
                    i += 1;
                }
                if i >= elements.len() {
                    break;
                }
                if seen_box {
                    let kind = if patch::boundary_is_split(&self.database, elements, span_start) {
                        DirectiveKind::TextBoxSplit
                    } else {
                        DirectiveKind::TextBoxSeparator
                    };
                    extracted
                        .elements
                        .push(ScriptElement::Directive(Directive::new(kind)));
                }
                while i < elements.len() && !elements[i].ends_text_box() {
                    extracted.elements.push(elements[i].clone());
                    i += 1;
                }
                seen_box = true;
            }
            out.scripts.push(extracted);
        }
        out
    }

    /// Apply a text-box patch archive to a base archive.
    pub fn patch_archive(&self, base: &mut TextArchive, patch: &TextArchive) -> Result<()> {
        patch::patch_archive(&self.database, base, patch)
    }

    // ── Self test ───────────────────────────────────────────────────────

    /// Read the archive at `offset`, re-encode it, and compare the bytes.
    pub fn test_round_trip(&self, rom: &[u8], offset: usize) -> Result<RoundTripReport> {
        let entry = self
            .entries
            .get(offset)
            .cloned()
            .ok_or_else(|| Error::invalid("offset", format!("no entry at 0x{offset:06X}")))?;
        let archive = self.read_rom_archive(rom, offset, None)?;
        let written = self.write_archive_bytes(&archive)?;
        let original: Vec<u8> = if entry.compressed {
            let (staging, _) = lz77::decompress(&rom[offset..]).ok_or_else(|| {
                Error::Inconsistency(format!(
                    "entry 0x{offset:06X} declares compressed data that does not decompress"
                ))
            })?;
            let (data, _) = strip_size_header(&staging);
            data.to_vec()
        } else {
            let end = if entry.size > 0 {
                entry.end().min(rom.len())
            } else {
                (offset + written.len()).min(rom.len())
            };
            rom[offset..end].to_vec()
        };
        let first_mismatch = written
            .iter()
            .zip(original.iter())
            .position(|(a, b)| a != b);
        Ok(RoundTripReport {
            identifier: archive.identifier,
            original_len: original.len(),
            written_len: written.len(),
            first_mismatch,
        })
    }
}

/// Load a command database from a JSON file.
pub fn load_database_file(path: &Path) -> Result<CommandDatabase> {
    let text = String::from_utf8_lossy(&read_file(path)?).into_owned();
    Ok(CommandDatabase::from_json(&text)?)
}

/// Load a character table from a `XX=str` table file.
pub fn load_encoding_file(path: &Path) -> Result<TableEncoding> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());
    let text = String::from_utf8_lossy(&read_file(path)?).into_owned();
    TableEncoding::from_table_file(name, &text)
}

/// `<stem>_<OFFSET>` or the bare 6-digit uppercase hex offset.
pub fn archive_identifier(stem: Option<&str>, offset: usize) -> String {
    match stem {
        Some(stem) => format!("{stem}_{offset:06X}"),
        None => format!("{offset:06X}"),
    }
}

/// Recover the offset from an archive identifier.
pub fn parse_identifier_offset(identifier: &str) -> Option<usize> {
    let hex = identifier.rsplit('_').next().unwrap_or(identifier);
    usize::from_str_radix(hex, 16).ok()
}

fn render_text_boxes(extract: &TextArchive) -> String {
    let mut out = String::new();
    for script in &extract.scripts {
        for element in &script.elements {
            match element {
                ScriptElement::Text { text } => {
                    out.push_str(text);
                    out.push('\n');
                }
                ScriptElement::Byte { value } => {
                    out.push_str(&format!("[${value:02X}]\n"));
                }
                ScriptElement::Command(cmd) => {
                    out.push_str(&format!("<{}>\n", cmd.name()));
                }
                ScriptElement::Directive(directive) => match directive.kind {
                    DirectiveKind::Script => {
                        out.push_str(&format!("# script {}\n", directive.value));
                    }
                    DirectiveKind::TextArchive => {
                        out.push_str(&format!("# archive {}\n", directive.value));
                    }
                    DirectiveKind::TextBoxSeparator => out.push_str("----\n"),
                    DirectiveKind::TextBoxSplit => out.push_str("====\n"),
                },
            }
        }
    }
    out
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(Error::invalid(
            "file",
            format!("{} does not exist", path.display()),
        ));
    }
    Ok(fs::read(path)?)
}
