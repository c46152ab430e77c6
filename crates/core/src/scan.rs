//! The text-archive file/ROM scanner.
//!
//! Given a stream position, trial-reads a text archive: LZ77 trial
//! decompression first, then uncompressed parsing, then plausibility
//! gates. The gates never report errors; an implausible candidate is
//! simply "no archive here".

use textarc_command_db::{CommandDatabase, EndType, NO_JUMP, ScriptElement, TextArchive};

use crate::binary::ScriptReader;
use crate::encoding::TableEncoding;
use crate::entries::{RomEntries, RomEntry};
use crate::lz77;
use crate::stream::ByteCursor;

/// Options controlling a scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Skip the plausibility gates ("deep" scanning).
    pub deep: bool,
    /// Record newly discovered archives in the entry index.
    pub update_entries: bool,
    /// Sweep the whole stream for pointers to each found archive.
    pub scan_pointers: bool,
    /// Read uncompressed archives of unknown size to the end of the file
    /// instead of stopping at the first unterminated script.
    pub read_to_end: bool,
}

/// A successful scan: the archive and its location metadata.
#[derive(Debug)]
pub struct ScanHit {
    /// The parsed archive.
    pub archive: TextArchive,
    /// Where it was found and how it was stored.
    pub entry: RomEntry,
}

/// Trial-reads text archives out of ROM images and files.
pub struct TextArchiveScanner<'a> {
    database: &'a CommandDatabase,
    encoding: Option<&'a TableEncoding>,
    options: ScanOptions,
}

impl<'a> TextArchiveScanner<'a> {
    /// Create a scanner over the given database.
    pub fn new(database: &'a CommandDatabase, options: ScanOptions) -> Self {
        Self {
            database,
            encoding: None,
            options,
        }
    }

    /// Use `encoding` for text mode while trial-reading.
    pub fn with_encoding(mut self, encoding: &'a TableEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// The options this scanner runs with.
    pub fn options(&self) -> ScanOptions {
        self.options
    }

    /// Trial-read a text archive at `start`.
    ///
    /// Format errors are swallowed; the return is `None` whenever no
    /// plausible archive lives at `start`. When `update_entries` is set
    /// and the position was not already indexed, the discovered entry is
    /// added to `entries`.
    pub fn scan(
        &self,
        rom: &[u8],
        start: usize,
        entries: &mut RomEntries,
    ) -> Option<ScanHit> {
        if start >= rom.len() {
            return None;
        }
        let existing = entries.get(start).cloned();
        let identifier = format!("{start:06X}");

        let mut hit: Option<(TextArchive, RomEntry)> = None;
        if existing.as_ref().is_none_or(|e| e.compressed) {
            hit = self.scan_compressed(rom, start, &identifier);
        }
        if hit.is_none() {
            if existing.as_ref().is_some_and(|e| e.compressed) {
                // The index promised compressed data and it did not parse.
                return None;
            }
            hit = self.scan_uncompressed(rom, start, existing.as_ref(), entries, &identifier);
        }
        let (archive, mut entry) = hit?;
        if !self.options.deep && !plausible(&archive) {
            return None;
        }
        if self.options.scan_pointers {
            entry.pointers = Self::find_pointers(rom, start);
        }
        if self.options.update_entries && existing.is_none() {
            let _ = entries.add(entry.clone());
        }
        Some(ScanHit { archive, entry })
    }

    /// Walk the whole stream at 4-byte alignment, trial-reading an
    /// archive at every position not covered by a known entry.
    pub fn sweep(&self, rom: &[u8], entries: &mut RomEntries) -> Vec<TextArchive> {
        let mut found = Vec::new();
        let mut pos = 0usize;
        while pos + 4 <= rom.len() {
            if let Some(covering) = entries.covering(pos) {
                pos = align4(covering.end().max(pos + 4));
                continue;
            }
            match self.scan(rom, pos, entries) {
                Some(hit) => {
                    let next = align4(hit.entry.end().max(pos + 4));
                    found.push(hit.archive);
                    pos = next;
                }
                None => pos += 4,
            }
        }
        found
    }

    /// File offsets of every aligned little-endian word whose low 24 bits
    /// equal `offset` and whose remaining bits, after clearing bit 31,
    /// encode the 0x08 ROM-mapped base.
    pub fn find_pointers(rom: &[u8], offset: usize) -> Vec<usize> {
        let target = (offset as u32) & 0x00FF_FFFF;
        let mut out = Vec::new();
        let mut i = 0usize;
        while i + 4 <= rom.len() {
            let word = u32::from_le_bytes([rom[i], rom[i + 1], rom[i + 2], rom[i + 3]]);
            let masked = word & 0x7FFF_FFFF;
            if masked & 0x00FF_FFFF == target && masked >> 24 == 0x08 {
                out.push(i);
            }
            i += 4;
        }
        out
    }

    fn reader(&self) -> ScriptReader<'_> {
        let mut reader = ScriptReader::new(self.database);
        if let Some(encoding) = self.encoding {
            reader = reader.with_encoding(encoding);
        }
        reader
    }

    fn scan_compressed(
        &self,
        rom: &[u8],
        start: usize,
        identifier: &str,
    ) -> Option<(TextArchive, RomEntry)> {
        let (staging, consumed) = lz77::decompress(&rom[start..])?;
        let (data, size_header) = strip_size_header(&staging);
        let mut cursor = ByteCursor::new(data);
        let archive = self
            .reader()
            .read_archive(&mut cursor, identifier, data.len())
            .ok()?;
        let mut entry = RomEntry::new(start);
        entry.size = consumed;
        entry.compressed = true;
        entry.size_header = size_header;
        Some((archive, entry))
    }

    fn scan_uncompressed(
        &self,
        rom: &[u8],
        start: usize,
        existing: Option<&RomEntry>,
        entries: &RomEntries,
        identifier: &str,
    ) -> Option<(TextArchive, RomEntry)> {
        let reader = self.reader();
        let mut cursor = ByteCursor::new(rom);
        cursor.set_position(start).ok()?;
        let mut entry = RomEntry::new(start);

        if let Some(known) = existing.filter(|e| e.size > 0) {
            let end = known.end().min(rom.len());
            let archive = reader.read_archive(&mut cursor, identifier, end).ok()?;
            entry.size = known.size;
            entry.size_header = known.size_header;
            return Some((archive, entry));
        }
        if self.options.read_to_end {
            let archive = reader.read_archive(&mut cursor, identifier, rom.len()).ok()?;
            entry.size = cursor.position() - start;
            return Some((archive, entry));
        }

        // Unknown size: read script by script and discover the size from
        // where well-terminated scripts stop.
        let mut archive = TextArchive::new(identifier);
        let mut ends: Vec<usize> = Vec::new();
        while !cursor.is_at_end() {
            let Ok(script) = reader.read_script(&mut cursor, rom.len()) else {
                break;
            };
            let terminated = script_is_terminated(&script);
            archive.scripts.push(script);
            ends.push(cursor.position());
            if !terminated {
                break;
            }
        }
        // A trailing script without a terminating command is not part of
        // the archive.
        while archive.scripts.last().is_some_and(|s| !script_is_terminated(s)) {
            archive.scripts.pop();
            ends.pop();
        }
        // An unknown-size read must not run into a later known entry.
        if let Some(boundary) = entries.next_after(start).map(|e| e.offset) {
            while ends.last().is_some_and(|&end| end > boundary) {
                archive.scripts.pop();
                ends.pop();
            }
        }
        let end = *ends.last()?;
        entry.size = end - start;
        Some((archive, entry))
    }
}

/// Skip a leading `00 LL LL LL` size header when `LLLLLL` matches the
/// buffer's length or the length minus the header.
pub(crate) fn strip_size_header(staging: &[u8]) -> (&[u8], bool) {
    if staging.len() >= 4 && staging[0] == 0 {
        let stored = u32::from_le_bytes([staging[1], staging[2], staging[3], 0]) as usize;
        if stored == staging.len() || stored == staging.len() - 4 {
            return (&staging[4..], true);
        }
    }
    (staging, false)
}

/// Whether the script's last command always ends the script.
fn script_is_terminated(script: &textarc_command_db::Script) -> bool {
    script
        .elements
        .iter()
        .rev()
        .find_map(|element| match element {
            ScriptElement::Command(cmd) => Some(cmd.definition().end_type == EndType::Always),
            _ => None,
        })
        .unwrap_or(false)
}

/// The strict-mode plausibility gates.
///
/// An archive passes when at least one command has `end_type == Always`,
/// no script carries more than 3 elements after its first script-ending
/// element (rewind tolerates a small overflow), and no jump parameter
/// holds a non-sentinel value outside `[0, script_count)`.
fn plausible(archive: &TextArchive) -> bool {
    let script_count = archive.scripts.len() as i64;
    let mut any_always = false;
    for script in &archive.scripts {
        let mut ended = false;
        let mut after_end = 0usize;
        for element in &script.elements {
            if ended {
                after_end += 1;
            }
            if let ScriptElement::Command(cmd) = element {
                if cmd.definition().end_type == EndType::Always {
                    any_always = true;
                }
                for par in cmd.parameters() {
                    if par.definition().is_jump {
                        let value = par.value();
                        if value != NO_JUMP && (value < 0 || value >= script_count) {
                            return false;
                        }
                    }
                }
                if !ended && cmd.ends_script() {
                    ended = true;
                }
            }
        }
        if after_end > 3 {
            return false;
        }
    }
    any_always
}

fn align4(value: usize) -> usize {
    (value + 3) & !3
}
