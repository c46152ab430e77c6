//! The persistent ROM entry index.
//!
//! Maps archive offsets to their size, compression flags, and the file
//! offsets of pointers referencing them. Persisted as plain text, one
//! entry per line:
//!
//! ```text
//! <OFFSET_HEX>  <SIZE_HEX>  <FLAGS>  [pointer_hex ...]
//! ```
//!
//! `FLAGS` is a set from `{C, H}` (compressed, size-header), written as
//! `-` when empty. Lines beginning with `#` are comments; the writer
//! interleaves gap, overlap, and pointer warnings as comments, which the
//! parser ignores.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{Error, Result};

/// One known text archive location in a ROM or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RomEntry {
    /// File offset the archive starts at.
    pub offset: usize,
    /// Size of the archive's byte region (compressed size when
    /// `compressed` is set).
    pub size: usize,
    /// Whether the region holds an LZ77 stream.
    pub compressed: bool,
    /// Whether the decompressed stream carries a 4-byte length header.
    pub size_header: bool,
    /// File offsets of 32-bit pointers referencing this archive.
    pub pointers: Vec<usize>,
}

impl RomEntry {
    /// Create an uncompressed entry of unknown size.
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            size: 0,
            compressed: false,
            size_header: false,
            pointers: Vec::new(),
        }
    }

    /// One past the last byte of the entry's region.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// The entry index, ordered by offset.
#[derive(Debug, Clone, Default)]
pub struct RomEntries {
    entries: BTreeMap<usize, RomEntry>,
}

impl RomEntries {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a new entry. Two entries may not share an offset.
    pub fn add(&mut self, entry: RomEntry) -> Result<()> {
        if self.entries.contains_key(&entry.offset) {
            return Err(Error::Inconsistency(format!(
                "two entries share offset 0x{:06X}",
                entry.offset
            )));
        }
        self.entries.insert(entry.offset, entry);
        Ok(())
    }

    /// Insert or overwrite the entry at its offset.
    pub fn replace(&mut self, entry: RomEntry) {
        self.entries.insert(entry.offset, entry);
    }

    /// Remove and return the entry at `offset`.
    pub fn remove(&mut self, offset: usize) -> Option<RomEntry> {
        self.entries.remove(&offset)
    }

    /// The entry starting exactly at `offset`.
    pub fn get(&self, offset: usize) -> Option<&RomEntry> {
        self.entries.get(&offset)
    }

    /// The first entry starting strictly after `offset`.
    pub fn next_after(&self, offset: usize) -> Option<&RomEntry> {
        self.entries
            .range(offset + 1..)
            .next()
            .map(|(_, entry)| entry)
    }

    /// The entry whose byte region contains `position`, if any.
    pub fn covering(&self, position: usize) -> Option<&RomEntry> {
        self.entries
            .range(..=position)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| position < entry.end() || entry.offset == position)
    }

    /// Iterate over entries in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &RomEntry> {
        self.entries.values()
    }

    /// Parse the text persistence format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = RomEntries::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.add(parse_line(line, number + 1)?)?;
        }
        Ok(entries)
    }

    /// Serialise to the text persistence format, interleaving write-only
    /// gap, overlap, and pointer warnings.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str("# text archive entries\n");
        out.push_str("# offset  size    flags  pointers\n");
        let mut previous_end: Option<usize> = None;
        for entry in self.entries.values() {
            if let Some(end) = previous_end {
                if entry.offset > end {
                    let _ = writeln!(out, "# gap: 0x{:X} bytes", entry.offset - end);
                } else if entry.offset < end {
                    let _ = writeln!(
                        out,
                        "# warning: overlaps previous entry by 0x{:X} bytes",
                        end - entry.offset
                    );
                }
            }
            if entry.pointers.is_empty() {
                let _ = writeln!(
                    out,
                    "# warning: no pointers reference 0x{:06X}",
                    entry.offset
                );
            }
            let mut flags = String::new();
            if entry.compressed {
                flags.push('C');
            }
            if entry.size_header {
                flags.push('H');
            }
            if flags.is_empty() {
                flags.push('-');
            }
            let _ = write!(out, "{:06X}  {:06X}  {:<5}", entry.offset, entry.size, flags);
            for pointer in &entry.pointers {
                let _ = write!(out, "  {pointer:06X}");
            }
            out.push('\n');
            previous_end = Some(entry.end());
        }
        out
    }
}

fn parse_line(line: &str, number: usize) -> Result<RomEntry> {
    let mut tokens = line.split_whitespace();
    let offset = parse_hex(tokens.next(), "offset", number)?;
    let size = parse_hex(tokens.next(), "size", number)?;
    let flags = tokens
        .next()
        .ok_or_else(|| Error::invalid("entry file", format!("line {number}: missing flags")))?;

    let mut entry = RomEntry::new(offset);
    entry.size = size;
    for flag in flags.chars() {
        match flag {
            'C' => entry.compressed = true,
            'H' => entry.size_header = true,
            '-' => {}
            other => {
                return Err(Error::invalid(
                    "entry file",
                    format!("line {number}: unknown flag {other:?}"),
                ));
            }
        }
    }
    for token in tokens {
        entry.pointers.push(parse_hex(Some(token), "pointer", number)?);
    }
    Ok(entry)
}

fn parse_hex(token: Option<&str>, what: &str, number: usize) -> Result<usize> {
    let token =
        token.ok_or_else(|| Error::invalid("entry file", format!("line {number}: missing {what}")))?;
    usize::from_str_radix(token, 16)
        .map_err(|_| Error::invalid("entry file", format!("line {number}: bad {what} {token:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_flags_and_pointers() {
        let text = "# comment\n012345  0001A0  CH  0801F0  080220\n00F000 000010 -\n";
        let entries = RomEntries::parse(text).unwrap();
        assert_eq!(entries.len(), 2);
        let entry = entries.get(0x012345).unwrap();
        assert_eq!(entry.size, 0x1A0);
        assert!(entry.compressed);
        assert!(entry.size_header);
        assert_eq!(entry.pointers, vec![0x0801F0, 0x080220]);
        let plain = entries.get(0xF000).unwrap();
        assert!(!plain.compressed && !plain.size_header);
    }

    #[test]
    fn serialize_round_trips_through_parse() {
        let mut entries = RomEntries::new();
        let mut a = RomEntry::new(0x1000);
        a.size = 0x20;
        a.compressed = true;
        a.pointers = vec![0x08_0040];
        entries.add(a).unwrap();
        let mut b = RomEntry::new(0x2000);
        b.size = 0x10;
        b.size_header = true;
        entries.add(b).unwrap();

        let text = entries.serialize();
        let reparsed = RomEntries::parse(&text).unwrap();
        assert_eq!(reparsed.len(), 2);
        assert_eq!(reparsed.get(0x1000).unwrap(), entries.get(0x1000).unwrap());
        assert_eq!(reparsed.get(0x2000).unwrap(), entries.get(0x2000).unwrap());
        // The gap between 0x1020 and 0x2000 is annotated.
        assert!(text.contains("# gap"));
    }

    #[test]
    fn duplicate_offsets_are_inconsistent() {
        let mut entries = RomEntries::new();
        entries.add(RomEntry::new(0x10)).unwrap();
        assert!(entries.add(RomEntry::new(0x10)).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(RomEntries::parse("000010 000001 X\n").is_err());
    }

    #[test]
    fn covering_and_next_after_honour_ranges() {
        let mut entries = RomEntries::new();
        let mut entry = RomEntry::new(0x100);
        entry.size = 0x40;
        entries.add(entry).unwrap();
        assert!(entries.covering(0x100).is_some());
        assert!(entries.covering(0x13F).is_some());
        assert!(entries.covering(0x140).is_none());
        assert_eq!(entries.next_after(0x100).map(|e| e.offset), None);
        assert_eq!(entries.next_after(0xFF).map(|e| e.offset), Some(0x100));
    }
}
