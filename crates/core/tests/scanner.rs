//! Scanner tests: trial decompression, size discovery, plausibility
//! gates, pointer scanning, and entry bookkeeping.

mod common;

use textarc_core::{RomEntries, RomEntry, ScanOptions, TextArchiveScanner, lz77};

fn scanner(db: &textarc_command_db::CommandDatabase, options: ScanOptions) -> TextArchiveScanner<'_> {
    TextArchiveScanner::new(db, options)
}

// ── Uncompressed discovery ──────────────────────────────────────────────

#[test]
fn finds_an_uncompressed_archive_and_discovers_its_size() {
    let db = common::database();
    let mut entries = RomEntries::new();
    // glyph+end, then junk that never terminates.
    let rom = [0x17, 0xE0, 0x05, 0x06, 0x07];
    let hit = scanner(&db, ScanOptions::default())
        .scan(&rom, 0, &mut entries)
        .expect("archive expected");
    assert_eq!(hit.archive.scripts.len(), 1);
    assert_eq!(hit.entry.size, 2);
    assert!(!hit.entry.compressed);
    assert_eq!(hit.archive.identifier, "000000");
}

#[test]
fn junk_without_a_terminator_is_no_archive() {
    let db = common::database();
    let mut entries = RomEntries::new();
    let rom = [0x05, 0x06, 0x07, 0x08];
    assert!(scanner(&db, ScanOptions::default()).scan(&rom, 0, &mut entries).is_none());
}

#[test]
fn unknown_size_read_stops_at_the_next_known_entry() {
    let db = common::database();
    let mut entries = RomEntries::new();
    let mut later = RomEntry::new(2);
    later.size = 2;
    entries.add(later).unwrap();
    // Without the boundary this would read two scripts; the second one
    // crosses into the known entry at offset 2 and is dropped.
    let rom = [0x17, 0xE0, 0x17, 0xE0];
    let hit = scanner(&db, ScanOptions::default())
        .scan(&rom, 0, &mut entries)
        .expect("archive expected");
    assert_eq!(hit.archive.scripts.len(), 1);
    assert_eq!(hit.entry.size, 2);
}

// ── Compressed discovery ────────────────────────────────────────────────

#[test]
fn lz77_archive_with_size_header_is_found() {
    let db = common::database();
    let mut entries = RomEntries::new();
    // 8 plausible payload bytes behind a 4-byte size header.
    let payload = [0x17u8, 0xE0, 0x80, 0x01, 0x2A, 0x2B, 0x2C, 0xE0];
    let mut staging = vec![0x00, payload.len() as u8, 0x00, 0x00];
    staging.extend_from_slice(&payload);
    let mut rom = lz77::compress(&staging).unwrap();
    let compressed_len = rom.len();
    rom.extend_from_slice(&[0x00, 0x00]);

    let hit = scanner(&db, ScanOptions { update_entries: true, ..Default::default() })
        .scan(&rom, 0, &mut entries)
        .expect("archive expected");
    assert!(hit.entry.compressed);
    assert!(hit.entry.size_header);
    assert_eq!(hit.entry.size, compressed_len);
    assert_eq!(hit.archive.scripts.len(), 2);
    assert_eq!(entries.get(0).unwrap(), &hit.entry);
}

#[test]
fn entry_forcing_compression_rejects_plain_bytes() {
    let db = common::database();
    let mut entries = RomEntries::new();
    let mut entry = RomEntry::new(0);
    entry.compressed = true;
    entry.size = 2;
    entries.add(entry).unwrap();
    let rom = [0x17, 0xE0];
    assert!(scanner(&db, ScanOptions::default()).scan(&rom, 0, &mut entries).is_none());
}

// ── Plausibility gates ──────────────────────────────────────────────────

#[test]
fn out_of_bounds_jump_fails_strict_but_passes_deep() {
    let db = common::database();
    // Two scripts; the jump target 5 is outside [0, 2).
    let rom = [0xF0, 0x05, 0xE0, 0x17, 0xE0];

    let mut entries = RomEntries::new();
    assert!(scanner(&db, ScanOptions::default()).scan(&rom, 0, &mut entries).is_none());

    let mut entries = RomEntries::new();
    let hit = scanner(&db, ScanOptions { deep: true, ..Default::default() })
        .scan(&rom, 0, &mut entries)
        .expect("deep scan accepts");
    assert_eq!(hit.archive.scripts.len(), 2);
}

#[test]
fn no_jump_sentinel_passes_strict() {
    let db = common::database();
    let rom = [0xF0, 0xFF, 0xE0];
    let mut entries = RomEntries::new();
    assert!(scanner(&db, ScanOptions::default()).scan(&rom, 0, &mut entries).is_some());
}

#[test]
fn in_bounds_jump_passes_strict() {
    let db = common::database();
    let rom = [0xF0, 0x01, 0xE0, 0x17, 0xE0];
    let mut entries = RomEntries::new();
    let hit = scanner(&db, ScanOptions::default()).scan(&rom, 0, &mut entries);
    assert!(hit.is_some());
}

// ── Pointer scan ────────────────────────────────────────────────────────

#[test]
fn pointer_scan_finds_rom_mapped_words() {
    let db = common::database();
    let mut entries = RomEntries::new();
    let mut rom = vec![0u8; 8];
    // A pointer to offset 8 (0x08000008, little-endian), then the archive.
    rom[0..4].copy_from_slice(&0x0800_0008u32.to_le_bytes());
    // Bit 31 set must still match after masking.
    rom[4..8].copy_from_slice(&0x8800_0008u32.to_le_bytes());
    rom.extend_from_slice(&[0x17, 0xE0]);

    let hit = scanner(&db, ScanOptions { scan_pointers: true, ..Default::default() })
        .scan(&rom, 8, &mut entries)
        .expect("archive expected");
    assert_eq!(hit.entry.pointers, vec![0, 4]);
    assert_eq!(hit.archive.identifier, "000008");
}

#[test]
fn unaligned_and_wrong_base_words_are_not_pointers() {
    let mut rom = vec![0u8; 4];
    rom.extend_from_slice(&0x0700_0008u32.to_le_bytes());
    let pointers = TextArchiveScanner::find_pointers(&rom, 8);
    assert!(pointers.is_empty());
}

// ── Sweep ───────────────────────────────────────────────────────────────

#[test]
fn sweep_collects_archives_and_updates_entries() {
    let db = common::database();
    let mut entries = RomEntries::new();
    // Two adjacent scripts parse as one archive; the junk tail does not.
    let rom = [0x17, 0xE0, 0x19, 0xE0, 0x05, 0x05, 0x05, 0x05];

    let found = scanner(&db, ScanOptions { update_entries: true, ..Default::default() })
        .sweep(&rom, &mut entries);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].scripts.len(), 2);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.get(0).unwrap().size, 4);
}
