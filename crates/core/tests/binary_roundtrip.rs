//! Round-trip tests for the binary script reader and writer.
//!
//! Gold-standard guarantee: `write(read(bytes)) == bytes` for every
//! stream whose commands carry no rewind, and equal up to the final
//! command's rewind tail otherwise.

mod common;

use textarc_command_db::{EndType, ScriptElement};
use textarc_core::{ByteCursor, ScriptReader, ScriptWriter};

/// Read a whole buffer as one archive, re-encode it, and compare.
fn assert_roundtrip(bytes: &[u8]) {
    let db = common::database();
    let enc = common::encoding();
    let reader = ScriptReader::new(&db).with_encoding(&enc);
    let mut cursor = ByteCursor::new(bytes);
    let archive = reader
        .read_archive(&mut cursor, "test", bytes.len())
        .expect("read failed");
    let written = ScriptWriter::new(&db)
        .with_encoding(&enc)
        .write_archive(&archive)
        .expect("write failed");
    assert_eq!(
        written, bytes,
        "\n--- Round-trip failed ---\nArchive: {archive:#?}\n"
    );
}

// ── Single commands ─────────────────────────────────────────────────────

#[test]
fn terminator_stops_the_script_and_leaves_the_stream() {
    let db = common::database();
    let reader = ScriptReader::new(&db);
    let data = [0xE0, 0xFF];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    assert_eq!(common::shape(&script), vec!["end"]);
    assert_eq!(cursor.position(), 1, "0xFF must be left in the stream");
}

#[test]
fn bit_packed_parameter_decodes_and_reencodes() {
    let db = common::database();
    let reader = ScriptReader::new(&db);
    let data = [0x17];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    let ScriptElement::Command(cmd) = &script.elements[0] else {
        panic!("expected a command, got {script:?}");
    };
    assert_eq!(cmd.name(), "glyph");
    assert_eq!(
        cmd.elements()[0].entries()[0].parameter("value").unwrap().value(),
        7
    );
    assert_roundtrip(&[0x17, 0xE0]);
}

#[test]
fn data_entries_decode_group_major() {
    let db = common::database();
    let reader = ScriptReader::new(&db);
    let data = [0x80, 0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    let ScriptElement::Command(cmd) = &script.elements[0] else {
        panic!("expected a command");
    };
    let entries = cmd.elements()[0].entries();
    assert_eq!(entries.len(), 2);
    let row = |i: usize| {
        ["a", "b", "c"].map(|name| entries[i].parameter(name).unwrap().value())
    };
    assert_eq!(row(0), [0xAA, 0xBB, 0xCC]);
    assert_eq!(row(1), [0xDD, 0xEE, 0xFF]);
}

#[test]
fn data_entries_reencode_byte_exact() {
    assert_roundtrip(&[0x80, 0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0xE0]);
    assert_roundtrip(&[0x80, 0x00, 0xE0]);
}

// ── Text mode and fallback ──────────────────────────────────────────────

#[test]
fn unclaimed_bytes_decode_as_text_then_raw() {
    let db = common::database();
    let enc = common::encoding();
    let reader = ScriptReader::new(&db).with_encoding(&enc);
    // "hi" then an unmapped byte, then the terminator.
    let data = [0x68, 0x69, 0x05, 0xE0];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    assert_eq!(common::shape(&script), vec!["\"hi\"", "$05", "end"]);
}

#[test]
fn adjacent_text_coalesces_into_one_element() {
    let db = common::database();
    let enc = common::encoding();
    let reader = ScriptReader::new(&db).with_encoding(&enc);
    let data = [0x6F, 0x6C, 0x64, 0xE0];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    assert_eq!(common::shape(&script), vec!["\"old\"", "end"]);
}

#[test]
fn text_roundtrip_through_the_encoding() {
    assert_roundtrip(&[0x68, 0x65, 0x6C, 0x6C, 0x6F, 0x20, 0x68, 0x69, 0xE0]);
}

#[test]
fn without_an_encoding_bytes_stay_raw() {
    let db = common::database();
    let reader = ScriptReader::new(&db);
    let data = [0x68, 0xE0];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    assert_eq!(common::shape(&script), vec!["$68", "end"]);
}

// ── Multiple scripts ────────────────────────────────────────────────────

#[test]
fn archives_split_scripts_at_terminators() {
    let db = common::database();
    let reader = ScriptReader::new(&db);
    let data = [0x17, 0xE0, 0x80, 0x00, 0xE0];
    let mut cursor = ByteCursor::new(&data);
    let archive = reader.read_archive(&mut cursor, "two", data.len()).unwrap();
    assert_eq!(archive.scripts.len(), 2);
    assert_eq!(common::shape(&archive.scripts[0]), vec!["glyph", "end"]);
    assert_eq!(common::shape(&archive.scripts[1]), vec!["table", "end"]);
    assert_eq!(archive.identifier, "two");
}

#[test]
fn default_end_jump_does_not_stop_the_read() {
    let db = common::database();
    let reader = ScriptReader::new(&db);
    // A jump that always transfers ends the script logically, but only an
    // Always terminator stops the reader.
    let data = [0xF0, 0x00, 0xE0];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    assert_eq!(common::shape(&script), vec!["jump", "end"]);
    let ScriptElement::Command(jump) = &script.elements[0] else {
        panic!("expected the jump");
    };
    assert!(jump.ends_script());
}

// ── Rewind ──────────────────────────────────────────────────────────────

#[test]
fn rewind_overlaps_the_next_command() {
    let mut db = common::database();
    let mut over = textarc_command_db::CommandDefinition::new("over", vec![0xA0, 0x00], vec![0xFF, 0x00]);
    over.rewind_count = 1;
    db.add(over).unwrap();

    let reader = ScriptReader::new(&db);
    let data = [0xA0, 0xE0];
    let mut cursor = ByteCursor::new(&data);
    let script = reader.read_script(&mut cursor, data.len()).unwrap();
    assert_eq!(common::shape(&script), vec!["over", "end"]);

    // The writer truncates the rewound tail, so the overlapped byte is
    // emitted once, by the terminator.
    let mut out = Vec::new();
    ScriptWriter::new(&db).write_script(&script, &mut out).unwrap();
    assert_eq!(out, data);
}

// ── Writer validation ───────────────────────────────────────────────────

#[test]
fn directives_have_no_binary_form() {
    let db = common::database();
    let script = common::script(
        &db,
        vec![common::directive(textarc_command_db::DirectiveKind::TextBoxSeparator)],
    );
    let mut out = Vec::new();
    assert!(ScriptWriter::new(&db).write_script(&script, &mut out).is_err());
}

#[test]
fn text_without_an_encoding_fails_to_write() {
    let db = common::database();
    let script = common::script(&db, vec![common::text("hi")]);
    let mut out = Vec::new();
    assert!(ScriptWriter::new(&db).write_script(&script, &mut out).is_err());
}

#[test]
fn always_terminators_report_ends_script() {
    let db = common::database();
    let defs = db.find("end");
    assert_eq!(defs[0].end_type, EndType::Always);
}
