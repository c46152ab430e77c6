//! End-to-end CLI tests: scan → read → extract → test over a synthetic
//! image.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::cargo;

fn textarc_cmd() -> Command {
    Command::new(cargo::cargo_bin!("textarc"))
}

const DB_JSON: &str = r#"{
  "name": "cli-test",
  "commands": [
    { "name": "end", "base": [224], "mask": [255], "endType": "always" },
    {
      "name": "glyph",
      "base": [16],
      "mask": [240],
      "prints": true,
      "elements": [
        {
          "name": "args",
          "dataGroups": [
            { "parameters": [ { "name": "value", "bits": 4 } ] }
          ]
        }
      ]
    }
  ]
}"#;

const TABLE: &str = "68=h\n69=i\n";

struct Fixture {
    _dir: tempfile::TempDir,
    db: PathBuf,
    table: PathBuf,
    rom: PathBuf,
    root: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_path_buf();
    let db = root.join("commands.json");
    fs::write(&db, DB_JSON).expect("write db");
    let table = root.join("chars.tbl");
    fs::write(&table, TABLE).expect("write table");
    let rom = root.join("game.gba");
    // Archive at 0: glyph(7) + "hi" + end, then junk.
    fs::write(&rom, [0x17, 0x68, 0x69, 0xE0, 0x05, 0x05, 0x05, 0x05]).expect("write rom");
    Fixture {
        _dir: dir,
        db,
        table,
        rom,
        root,
    }
}

fn run_ok(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run textarc");
    assert!(
        output.status.success(),
        "expected success, stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn common_args(cmd: &mut Command, sub: &str, fx: &Fixture, entries: &Path) {
    cmd.arg(sub)
        .arg(&fx.rom)
        .arg("--db")
        .arg(&fx.db)
        .arg("--table")
        .arg(&fx.table)
        .arg("--entries")
        .arg(entries);
}

#[test]
fn scan_finds_the_archive_and_writes_entries() {
    let fx = fixture();
    let entries = fx.root.join("entries.txt");

    let mut cmd = textarc_cmd();
    common_args(&mut cmd, "scan", &fx, &entries);
    cmd.args(["--output", "json"]);
    let stdout = run_ok(&mut cmd);
    assert!(
        stdout.contains("\"identifier\":\"000000\""),
        "missing archive in scan output: {stdout}"
    );

    let text = fs::read_to_string(&entries).expect("entries written");
    assert!(text.contains("000000  000004"), "entry file:\n{text}");
}

#[test]
fn read_exports_msg_files_and_test_round_trips() {
    let fx = fixture();
    let entries = fx.root.join("entries.txt");
    fs::write(&entries, "000000 000004 -\n").expect("write entries");
    let out_dir = fx.root.join("out");

    let mut cmd = textarc_cmd();
    common_args(&mut cmd, "read", &fx, &entries);
    cmd.arg("--out-dir").arg(&out_dir);
    run_ok(&mut cmd);
    let exported = fs::read(out_dir.join("game_000000.msg")).expect("exported msg");
    assert_eq!(exported, [0x17, 0x68, 0x69, 0xE0]);

    let mut cmd = textarc_cmd();
    common_args(&mut cmd, "test", &fx, &entries);
    cmd.args(["--output", "json"]);
    let stdout = run_ok(&mut cmd);
    assert!(
        stdout.contains("\"ok\":true"),
        "round trip not ok: {stdout}"
    );
}

#[test]
fn extract_writes_text_box_files() {
    let fx = fixture();
    let entries = fx.root.join("entries.txt");
    fs::write(&entries, "000000 000004 -\n").expect("write entries");
    let out_dir = fx.root.join("boxes");

    let mut cmd = textarc_cmd();
    common_args(&mut cmd, "extract", &fx, &entries);
    cmd.arg("--out-dir").arg(&out_dir);
    run_ok(&mut cmd);

    let text = fs::read_to_string(out_dir.join("game_000000.txt")).expect("extract written");
    assert!(text.contains("<glyph>"), "extract:\n{text}");
    assert!(text.contains("hi"), "extract:\n{text}");
}

#[test]
fn entries_command_validates_and_canonicalises() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entries = dir.path().join("entries.txt");
    fs::write(&entries, "# comment\n001000 000020 CH 080040\n").expect("write entries");

    let stdout = run_ok(textarc_cmd().arg("entries").arg(&entries));
    assert!(
        stdout.contains("001000  000020  CH"),
        "canonical form missing: {stdout}"
    );

    fs::write(&entries, "001000 000020 XY\n").expect("write entries");
    let output = textarc_cmd()
        .arg("entries")
        .arg(&entries)
        .output()
        .expect("run textarc");
    assert!(!output.status.success(), "unknown flags must fail");
}

#[test]
fn missing_database_is_a_clean_error() {
    let fx = fixture();
    let output = textarc_cmd()
        .arg("scan")
        .arg(&fx.rom)
        .arg("--db")
        .arg(fx.root.join("missing.json"))
        .output()
        .expect("run textarc");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("does not exist"),
        "unexpected error: {stderr}"
    );
}
