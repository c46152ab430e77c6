//! Human and machine-readable rendering of command results.

use std::io::IsTerminal;

use serde_json::json;
use textarc_core::{RomEntry, RoundTripReport, TextArchive};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain text for terminals.
    Pretty,
    /// One JSON document on stdout.
    Json,
}

impl Format {
    /// Resolve the `--output` flag, defaulting to pretty on a TTY and
    /// JSON otherwise.
    pub fn resolve(flag: Option<&str>) -> Format {
        match flag {
            Some("json") => Format::Json,
            Some(_) => Format::Pretty,
            None => {
                if std::io::stdout().is_terminal() {
                    Format::Pretty
                } else {
                    Format::Json
                }
            }
        }
    }
}

/// Summarise a scan or read: one line per archive.
pub fn print_archives(format: Format, archives: &[TextArchive], entries: &[&RomEntry]) {
    match format {
        Format::Pretty => {
            for (archive, entry) in archives.iter().zip(entries) {
                let mut flags = String::new();
                if entry.compressed {
                    flags.push('C');
                }
                if entry.size_header {
                    flags.push('H');
                }
                println!(
                    "{}  size 0x{:06X}  scripts {:3}  {}",
                    archive.identifier,
                    entry.size,
                    archive.scripts.len(),
                    flags
                );
            }
            println!("{} archive(s)", archives.len());
        }
        Format::Json => {
            let docs: Vec<_> = archives
                .iter()
                .zip(entries)
                .map(|(archive, entry)| {
                    json!({
                        "identifier": archive.identifier,
                        "scripts": archive.scripts.len(),
                        "entry": entry,
                    })
                })
                .collect();
            println!("{}", json!({ "archives": docs }));
        }
    }
}

/// Report exported file paths.
pub fn print_exports(format: Format, paths: &[std::path::PathBuf]) {
    match format {
        Format::Pretty => {
            for path in paths {
                println!("wrote {}", path.display());
            }
        }
        Format::Json => {
            let docs: Vec<_> = paths.iter().map(|p| p.display().to_string()).collect();
            println!("{}", json!({ "written": docs }));
        }
    }
}

/// Report round-trip results; returns whether every archive matched.
pub fn print_round_trips(format: Format, reports: &[RoundTripReport]) -> bool {
    let failures: Vec<_> = reports.iter().filter(|r| !r.is_match()).collect();
    match format {
        Format::Pretty => {
            for report in reports {
                if report.is_match() {
                    println!(
                        "{}  ok ({} bytes, tail slack {})",
                        report.identifier,
                        report.written_len,
                        report.tail_slack()
                    );
                } else {
                    println!(
                        "{}  MISMATCH at {:?} (wrote {} of {} bytes)",
                        report.identifier,
                        report.first_mismatch,
                        report.written_len,
                        report.original_len
                    );
                }
            }
            println!("{} tested, {} failed", reports.len(), failures.len());
        }
        Format::Json => {
            let docs: Vec<_> = reports
                .iter()
                .map(|r| {
                    json!({
                        "identifier": r.identifier,
                        "ok": r.is_match(),
                        "originalLen": r.original_len,
                        "writtenLen": r.written_len,
                        "firstMismatch": r.first_mismatch,
                    })
                })
                .collect();
            println!("{}", json!({ "roundTrips": docs }));
        }
    }
    failures.is_empty()
}
