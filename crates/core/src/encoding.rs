//! Lookup-table character encoding.
//!
//! A pluggable byte-sequence ↔ string mapping backed by two prefix trees:
//! a byte-keyed tree for decoding and a char-keyed tree for encoding.
//! Both directions take the longest match available.

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct ByteNode {
    value: Option<String>,
    children: HashMap<u8, ByteNode>,
}

#[derive(Debug, Default)]
struct CharNode {
    value: Option<Vec<u8>>,
    children: HashMap<char, CharNode>,
}

/// A byte ↔ string translation table.
#[derive(Debug, Default)]
pub struct TableEncoding {
    name: String,
    decode_root: ByteNode,
    encode_root: CharNode,
}

impl TableEncoding {
    /// Create an empty encoding with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The encoding's name, referenced by parameter definitions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map the byte sequence `bytes` to `text` in both directions.
    pub fn add(&mut self, bytes: &[u8], text: &str) -> Result<()> {
        if bytes.is_empty() || text.is_empty() {
            return Err(Error::invalid(
                "table entry",
                "byte sequence and replacement must be non-empty",
            ));
        }
        let mut node = &mut self.decode_root;
        for &b in bytes {
            node = node.children.entry(b).or_default();
        }
        node.value = Some(text.to_string());

        let mut node = &mut self.encode_root;
        for c in text.chars() {
            node = node.children.entry(c).or_default();
        }
        // First mapping wins on the encode side so duplicate replacements
        // keep a stable byte form.
        if node.value.is_none() {
            node.value = Some(bytes.to_vec());
        }
        Ok(())
    }

    /// Decode the longest mapped prefix of `data`.
    ///
    /// Returns the number of bytes consumed and the replacement text, or
    /// `None` when no prefix is mapped.
    pub fn decode_prefix(&self, data: &[u8]) -> Option<(usize, &str)> {
        let mut node = &self.decode_root;
        let mut best: Option<(usize, &str)> = None;
        for (i, &b) in data.iter().enumerate() {
            let Some(next) = node.children.get(&b) else {
                break;
            };
            node = next;
            if let Some(value) = &node.value {
                best = Some((i + 1, value));
            }
            if node.children.is_empty() {
                break;
            }
        }
        best
    }

    /// Decode a complete byte sequence, requiring every byte to map.
    pub fn decode_bytes(&self, data: &[u8]) -> Option<String> {
        let mut out = String::new();
        let mut rest = data;
        while !rest.is_empty() {
            let (consumed, text) = self.decode_prefix(rest)?;
            out.push_str(text);
            rest = &rest[consumed..];
        }
        Some(out)
    }

    /// Encode `text` to bytes, greedily taking the longest mapped prefix
    /// at each position.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let Some((consumed, bytes)) = self.encode_prefix(rest) else {
                let c = rest.chars().next().unwrap_or('?');
                return Err(Error::invalid(
                    "text",
                    format!("no table entry covers {c:?} in {}", self.name),
                ));
            };
            out.extend_from_slice(bytes);
            rest = &rest[consumed..];
        }
        Ok(out)
    }

    fn encode_prefix(&self, text: &str) -> Option<(usize, &[u8])> {
        let mut node = &self.encode_root;
        let mut best: Option<(usize, &[u8])> = None;
        for (i, c) in text.char_indices() {
            let Some(next) = node.children.get(&c) else {
                break;
            };
            node = next;
            if let Some(value) = &node.value {
                best = Some((i + c.len_utf8(), value.as_slice()));
            }
            if node.children.is_empty() {
                break;
            }
        }
        best
    }

    /// Load an encoding from the conventional table-file format: one
    /// `XX=replacement` pair per line, where `XX` is an even run of hex
    /// digits. Empty lines are skipped.
    pub fn from_table_file(name: impl Into<String>, content: &str) -> Result<Self> {
        let mut encoding = TableEncoding::new(name);
        for (number, line) in content.lines().enumerate() {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            let Some((hex, replacement)) = line.split_once('=') else {
                return Err(Error::invalid(
                    "table file",
                    format!("line {}: missing '='", number + 1),
                ));
            };
            let bytes = parse_hex_bytes(hex).ok_or_else(|| {
                Error::invalid(
                    "table file",
                    format!("line {}: bad hex sequence {hex:?}", number + 1),
                )
            })?;
            encoding.add(&bytes, replacement)?;
        }
        Ok(encoding)
    }
}

/// Decode a parameter's value through its declared value encoding.
///
/// The value's little-endian byte form is translated, not its numeric
/// form, so the bytes round-trip exactly. Returns `None` when the
/// parameter declares no encoding or the bytes are not in the table.
pub fn parameter_string(
    parameter: &textarc_command_db::Parameter,
    encoding: &TableEncoding,
) -> Option<String> {
    parameter.definition().value_encoding.as_deref()?;
    encoding.decode_bytes(&parameter.value_bytes())
}

/// Set a parameter's value from text through its declared value encoding.
pub fn set_parameter_string(
    parameter: &mut textarc_command_db::Parameter,
    encoding: &TableEncoding,
    text: &str,
) -> Result<()> {
    if parameter.definition().value_encoding.is_none() {
        return Err(Error::invalid(
            "parameter",
            format!("{} declares no value encoding", parameter.definition().name),
        ));
    }
    let bytes = encoding.encode(text)?;
    Ok(parameter.set_value_bytes(&bytes)?)
}

fn parse_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
