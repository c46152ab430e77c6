//! The binary script writer.
//!
//! Serialises commands back to bytes as the reader's inverse: a buffer
//! initialised from the definition's base, parameters written through
//! the same offset-kind resolution (start / end / label), and the tail
//! truncated by the command's rewind count. Adjacent commands' byte
//! windows may therefore overlap intentionally.

use std::collections::HashMap;

use textarc_command_db::{
    Command, CommandDatabase, DataEntry, OffsetKind, ParameterDefinition, Script, ScriptElement,
    TextArchive,
};

use crate::binary::params;
use crate::encoding::TableEncoding;
use crate::error::{Error, Result};

/// Serialises scripts and text archives to bytes.
pub struct ScriptWriter<'a> {
    database: &'a CommandDatabase,
    encoding: Option<&'a TableEncoding>,
}

impl<'a> ScriptWriter<'a> {
    /// Create a writer over the given command database.
    pub fn new(database: &'a CommandDatabase) -> Self {
        Self {
            database,
            encoding: None,
        }
    }

    /// Use `encoding` to serialise text elements.
    pub fn with_encoding(mut self, encoding: &'a TableEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Serialise an archive: the concatenation of its scripts in order.
    pub fn write_archive(&self, archive: &TextArchive) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for script in &archive.scripts {
            self.write_script(script, &mut out)?;
        }
        Ok(out)
    }

    /// Append one script's bytes to `out`.
    pub fn write_script(&self, script: &Script, out: &mut Vec<u8>) -> Result<()> {
        for element in &script.elements {
            match element {
                ScriptElement::Command(command) => {
                    // A command edited out of its definition's ranges is
                    // rebound to a suitable overload before emission.
                    let valid = self.database.make_valid_command(command).ok_or_else(|| {
                        Error::format(
                            out.len(),
                            format!("no suitable definition for command {}", command.name()),
                        )
                    })?;
                    let bytes = write_command(&valid, out.len())?;
                    out.extend_from_slice(&bytes);
                }
                ScriptElement::Text { text } => {
                    let encoding = self.encoding.ok_or_else(|| {
                        Error::invalid("text element", "no encoding loaded to serialise text")
                    })?;
                    out.extend_from_slice(&encoding.encode(text)?);
                }
                ScriptElement::Byte { value } => out.push(*value),
                ScriptElement::Directive(directive) => {
                    return Err(Error::format(
                        out.len(),
                        format!("directive {:?} has no binary form", directive.kind),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Serialise one command into a fresh buffer.
///
/// `stream_offset` is only used to position error messages.
fn write_command(command: &Command, stream_offset: usize) -> Result<Vec<u8>> {
    let definition = command.definition();
    let mut buffer = definition.base.clone();
    if buffer.len() < definition.mask.len() {
        buffer.resize(definition.mask.len(), 0);
    }
    let mut labels: HashMap<String, usize> = HashMap::new();

    for (element_def, state) in command.element_pairs() {
        if let Some(length_def) = &element_def.length {
            let count = state.entries().len() as i64;
            if !length_def.in_range(count) {
                return Err(Error::format(
                    stream_offset,
                    format!(
                        "entry count {count} out of range for element {}",
                        element_def.name
                    ),
                ));
            }
            write_parameter(&mut buffer, &mut labels, length_def, count, stream_offset)?;
            for group in &element_def.data_groups {
                for entry in state.entries() {
                    for par in &group.parameters {
                        write_entry_parameter(
                            &mut buffer,
                            &mut labels,
                            entry,
                            par,
                            stream_offset,
                        )?;
                    }
                }
            }
        } else {
            let entry = state.entries().first().ok_or_else(|| {
                Error::format(
                    stream_offset,
                    format!("element {} has no data entry", element_def.name),
                )
            })?;
            for group in &element_def.data_groups {
                for par in &group.parameters {
                    write_entry_parameter(&mut buffer, &mut labels, entry, par, stream_offset)?;
                }
            }
        }
    }

    buffer.truncate(buffer.len().saturating_sub(definition.rewind_count));
    Ok(buffer)
}

fn write_entry_parameter(
    buffer: &mut Vec<u8>,
    labels: &mut HashMap<String, usize>,
    entry: &DataEntry,
    def: &ParameterDefinition,
    stream_offset: usize,
) -> Result<()> {
    let parameter = entry.parameter(&def.name).ok_or_else(|| {
        Error::format(
            stream_offset,
            format!("missing value for parameter {}", def.name),
        )
    })?;
    write_parameter(buffer, labels, def, parameter.value(), stream_offset)
}

/// Write one parameter's bit field into the buffer.
///
/// Resolves the base offset (start / end / label), zero-extends the
/// buffer to cover the field, and records the field position so later
/// label-relative parameters can find it.
fn write_parameter(
    buffer: &mut Vec<u8>,
    labels: &mut HashMap<String, usize>,
    def: &ParameterDefinition,
    value: i64,
    stream_offset: usize,
) -> Result<()> {
    let base = match &def.offset_kind {
        OffsetKind::Start => 0,
        OffsetKind::End => buffer.len(),
        OffsetKind::Label(name) => *labels
            .get(name)
            .ok_or_else(|| Error::format(stream_offset, format!("unknown label {name}")))?,
    };
    let field_start = base + def.offset;
    let required = field_start + def.minimum_byte_count();
    if buffer.len() < required {
        buffer.resize(required, 0);
    }
    labels.insert(def.name.clone(), field_start);
    params::encode(buffer, field_start, def, value);
    Ok(())
}
