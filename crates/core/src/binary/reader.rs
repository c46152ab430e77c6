//! The binary script reader.
//!
//! Drives the database matcher over a byte stream and materialises
//! commands with their parameters and data tables. Bytes no command
//! claims fall through to the lookup-table encoding ("text mode") and
//! finally to raw byte elements.

use std::collections::HashMap;
use std::rc::Rc;

use textarc_command_db::{
    Command, CommandDatabase, CommandDefinition, CommandElementDefinition, EndType, OffsetKind,
    ParameterDefinition, Script, ScriptElement, TextArchive,
};

use crate::binary::params;
use crate::encoding::TableEncoding;
use crate::error::{Error, Result};
use crate::stream::ByteCursor;

/// Reads scripts and text archives from a positioned byte cursor.
pub struct ScriptReader<'a> {
    database: &'a CommandDatabase,
    encoding: Option<&'a TableEncoding>,
}

impl<'a> ScriptReader<'a> {
    /// Create a reader over the given command database.
    pub fn new(database: &'a CommandDatabase) -> Self {
        Self {
            database,
            encoding: None,
        }
    }

    /// Use `encoding` for text mode between commands.
    pub fn with_encoding(mut self, encoding: &'a TableEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Read scripts until `end`, producing a text archive.
    pub fn read_archive(
        &self,
        cursor: &mut ByteCursor<'_>,
        identifier: &str,
        end: usize,
    ) -> Result<TextArchive> {
        let mut archive = TextArchive::new(identifier);
        while cursor.position() < end {
            archive.scripts.push(self.read_script(cursor, end)?);
        }
        Ok(archive)
    }

    /// Read one script, stopping after a command whose definition always
    /// ends the script, at `end`, or at the end of the stream.
    ///
    /// The cursor is left past the last consumed byte, minus the final
    /// command's rewind.
    pub fn read_script(&self, cursor: &mut ByteCursor<'_>, end: usize) -> Result<Script> {
        let mut script = Script::new(self.database.name());
        while cursor.position() < end && !cursor.is_at_end() {
            let element_start = cursor.position();
            if let Some(command) = self.try_read_command(cursor, end)? {
                let ends = command.definition().end_type == EndType::Always;
                script.elements.push(ScriptElement::Command(command));
                if cursor.position() <= element_start {
                    return Err(Error::format(
                        element_start,
                        "command rewinds past its own start",
                    ));
                }
                if ends {
                    break;
                }
                continue;
            }
            if let Some(encoding) = self.encoding {
                let window = &cursor.data()[cursor.position()..end.min(cursor.data().len())];
                if let Some((consumed, text)) = encoding.decode_prefix(window) {
                    cursor.advance(consumed)?;
                    push_text(&mut script.elements, text);
                    continue;
                }
            }
            let value = cursor.read_u8()?;
            script.elements.push(ScriptElement::Byte { value });
        }
        Ok(script)
    }

    /// Attempt to read one command at the cursor.
    ///
    /// Returns `None` (with the cursor restored) when no definition
    /// matches; the caller falls back to text mode or a raw byte.
    fn try_read_command(
        &self,
        cursor: &mut ByteCursor<'_>,
        end: usize,
    ) -> Result<Option<Command>> {
        let start = cursor.position();
        let mut sequence: Vec<u8> = Vec::new();
        let chosen: Option<Rc<CommandDefinition>> = loop {
            if cursor.position() >= end || cursor.is_at_end() {
                break None;
            }
            sequence.push(cursor.read_u8()?);
            let candidates = self.database.match_sequence(&sequence);
            if candidates.is_empty() {
                break None;
            }
            // Shortest-match selection: the first candidate whose fixed
            // part is fully covered wins, in insertion order.
            if let Some(complete) = candidates
                .iter()
                .find(|d| d.minimum_length() == sequence.len())
            {
                break Some(Rc::clone(complete));
            }
        };
        let Some(definition) = chosen else {
            cursor.set_position(start)?;
            return Ok(None);
        };
        let command = self.read_parameters(cursor, end, &definition, sequence)?;
        cursor.rewind(definition.rewind_count)?;
        Ok(Some(command))
    }

    /// Extract every parameter of `definition` in declaration order,
    /// extending the command buffer from the stream as needed.
    fn read_parameters(
        &self,
        cursor: &mut ByteCursor<'_>,
        end: usize,
        definition: &Rc<CommandDefinition>,
        mut buffer: Vec<u8>,
    ) -> Result<Command> {
        let mut command = Command::new(Rc::clone(definition));
        let mut labels: HashMap<String, usize> = HashMap::new();
        for (index, element_def) in definition.elements.iter().enumerate() {
            if let Some(length_def) = &element_def.length {
                let count =
                    self.read_parameter(cursor, end, &mut buffer, &mut labels, length_def)?;
                if count < 0 {
                    return Err(Error::format(
                        cursor.position(),
                        format!("negative data entry count {count}"),
                    ));
                }
                self.read_data_entries(
                    cursor,
                    end,
                    &mut buffer,
                    &mut labels,
                    &mut command,
                    index,
                    element_def,
                    count as usize,
                )?;
            } else {
                for group in &element_def.data_groups {
                    for par in &group.parameters {
                        let value =
                            self.read_parameter(cursor, end, &mut buffer, &mut labels, par)?;
                        command.set_value(index, 0, &par.name, value)?;
                    }
                }
            }
        }
        Ok(command)
    }

    /// Read `count` data entries for one element, group-major: all entries
    /// of the first data group, then all entries of the next.
    #[allow(clippy::too_many_arguments)]
    fn read_data_entries(
        &self,
        cursor: &mut ByteCursor<'_>,
        end: usize,
        buffer: &mut Vec<u8>,
        labels: &mut HashMap<String, usize>,
        command: &mut Command,
        index: usize,
        element_def: &CommandElementDefinition,
        count: usize,
    ) -> Result<()> {
        if let Some(element) = command.element_mut(index) {
            for _ in 0..count {
                element.push_entry(element_def);
            }
        }
        for group in &element_def.data_groups {
            for entry in 0..count {
                for par in &group.parameters {
                    let value = self.read_parameter(cursor, end, buffer, labels, par)?;
                    command.set_value(index, entry, &par.name, value)?;
                }
            }
        }
        Ok(())
    }

    /// Read one parameter field, resolving its base offset and pulling
    /// bytes from the stream until the buffer covers the field.
    fn read_parameter(
        &self,
        cursor: &mut ByteCursor<'_>,
        end: usize,
        buffer: &mut Vec<u8>,
        labels: &mut HashMap<String, usize>,
        def: &ParameterDefinition,
    ) -> Result<i64> {
        let base = match &def.offset_kind {
            OffsetKind::Start => 0,
            OffsetKind::End => buffer.len(),
            OffsetKind::Label(name) => *labels
                .get(name)
                .ok_or_else(|| Error::format(cursor.position(), format!("unknown label {name}")))?,
        };
        let field_start = base + def.offset;
        let required = field_start + def.minimum_byte_count();
        while buffer.len() < required {
            if cursor.position() >= end {
                return Err(Error::format(
                    cursor.position(),
                    format!("data ends inside parameter {}", def.name),
                ));
            }
            buffer.push(cursor.read_u8()?);
        }
        labels.insert(def.name.clone(), field_start);
        Ok(params::decode(buffer, field_start, def))
    }
}

/// Append text, coalescing adjacent runs into one element.
fn push_text(elements: &mut Vec<ScriptElement>, text: &str) {
    if let Some(ScriptElement::Text { text: last }) = elements.last_mut() {
        last.push_str(text);
    } else {
        elements.push(ScriptElement::text(text));
    }
}
