//! The script element model.
//!
//! A script is a sequence of elements: concrete [`Command`] instances bound
//! to a definition, decoded text runs, raw bytes, and directives. Elements
//! are a tagged sum; text-box classification (`is_printed`,
//! `ends_text_box`, `splits_text_box`) is computed by `match` rather than
//! dispatch.

use std::collections::HashMap;
use std::rc::Rc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::DatabaseError;
use crate::defs::{CommandDefinition, CommandElementDefinition, EndType, ParameterDefinition};

/// The "no jump" sentinel: a jump parameter holding this value continues
/// with the next command instead of transferring to another script.
pub const NO_JUMP: i64 = 0xFF;

/// A concrete parameter value bound to its definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    definition: ParameterDefinition,
    value: i64,
}

impl Parameter {
    /// Create a parameter holding the definition's minimum value.
    pub fn new(definition: ParameterDefinition) -> Self {
        let value = definition.minimum();
        Self { definition, value }
    }

    /// The parameter's definition.
    pub fn definition(&self) -> &ParameterDefinition {
        &self.definition
    }

    /// The current value, including the definition's additive bias.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Set the value, rejecting values outside the definition's range.
    pub fn set_value(&mut self, value: i64) -> Result<(), DatabaseError> {
        if !self.definition.in_range(value) {
            return Err(DatabaseError::ValueOutOfRange {
                parameter: self.definition.name.clone(),
                value,
            });
        }
        self.value = value;
        Ok(())
    }

    /// The raw field bytes of the value, little-endian, one byte per
    /// occupied field byte. This is the form that round-trips through a
    /// lookup-table encoding.
    pub fn value_bytes(&self) -> Vec<u8> {
        let raw = (self.value - self.definition.add) as u64;
        raw.to_le_bytes()[..self.definition.minimum_byte_count().min(8)].to_vec()
    }

    /// Set the value from little-endian field bytes.
    pub fn set_value_bytes(&mut self, bytes: &[u8]) -> Result<(), DatabaseError> {
        let mut raw = [0u8; 8];
        let n = bytes.len().min(8);
        raw[..n].copy_from_slice(&bytes[..n]);
        let value = self.definition.add + u64::from_le_bytes(raw) as i64;
        self.set_value(value)
    }
}

/// One row of a command's embedded tabular data: parameter name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataEntry {
    parameters: HashMap<String, Parameter>,
}

impl DataEntry {
    /// Create an entry with every parameter of `element` at its minimum.
    pub fn for_element(element: &CommandElementDefinition) -> Self {
        let mut parameters = HashMap::new();
        for group in &element.data_groups {
            for par in &group.parameters {
                parameters.insert(par.name.clone(), Parameter::new(par.clone()));
            }
        }
        Self { parameters }
    }

    /// Look up a parameter by exact name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Look up a parameter by exact name, mutably.
    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.get_mut(name)
    }

    /// Iterate over all parameters in unspecified order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }
}

/// The per-element state of a command instance: one or more data entries.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandElement {
    entries: Vec<DataEntry>,
}

impl CommandElement {
    fn for_definition(def: &CommandElementDefinition) -> Self {
        let entries = if def.has_multiple_entries() {
            Vec::new()
        } else {
            vec![DataEntry::for_element(def)]
        };
        Self { entries }
    }

    /// The element's data entries. Single-entry elements hold exactly one.
    pub fn entries(&self) -> &[DataEntry] {
        &self.entries
    }

    /// Append a fresh data entry built from `def`'s parameter layout.
    pub fn push_entry(&mut self, def: &CommandElementDefinition) -> &mut DataEntry {
        let index = self.entries.len();
        self.entries.push(DataEntry::for_element(def));
        &mut self.entries[index]
    }

    /// Access entry `index` mutably.
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut DataEntry> {
        self.entries.get_mut(index)
    }
}

/// A concrete command bound to one [`CommandDefinition`].
///
/// The definition is shared, not owned: the database that produced it must
/// outlive every command parsed against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    definition: Rc<CommandDefinition>,
    elements: Vec<CommandElement>,
}

impl Command {
    /// Create a command with default-valued parameters.
    pub fn new(definition: Rc<CommandDefinition>) -> Self {
        let elements = definition
            .elements
            .iter()
            .map(CommandElement::for_definition)
            .collect();
        Self {
            definition,
            elements,
        }
    }

    /// The command's name, taken from its definition.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The definition this command is bound to.
    pub fn definition(&self) -> &Rc<CommandDefinition> {
        &self.definition
    }

    /// Per-element instance state, parallel to `definition().elements`.
    pub fn elements(&self) -> &[CommandElement] {
        &self.elements
    }

    /// Access element `index` mutably.
    pub fn element_mut(&mut self, index: usize) -> Option<&mut CommandElement> {
        self.elements.get_mut(index)
    }

    /// Look up the instance state for the element named `name`.
    pub fn element(&self, name: &str) -> Option<&CommandElement> {
        self.definition
            .elements
            .iter()
            .position(|e| e.name == name)
            .and_then(|i| self.elements.get(i))
    }

    /// Iterate over `(element definition, instance state)` pairs.
    pub fn element_pairs(
        &self,
    ) -> impl Iterator<Item = (&CommandElementDefinition, &CommandElement)> {
        self.definition.elements.iter().zip(self.elements.iter())
    }

    /// Iterate over every parameter of every entry of every element.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.elements
            .iter()
            .flat_map(|e| e.entries.iter())
            .flat_map(|entry| entry.parameters())
    }

    /// Set a parameter value by element index, entry index, and name.
    pub fn set_value(
        &mut self,
        element: usize,
        entry: usize,
        parameter: &str,
        value: i64,
    ) -> Result<(), DatabaseError> {
        let name = self.definition.name.clone();
        self.elements
            .get_mut(element)
            .and_then(|e| e.entry_mut(entry))
            .and_then(|entry| entry.parameter_mut(parameter))
            .ok_or_else(|| DatabaseError::UnknownParameter {
                command: name,
                parameter: parameter.to_string(),
            })?
            .set_value(value)
    }

    /// The active portrait selector, when the command carries one.
    pub fn mugshot_value(&self) -> Option<i64> {
        let name = self.definition.mugshot_parameter_name.as_deref()?;
        if name.is_empty() {
            return None;
        }
        self.elements
            .iter()
            .flat_map(|e| e.entries.first())
            .find_map(|entry| entry.parameter(name))
            .map(Parameter::value)
    }

    /// Whether executing this command ends its script.
    ///
    /// `Always` and `Never` are unconditional; `Default` ends the script
    /// iff the command has at least one jump parameter and none of them
    /// holds the [`NO_JUMP`] sentinel.
    pub fn ends_script(&self) -> bool {
        match self.definition.end_type {
            EndType::Always => true,
            EndType::Never => false,
            EndType::Default => {
                let mut jumps = 0;
                for par in self.parameters() {
                    if par.definition().is_jump {
                        if par.value() == NO_JUMP {
                            return false;
                        }
                        jumps += 1;
                    }
                }
                jumps > 0
            }
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Entries<'a>(&'a CommandElementDefinition, &'a CommandElement);
        struct Entry<'a>(&'a CommandElementDefinition, &'a DataEntry);

        impl Serialize for Entries<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut seq = serializer.serialize_seq(Some(self.1.entries().len()))?;
                for entry in self.1.entries() {
                    seq.serialize_element(&Entry(self.0, entry))?;
                }
                seq.end()
            }
        }

        impl Serialize for Entry<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(None)?;
                // Definition order keeps dumps stable across runs.
                for group in &self.0.data_groups {
                    for par in &group.parameters {
                        if let Some(p) = self.1.parameter(&par.name) {
                            map.serialize_entry(&par.name, &p.value())?;
                        }
                    }
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", self.name())?;
        for (def, element) in self.element_pairs() {
            map.serialize_entry(&def.name, &Entries(def, element))?;
        }
        map.end()
    }
}

/// The closed set of directive kinds a script can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectiveKind {
    /// Marks the start of a text archive (payload: identifier).
    TextArchive,
    /// Marks the start of a script (payload: script number).
    Script,
    /// Separates two rendered text boxes.
    TextBoxSeparator,
    /// Splits one logical text box into two rendered boxes.
    TextBoxSplit,
}

/// A directive element with its payload string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    /// The directive kind. Serialized as `directive` so it does not
    /// clash with the element tag.
    #[serde(rename = "directive")]
    pub kind: DirectiveKind,
    /// The payload string; may be empty.
    pub value: String,
}

impl Directive {
    /// Create a directive with an empty payload.
    pub fn new(kind: DirectiveKind) -> Self {
        Self {
            kind,
            value: String::new(),
        }
    }
}

/// One element of a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScriptElement {
    /// A command instance.
    Command(Command),
    /// A decoded text run.
    Text {
        /// The decoded text.
        text: String,
    },
    /// A raw byte no command or encoding claimed.
    Byte {
        /// The raw byte value.
        value: u8,
    },
    /// A directive.
    Directive(Directive),
}

impl ScriptElement {
    /// Convenience constructor for a text run.
    pub fn text(text: impl Into<String>) -> Self {
        ScriptElement::Text { text: text.into() }
    }

    /// Whether this element produces glyphs inside a text box.
    pub fn is_printed(&self) -> bool {
        match self {
            ScriptElement::Text { .. } | ScriptElement::Byte { .. } => true,
            ScriptElement::Command(cmd) => cmd.definition().prints,
            ScriptElement::Directive(_) => false,
        }
    }

    /// Whether this element terminates the current text box.
    pub fn ends_text_box(&self) -> bool {
        match self {
            ScriptElement::Command(cmd) => !cmd.definition().prints,
            ScriptElement::Directive(d) => matches!(
                d.kind,
                DirectiveKind::TextBoxSeparator | DirectiveKind::Script | DirectiveKind::TextArchive
            ),
            ScriptElement::Text { .. } | ScriptElement::Byte { .. } => false,
        }
    }

    /// Whether this element splits one logical text box into two rendered
    /// boxes.
    pub fn splits_text_box(&self) -> bool {
        matches!(
            self,
            ScriptElement::Directive(Directive {
                kind: DirectiveKind::TextBoxSplit,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{CommandElementDefinition, EndType, ParameterDefinition};

    fn jump_command(value: i64) -> Command {
        let mut def = CommandDefinition::new("jump", vec![0xF0], vec![0xFF]);
        let mut target = ParameterDefinition::new("target", 1, 0, 8);
        target.is_jump = true;
        def.end_type = EndType::Default;
        def.elements = vec![CommandElementDefinition::scalar("args", vec![target])];
        let mut cmd = Command::new(Rc::new(def));
        cmd.set_value(0, 0, "target", value).unwrap();
        cmd
    }

    #[test]
    fn default_end_type_follows_jump_sentinel() {
        assert!(jump_command(2).ends_script());
        assert!(!jump_command(NO_JUMP).ends_script());
    }

    #[test]
    fn default_end_type_without_jumps_never_ends() {
        let def = CommandDefinition::new("plain", vec![0x01], vec![0xFF]);
        assert!(!Command::new(Rc::new(def)).ends_script());
    }

    #[test]
    fn value_bytes_round_trip_preserves_byte_form() {
        let def = ParameterDefinition::new("ch", 1, 0, 16);
        let mut par = Parameter::new(def);
        par.set_value_bytes(&[0x34, 0x12]).unwrap();
        assert_eq!(par.value(), 0x1234);
        assert_eq!(par.value_bytes(), vec![0x34, 0x12]);
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let def = ParameterDefinition::new("p", 0, 0, 4);
        let mut par = Parameter::new(def);
        assert!(par.set_value(15).is_ok());
        assert!(par.set_value(16).is_err());
    }
}
