//! Command definition metadata.
//!
//! Defines the data structures describing one opcode family: the byte
//! `base`/`mask` pair used for prefix matching, the parameter layout
//! (offsets, bit fields, additive bias), and the element/data-entry
//! structure. These tables are deserialized from a command database JSON
//! file and consumed by the binary reader and writer.

use serde::{Deserialize, Serialize};

use crate::DatabaseError;

/// How a parameter's base byte offset is resolved when locating the
/// parameter inside a command's byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OffsetKind {
    /// Relative to the start of the command.
    #[default]
    Start,
    /// Relative to the current end of the buffer at the moment the
    /// parameter is visited. Used for trailing variable-length payloads.
    End,
    /// Relative to the recorded position of a previously visited
    /// parameter with the given name.
    Label(String),
}

/// Whether executing a command terminates the script it appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndType {
    /// The command never ends the script.
    Never,
    /// The command ends the script depending on its parameter values:
    /// it ends the script iff it has at least one jump parameter and
    /// none of them holds the `0xFF` "no jump" sentinel.
    #[default]
    Default,
    /// The command always ends the script.
    Always,
}

impl std::fmt::Display for EndType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndType::Never => write!(f, "never"),
            EndType::Default => write!(f, "default"),
            EndType::Always => write!(f, "always"),
        }
    }
}

/// An immutable descriptor of one field inside a command's byte layout.
///
/// The stored value range is `[add, add + 2^bits - 1]`; the raw bit field
/// holds `value - add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    /// Parameter name, unique within its element.
    pub name: String,
    /// Byte offset of the field, relative to the resolved base offset.
    #[serde(default)]
    pub offset: usize,
    /// Bit shift of the field within (and possibly past) its first byte.
    #[serde(default)]
    pub shift: u32,
    /// Width of the field in bits.
    pub bits: u32,
    /// Additive bias applied to the decoded integer.
    #[serde(default)]
    pub add: i64,
    /// Whether values of this parameter name another script index.
    #[serde(default)]
    pub is_jump: bool,
    /// Name of a lookup-table encoding to decode this value as text
    /// rather than an integer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_encoding: Option<String>,
    /// Sizes of sub-parameter groups within a data entry. Carried for
    /// round-trip fidelity; the element's data groups are authoritative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_group_sizes: Vec<usize>,
    /// How the base offset is resolved at read/write time.
    #[serde(default)]
    pub offset_kind: OffsetKind,
}

impl ParameterDefinition {
    /// Create a minimal parameter definition with the given field layout.
    pub fn new(name: impl Into<String>, offset: usize, shift: u32, bits: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            shift,
            bits,
            add: 0,
            is_jump: false,
            value_encoding: None,
            data_group_sizes: Vec::new(),
            offset_kind: OffsetKind::Start,
        }
    }

    /// Number of bytes the field occupies from its base byte:
    /// `ceil((shift + bits) / 8)`.
    pub fn minimum_byte_count(&self) -> usize {
        ((self.shift + self.bits) as usize).div_ceil(8)
    }

    /// Smallest value this parameter can store.
    pub fn minimum(&self) -> i64 {
        self.add
    }

    /// Largest value this parameter can store.
    pub fn maximum(&self) -> i64 {
        let span = (1_i128 << self.bits) - 1;
        (i128::from(self.add) + span) as i64
    }

    /// Whether `value` lies in `[add, add + 2^bits - 1]`.
    pub fn in_range(&self, value: i64) -> bool {
        let v = i128::from(value);
        let lo = i128::from(self.add);
        let hi = lo + ((1_i128 << self.bits) - 1);
        lo <= v && v <= hi
    }

    fn validate(&self, command: &str) -> Result<(), DatabaseError> {
        if self.name.is_empty() {
            return Err(DatabaseError::InvalidDefinition {
                name: command.to_string(),
                reason: "parameter with empty name".to_string(),
            });
        }
        if self.bits == 0 || self.bits > 63 {
            return Err(DatabaseError::InvalidDefinition {
                name: command.to_string(),
                reason: format!("parameter {} has bit width {}", self.name, self.bits),
            });
        }
        Ok(())
    }
}

/// One ordered group of parameter definitions inside a data entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataGroup {
    /// Parameter definitions in layout order.
    pub parameters: Vec<ParameterDefinition>,
}

impl DataGroup {
    /// Create a group from a list of parameter definitions.
    pub fn new(parameters: Vec<ParameterDefinition>) -> Self {
        Self { parameters }
    }
}

/// A named grouping of parameters inside a command.
///
/// An element either holds a fixed set of scalar parameters (one implicit
/// data entry) or a repeated data entry counted by a length parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandElementDefinition {
    /// Element name, unique within its command.
    pub name: String,
    /// The entry-count parameter. Present iff the element has multiple
    /// data entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<ParameterDefinition>,
    /// Ordered data groups of parameter definitions.
    pub data_groups: Vec<DataGroup>,
}

impl CommandElementDefinition {
    /// Create an element with a single implicit data entry.
    pub fn scalar(name: impl Into<String>, parameters: Vec<ParameterDefinition>) -> Self {
        Self {
            name: name.into(),
            length: None,
            data_groups: vec![DataGroup::new(parameters)],
        }
    }

    /// Create an element with a repeated data entry counted by `length`.
    pub fn repeated(
        name: impl Into<String>,
        length: ParameterDefinition,
        data_groups: Vec<DataGroup>,
    ) -> Self {
        Self {
            name: name.into(),
            length: Some(length),
            data_groups,
        }
    }

    /// Whether this element carries multiple data entries.
    pub fn has_multiple_entries(&self) -> bool {
        self.length.is_some()
    }

    /// Look up a parameter definition by exact name across all groups.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.data_groups
            .iter()
            .flat_map(|g| g.parameters.iter())
            .find(|p| p.name == name)
    }

    fn validate(&self, command: &str) -> Result<(), DatabaseError> {
        if let Some(length) = &self.length {
            length.validate(command)?;
        }
        for group in &self.data_groups {
            for par in &group.parameters {
                par.validate(command)?;
            }
        }
        Ok(())
    }
}

/// The template for one opcode family: base + mask + parameter layout.
///
/// A byte sequence `s` matches when `(s[i] & mask[i]) == base[i]` for every
/// position of the fixed part; `minimum_length` is `base.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    /// Command name. Overloads by byte layout share a name.
    pub name: String,
    /// Fixed byte values of the command's prefix.
    pub base: Vec<u8>,
    /// Per-byte mask selecting the fixed bits of `base`.
    pub mask: Vec<u8>,
    /// Whether executing the command terminates its script.
    #[serde(default)]
    pub end_type: EndType,
    /// Whether this command produces glyphs inside a text box.
    #[serde(default)]
    pub prints: bool,
    /// Name of the scalar parameter selecting the active portrait.
    /// `Some("")` means the command hides the portrait; `None` means the
    /// command does not affect it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mugshot_parameter_name: Option<String>,
    /// Bytes to back up the stream after this command, allowing overlap
    /// with the next command.
    #[serde(default)]
    pub rewind_count: usize,
    /// Carried through serialization for fidelity; not used in matching.
    #[serde(default)]
    pub priority_length: usize,
    /// The command's elements in declaration order.
    #[serde(default)]
    pub elements: Vec<CommandElementDefinition>,
}

impl CommandDefinition {
    /// Create a definition with the given name, base, and mask.
    pub fn new(name: impl Into<String>, base: Vec<u8>, mask: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            base,
            mask,
            end_type: EndType::Default,
            prints: false,
            mugshot_parameter_name: None,
            rewind_count: 0,
            priority_length: 0,
            elements: Vec::new(),
        }
    }

    /// Length of the fixed part, in bytes.
    pub fn minimum_length(&self) -> usize {
        self.base.len()
    }

    /// Whether every byte of `sequence` is consistent with this command's
    /// fixed part. A sequence longer than the fixed part never matches.
    pub fn matches_prefix(&self, sequence: &[u8]) -> bool {
        if sequence.len() > self.minimum_length() {
            return false;
        }
        sequence
            .iter()
            .zip(self.base.iter().zip(self.mask.iter()))
            .all(|(&b, (&base, &mask))| (b & mask) == base)
    }

    /// Look up an element definition by exact name.
    pub fn element(&self, name: &str) -> Option<&CommandElementDefinition> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Check the structural invariants of this definition.
    ///
    /// The base and mask must be equal-length and non-empty, parameter bit
    /// widths must be sane, and a non-empty mugshot parameter name must
    /// resolve to a scalar parameter of a single-entry element.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.name.is_empty() {
            return Err(DatabaseError::InvalidDefinition {
                name: "<unnamed>".to_string(),
                reason: "empty command name".to_string(),
            });
        }
        if self.base.is_empty() || self.base.len() != self.mask.len() {
            return Err(DatabaseError::InvalidDefinition {
                name: self.name.clone(),
                reason: format!(
                    "base/mask length mismatch ({} vs {})",
                    self.base.len(),
                    self.mask.len()
                ),
            });
        }
        for element in &self.elements {
            element.validate(&self.name)?;
        }
        if let Some(mugshot) = &self.mugshot_parameter_name
            && !mugshot.is_empty()
        {
            let resolves = self
                .elements
                .iter()
                .filter(|e| !e.has_multiple_entries())
                .any(|e| e.parameter(mugshot).is_some());
            if !resolves {
                return Err(DatabaseError::InvalidDefinition {
                    name: self.name.clone(),
                    reason: format!("mugshot parameter {mugshot} does not resolve"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_byte_count_rounds_up() {
        assert_eq!(ParameterDefinition::new("p", 0, 0, 8).minimum_byte_count(), 1);
        assert_eq!(ParameterDefinition::new("p", 0, 0, 9).minimum_byte_count(), 2);
        assert_eq!(ParameterDefinition::new("p", 0, 4, 4).minimum_byte_count(), 1);
        assert_eq!(ParameterDefinition::new("p", 0, 4, 5).minimum_byte_count(), 2);
        assert_eq!(ParameterDefinition::new("p", 0, 12, 4).minimum_byte_count(), 2);
    }

    #[test]
    fn in_range_follows_add_and_bits() {
        let mut par = ParameterDefinition::new("p", 0, 0, 4);
        par.add = 10;
        assert!(!par.in_range(9));
        assert!(par.in_range(10));
        assert!(par.in_range(25));
        assert!(!par.in_range(26));
        assert_eq!(par.minimum(), 10);
        assert_eq!(par.maximum(), 25);
    }

    #[test]
    fn matches_prefix_honours_mask_and_length() {
        let def = CommandDefinition::new("cmd", vec![0x10, 0x00], vec![0xF0, 0xFF]);
        assert!(def.matches_prefix(&[0x17]));
        assert!(def.matches_prefix(&[0x17, 0x00]));
        assert!(!def.matches_prefix(&[0x27]));
        assert!(!def.matches_prefix(&[0x17, 0x01]));
        assert!(!def.matches_prefix(&[0x17, 0x00, 0x00]));
    }

    #[test]
    fn mugshot_must_resolve_to_scalar_parameter() {
        let mut def = CommandDefinition::new("mug", vec![0xE1], vec![0xFF]);
        def.mugshot_parameter_name = Some("face".to_string());
        assert!(def.validate().is_err());

        def.elements = vec![CommandElementDefinition::scalar(
            "args",
            vec![ParameterDefinition::new("face", 1, 0, 8)],
        )];
        assert!(def.validate().is_ok());

        // The empty name means "hide the portrait" and needs no parameter.
        def.elements.clear();
        def.mugshot_parameter_name = Some(String::new());
        assert!(def.validate().is_ok());
    }
}
