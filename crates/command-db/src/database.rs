//! The command database and its bitmask prefix matcher.
//!
//! A database owns command definitions for its lifetime and answers "what
//! commands could begin with this byte prefix?". Commands hold shared,
//! non-owning handles to their definition, so a database must outlive
//! every archive parsed against it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::DatabaseError;
use crate::defs::{CommandDefinition, CommandElementDefinition};
use crate::element::{Command, CommandElement};
use crate::script::Script;

/// The last `match_sequence` query and its surviving candidates.
///
/// A growing byte sequence re-queries the matcher once per byte; starting
/// from the previous candidate set instead of the full definition list
/// keeps that loop linear.
#[derive(Debug, Default)]
struct MatchCache {
    sequence: Vec<u8>,
    candidates: Vec<Rc<CommandDefinition>>,
}

/// One command of the text-box split snippet, as stored in database JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetCommand {
    /// Name of the command definition to instantiate.
    pub name: String,
    /// Parameter values to set, keyed by parameter name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub values: HashMap<String, i64>,
}

/// On-disk shape of a command database.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseFile {
    name: String,
    commands: Vec<CommandDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    text_box_split_snippet: Vec<SnippetCommand>,
}

/// A named collection of command definitions with a name index and a
/// prefix matcher.
///
/// Names are case-insensitive and multi-valued: overloads of one command
/// by byte layout share a name, and insertion order is preserved for
/// stable overload selection. The match cache is interior mutability
/// behind the handle; callers must serialise concurrent matches against
/// one database.
#[derive(Debug, Default)]
pub struct CommandDatabase {
    name: String,
    definitions: Vec<Rc<CommandDefinition>>,
    by_name: HashMap<String, Vec<usize>>,
    snippet_spec: Vec<SnippetCommand>,
    snippet: Option<Script>,
    cache: RefCell<Option<MatchCache>>,
}

impl CommandDatabase {
    /// Create an empty database with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The database name, recorded on every script parsed through it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All definitions in insertion order.
    pub fn definitions(&self) -> &[Rc<CommandDefinition>] {
        &self.definitions
    }

    /// Append a definition, validating it and invalidating the match
    /// cache.
    pub fn add(&mut self, definition: CommandDefinition) -> Result<(), DatabaseError> {
        definition.validate()?;
        let index = self.definitions.len();
        self.by_name
            .entry(definition.name.to_uppercase())
            .or_default()
            .push(index);
        self.definitions.push(Rc::new(definition));
        *self.cache.borrow_mut() = None;
        Ok(())
    }

    /// All definitions whose name matches `name` case-insensitively, in
    /// insertion order.
    pub fn find(&self, name: &str) -> Vec<Rc<CommandDefinition>> {
        self.by_name
            .get(&name.to_uppercase())
            .into_iter()
            .flatten()
            .map(|&i| Rc::clone(&self.definitions[i]))
            .collect()
    }

    /// Every definition still structurally possible for the byte prefix
    /// `sequence`.
    ///
    /// Matching is monotone: extending the sequence can only shrink the
    /// candidate set. The previous query's candidates are reused when the
    /// previous sequence is a prefix of this one.
    pub fn match_sequence(&self, sequence: &[u8]) -> Vec<Rc<CommandDefinition>> {
        if sequence.is_empty() {
            return Vec::new();
        }
        let mut candidates = {
            let cache = self.cache.borrow();
            match &*cache {
                Some(c)
                    if !c.sequence.is_empty()
                        && c.sequence.len() <= sequence.len()
                        && sequence[..c.sequence.len()] == c.sequence[..] =>
                {
                    c.candidates.clone()
                }
                _ => self
                    .definitions
                    .iter()
                    .filter(|d| (sequence[0] & d.mask[0]) == d.base[0])
                    .map(Rc::clone)
                    .collect(),
            }
        };
        candidates.retain(|d| d.matches_prefix(sequence));
        *self.cache.borrow_mut() = Some(MatchCache {
            sequence: sequence.to_vec(),
            candidates: candidates.clone(),
        });
        candidates
    }

    /// The script the patcher substitutes for a text-box split directive.
    pub fn split_snippet(&self) -> Option<&Script> {
        self.snippet.as_ref()
    }

    /// Install the split snippet from its on-disk command list.
    pub fn set_split_snippet(&mut self, spec: Vec<SnippetCommand>) -> Result<(), DatabaseError> {
        let mut script = Script::new(&self.name);
        for entry in &spec {
            let Some(definition) = self.find(&entry.name).into_iter().next() else {
                return Err(DatabaseError::UnknownSnippetCommand(entry.name.clone()));
            };
            let mut command = Command::new(definition);
            for (parameter, &value) in &entry.values {
                set_named_value(&mut command, parameter, value)?;
            }
            script
                .elements
                .push(crate::element::ScriptElement::Command(command));
        }
        self.snippet = if script.elements.is_empty() {
            None
        } else {
            Some(script)
        };
        self.snippet_spec = spec;
        Ok(())
    }

    /// Load a database from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, DatabaseError> {
        let file: DatabaseFile = serde_json::from_str(json)?;
        let mut db = CommandDatabase::new(file.name);
        for definition in file.commands {
            db.add(definition)?;
        }
        db.set_split_snippet(file.text_box_split_snippet)?;
        Ok(db)
    }

    /// Serialize the database back to JSON, preserving every definition
    /// field (including ones the matcher never consults).
    pub fn to_json(&self) -> Result<String, DatabaseError> {
        let file = DatabaseFile {
            name: self.name.clone(),
            commands: self.definitions.iter().map(|d| (**d).clone()).collect(),
            text_box_split_snippet: self.snippet_spec.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Rebind `command` to a definition of this database it fits.
    ///
    /// Returns `command` unchanged when it is already bound to a suitable
    /// definition of this database. Otherwise searches
    /// `find(command.name())` for a definition in which every element and
    /// parameter of `command` exists and every value is in range, and
    /// returns the command rebound to it with values copied entry by
    /// entry. Returns `None` when no overload fits.
    pub fn make_valid_command(&self, command: &Command) -> Option<Command> {
        let candidates = self.find(command.name());
        if candidates
            .iter()
            .any(|c| Rc::ptr_eq(c, command.definition()))
            && is_suitable(command, command.definition())
        {
            return Some(command.clone());
        }
        candidates
            .into_iter()
            .find(|candidate| is_suitable(command, candidate))
            .map(|candidate| rebind(command, &candidate))
    }
}

/// Set a parameter value by name, searching the command's elements for
/// the first single-entry occurrence of the parameter.
fn set_named_value(command: &mut Command, parameter: &str, value: i64) -> Result<(), DatabaseError> {
    let definition = Rc::clone(command.definition());
    for (index, element) in definition.elements.iter().enumerate() {
        if element.parameter(parameter).is_some() {
            return command.set_value(index, 0, parameter, value);
        }
    }
    Err(DatabaseError::UnknownParameter {
        command: definition.name.clone(),
        parameter: parameter.to_string(),
    })
}

/// Whether every element, parameter, and value of `command` fits
/// `candidate`.
fn is_suitable(command: &Command, candidate: &CommandDefinition) -> bool {
    for (element_def, state) in command.element_pairs() {
        let Some(target) = candidate.element(&element_def.name) else {
            return false;
        };
        match &target.length {
            Some(length) => {
                if !length.in_range(state.entries().len() as i64) {
                    return false;
                }
            }
            None => {
                if state.entries().len() != 1 {
                    return false;
                }
            }
        }
        for entry in state.entries() {
            for parameter in entry.parameters() {
                let Some(target_par) = target.parameter(&parameter.definition().name) else {
                    return false;
                };
                if !target_par.in_range(parameter.value()) {
                    return false;
                }
            }
        }
    }
    true
}

/// Build a copy of `command` bound to `candidate`, copying parameter
/// values entry by entry. `candidate` must already be suitable.
fn rebind(command: &Command, candidate: &Rc<CommandDefinition>) -> Command {
    let mut rebound = Command::new(Rc::clone(candidate));
    let definition = Rc::clone(candidate);
    for (index, element_def) in definition.elements.iter().enumerate() {
        let Some(state) = command.element(&element_def.name) else {
            continue;
        };
        copy_element(&mut rebound, index, element_def, state);
    }
    rebound
}

fn copy_element(
    rebound: &mut Command,
    index: usize,
    element_def: &CommandElementDefinition,
    state: &CommandElement,
) {
    for (entry_index, entry) in state.entries().iter().enumerate() {
        if element_def.has_multiple_entries()
            && let Some(target) = rebound.element_mut(index)
        {
            target.push_entry(element_def);
        }
        for group in &element_def.data_groups {
            for par in &group.parameters {
                if let Some(parameter) = entry.parameter(&par.name) {
                    // Values are in range under the candidate (checked by
                    // is_suitable), so this cannot fail.
                    let _ = rebound.set_value(index, entry_index, &par.name, parameter.value());
                }
            }
        }
    }
}
