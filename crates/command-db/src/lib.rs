//! Command database and script model for the textarc toolchain.
//!
//! Holds the definitions describing a game's script commands (byte
//! base/mask prefixes, bit-packed parameter layouts, data-entry tables),
//! the prefix matcher over them, and the in-memory model of parsed
//! scripts and text archives. The binary codecs live in `textarc_core`;
//! this crate is pure data and matching.

#![warn(missing_docs)]

/// The command database and bitmask prefix matcher.
pub mod database;
/// Parameter, element, and command definition metadata.
pub mod defs;
/// The script element model: commands, text, bytes, directives.
pub mod element;
/// Scripts and text archives.
pub mod script;

use thiserror::Error;

/// Errors raised while building or querying a command database.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A command definition violates a structural invariant.
    #[error("invalid command definition {name}: {reason}")]
    InvalidDefinition {
        /// The offending command's name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A value does not fit a parameter's declared range.
    #[error("value {value} out of range for parameter {parameter}")]
    ValueOutOfRange {
        /// The parameter's name.
        parameter: String,
        /// The rejected value.
        value: i64,
    },

    /// A command has no parameter with the given name.
    #[error("command {command} has no parameter {parameter}")]
    UnknownParameter {
        /// The command's name.
        command: String,
        /// The missing parameter's name.
        parameter: String,
    },

    /// The split snippet names a command the database does not define.
    #[error("unknown command {0} in text-box split snippet")]
    UnknownSnippetCommand(String),

    /// JSON (de)serialization failed.
    #[error("invalid database JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

// ── Convenience re-exports ──────────────────────────────────────────────────

pub use database::{CommandDatabase, SnippetCommand};
pub use defs::{
    CommandDefinition, CommandElementDefinition, DataGroup, EndType, OffsetKind,
    ParameterDefinition,
};
pub use element::{Command, DataEntry, Directive, DirectiveKind, NO_JUMP, Parameter, ScriptElement};
pub use script::{Script, TextArchive, to_pretty_json};
