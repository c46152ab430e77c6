//! Scripts and text archives.

use serde::Serialize;

use crate::element::ScriptElement;

/// An ordered sequence of script elements, logically terminated by a
/// command whose definition always ends the script.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Script {
    /// Name of the command database this script was parsed with.
    pub database_name: String,
    /// The elements in stream order.
    pub elements: Vec<ScriptElement>,
}

impl Script {
    /// Create an empty script bound to the named database.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            elements: Vec::new(),
        }
    }

    /// Whether the script contains any printed element.
    pub fn has_printed_elements(&self) -> bool {
        self.elements.iter().any(ScriptElement::is_printed)
    }
}

/// An ordered sequence of scripts extracted from one ROM region or file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextArchive {
    /// A hex offset or file-stem string identifying the archive.
    pub identifier: String,
    /// The scripts in archive order.
    pub scripts: Vec<Script>,
}

impl TextArchive {
    /// Create an empty archive with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            scripts: Vec::new(),
        }
    }
}

/// Serialize any of the model types to pretty-printed JSON.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
