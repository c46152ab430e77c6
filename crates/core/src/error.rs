//! Typed error types for the textarc core.

use std::io;

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error conditions raised by the codecs, scanner, patcher, and driver.
///
/// Format errors inside the scanner are swallowed (the candidate archive
/// is simply discarded); in a direct read they propagate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// A caller supplied an empty name, an out-of-range value, an unknown
    /// format keyword, or a missing file.
    #[error("invalid {what}: {reason}")]
    InvalidInput {
        /// What the caller supplied.
        what: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The byte stream did not parse: unknown opcode, value outside a
    /// parameter's range, unknown label in a write.
    #[error("format error at 0x{offset:06X}: {reason}")]
    Format {
        /// Byte offset the error was detected at.
        offset: usize,
        /// What went wrong.
        reason: String,
    },

    /// A text-box patch could not be applied to its base archive.
    #[error("cannot patch text archive {identifier}: {reason}")]
    Patch {
        /// Identifier of the archive being patched.
        identifier: String,
        /// Why the patch failed.
        reason: String,
    },

    /// Persistent state disagrees with the bytes: an entry declares
    /// compressed data that cannot be decompressed, two entries share an
    /// offset, and the like.
    #[error("inconsistent state: {0}")]
    Inconsistency(String),

    /// A database-level failure (definition validation, value ranges).
    #[error(transparent)]
    Database(#[from] textarc_command_db::DatabaseError),

    /// Underlying stream failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Build an [`Error::InvalidInput`].
    pub fn invalid(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`Error::Format`] at the given byte offset.
    pub fn format(offset: usize, reason: impl Into<String>) -> Self {
        Error::Format {
            offset,
            reason: reason.into(),
        }
    }

    /// Build an [`Error::Patch`] naming the archive.
    pub fn patch(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Patch {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}
