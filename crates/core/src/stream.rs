//! A seekable cursor over an in-memory byte buffer.
//!
//! Every input file is fully loaded before parsing (the format targets
//! ROM images of at most 32 MiB), so the readers operate on borrowed
//! slices with explicit position bookkeeping.

use crate::error::{Error, Result};

/// A borrowed byte buffer with a read position.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at position 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position. Positions past the end are rejected.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::format(pos, "seek past end of data"));
        }
        self.pos = pos;
        Ok(())
    }

    /// Bytes left between the position and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the position is at the end of the buffer.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// The unread remainder of the buffer.
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Read one byte and advance.
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::format(self.pos, "unexpected end of data"))?;
        self.pos += 1;
        Ok(b)
    }

    /// Advance the position by `count` bytes.
    pub fn advance(&mut self, count: usize) -> Result<()> {
        self.set_position(self.pos + count)
    }

    /// Move the position back by `count` bytes.
    pub fn rewind(&mut self, count: usize) -> Result<()> {
        if count > self.pos {
            return Err(Error::format(self.pos, "rewind past start of data"));
        }
        self.pos -= count;
        Ok(())
    }
}
