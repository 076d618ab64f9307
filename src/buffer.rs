//! Render buffers.

use crate::value::Value;
use core::fmt::Write;

/// An append-only output sink that a view renders into.
#[derive(Debug, Default, Clone)]
pub struct RenderBuffer {
    buffer: String,
}

impl RenderBuffer {
    pub fn new() -> RenderBuffer {
        RenderBuffer::default()
    }

    /// Appends a string.
    pub fn push(&mut self, s: &str) {
        self.buffer.push_str(s);
    }

    /// Appends the text form of a value.
    pub fn append(&mut self, value: &Value) {
        // writing into a String cannot fail
        let _ = write!(self.buffer, "{}", value);
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}
