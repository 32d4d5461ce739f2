//! Cheap plain-text check applied to the head of every downloaded list.
//!
//! Only the first [`PREFIX_LEN`] bytes are inspected. A list is rejected when
//! that prefix holds control bytes (other than TAB, LF and CR) or looks like an
//! HTML page, which is what captive portals and error pages usually return.

use crate::error::{FilterError, FilterResult};

/// Number of leading bytes inspected.
pub const PREFIX_LEN: usize = 4 * 1024;

/// Allows printable UTF-8 text with CR, LF and TAB.
pub fn is_printable_text(data: &[u8]) -> bool {
    data.iter()
        .all(|&c| (c >= b' ' && c != 0x7f) || c == b'\n' || c == b'\r' || c == b'\t')
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Validate a prefix of a filter list.
pub fn validate_prefix(prefix: &[u8]) -> FilterResult<()> {
    let prefix = &prefix[..prefix.len().min(PREFIX_LEN)];

    if !is_printable_text(prefix) {
        return Err(FilterError::ContentRejected("data contains non-printable characters"));
    }

    if contains_ignore_case(prefix, b"<html") || contains_ignore_case(prefix, b"<!doctype") {
        return Err(FilterError::ContentRejected("data is HTML, not plain text"));
    }

    Ok(())
}

/// Collects the leading bytes of a stream chunk by chunk and validates them
/// once the prefix is complete or the stream ends.
#[derive(Debug)]
pub struct PrefixProbe {
    buf: Vec<u8>,
    checked: bool,
}

impl PrefixProbe {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(PREFIX_LEN),
            checked: false,
        }
    }

    /// Feed the next chunk. Fails as soon as a complete prefix is rejected.
    pub fn feed(&mut self, chunk: &[u8]) -> FilterResult<()> {
        if self.checked {
            return Ok(());
        }

        let take = (PREFIX_LEN - self.buf.len()).min(chunk.len());
        self.buf.extend_from_slice(&chunk[..take]);

        if self.buf.len() == PREFIX_LEN {
            self.check()?;
        }
        Ok(())
    }

    /// Called at end of stream so that short lists are validated too.
    pub fn finish(&mut self) -> FilterResult<()> {
        if self.checked {
            return Ok(());
        }
        self.check()
    }

    fn check(&mut self) -> FilterResult<()> {
        validate_prefix(&self.buf)?;
        self.checked = true;
        self.buf = Vec::new();
        Ok(())
    }
}

impl Default for PrefixProbe {
    fn default() -> Self {
        Self::new()
    }
}
