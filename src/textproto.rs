/*
    deb-pool - Rust library for reading and writing Deb packages
    Copyright (C) 2023  NotSludgeBomb

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Streaming reader and writer for the Deb control-file format.
//!
//! A control file is a list of `Key: value` fields. A value continues onto
//! following lines that start with a space or tab; those lines join the value
//! with a newline, so
//!
//! ```text
//! Description: short
//!  longer text
//! ```
//!
//! yields the value `"short\nlonger text"`. Keys are normalized so that the
//! first letter of every hyphen-separated word is upper case and the rest is
//! lower case (`pre-depends` and `PRE-DEPENDS` both become `Pre-Depends`).

use std::io::{self, Read, Write};

use log::trace;

use crate::config::DEFAULT_MAX_RECORD_SIZE;
use crate::error::{Error, Result};

const INITIAL_BUFFER_SIZE: usize = 1024;

/// Normalizes a control field name.
pub fn normalize_key(key: &str) -> String {
    let mut out = Vec::with_capacity(key.len());
    push_key_word(&mut out, key.as_bytes(), true);
    // Only ASCII bytes are case-mapped, so the result is still UTF-8
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

// Appends `word` to `key`, upper-casing the first byte of every hyphen-separated
// word and lower-casing the rest. `at_start` says whether `word` begins one.
fn push_key_word(key: &mut Vec<u8>, word: &[u8], mut at_start: bool) {
    for &c in word {
        key.push(if at_start {
            c.to_ascii_uppercase()
        } else {
            c.to_ascii_lowercase()
        });
        at_start = c == b'-';
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Key,
    Spaces,
    Value,
    Wrap,
    End,
}

/// Pulls `(key, value)` fields out of a control file one at a time.
///
/// The raw bytes of the field being tokenized are kept in a single buffer
/// that doubles whenever it fills up, so folded values of any length are
/// fine up to the configured limit. A field that doesn't fit is reported as
/// [`Error::RecordTooLarge`] instead of growing without bound.
pub struct Reader<R> {
    inner: R,
    buf: Vec<u8>,
    start: usize,  // First byte of the next field
    filled: usize, // End of valid data in `buf`
    offset: u64,   // Stream offset of buf[0]
    limit: usize,
    eof: bool,
    failed: bool,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, DEFAULT_MAX_RECORD_SIZE)
    }

    pub fn with_limit(inner: R, limit: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            start: 0,
            filled: 0,
            offset: 0,
            limit: limit.max(1),
            eof: false,
            failed: false,
        }
    }

    /// Current capacity of the field buffer.
    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    /// Stream offset where the most recently returned field starts.
    pub fn record_offset(&self) -> u64 {
        self.offset
    }

    /// Returns the next field, or `None` once the input is exhausted.
    ///
    /// After an error the reader is finished and keeps returning `None`.
    pub fn next_field(&mut self) -> Result<Option<(String, String)>> {
        if self.failed {
            return Ok(None);
        }
        let result = self.read_field();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn read_field(&mut self) -> Result<Option<(String, String)>> {
        self.compact();

        let mut key: Vec<u8> = Vec::new();
        let mut value: Vec<u8> = Vec::new();
        let mut state = State::Key;
        let mut mark = 0; // Start of the key word or value slice being scanned
        let mut i = 0;

        while state != State::End {
            if i == self.filled {
                if !self.eof {
                    self.fill()?;
                    continue;
                }
                state = match state {
                    State::Key if i == 0 => return Ok(None),
                    State::Key => {
                        return Err(Error::parse(
                            self.offset + i as u64,
                            "unexpected end of input in key",
                        ))
                    }
                    State::Value => {
                        value.extend_from_slice(&self.buf[mark..i]);
                        State::End
                    }
                    _ => State::End,
                };
                continue;
            }

            let c = self.buf[i];
            match state {
                State::Key => match c {
                    b':' => {
                        push_key_word(&mut key, &self.buf[mark..i], true);
                        if key.is_empty() {
                            return Err(Error::parse(self.offset + i as u64, "empty key"));
                        }
                        i += 1;
                        state = State::Spaces;
                    }
                    b'-' => {
                        i += 1;
                        push_key_word(&mut key, &self.buf[mark..i], true);
                        mark = i;
                    }
                    b' ' | b'\t' | b'\n' | b'\r' => {
                        return Err(Error::parse(
                            self.offset + i as u64,
                            "unexpected character in key",
                        ));
                    }
                    _ => i += 1,
                },
                State::Spaces => match c {
                    b' ' | b'\t' => i += 1,
                    _ => {
                        mark = i;
                        state = State::Value;
                    }
                },
                State::Value => match c {
                    b'\n' | b'\r' => {
                        value.extend_from_slice(&self.buf[mark..i]);
                        i += 1;
                        state = State::Wrap;
                    }
                    _ => i += 1,
                },
                State::Wrap => match c {
                    b' ' | b'\t' => {
                        value.push(b'\n');
                        i += 1;
                        state = State::Spaces;
                    }
                    b'\n' | b'\r' => i += 1,
                    _ => state = State::End,
                },
                State::End => unreachable!(),
            }
        }

        let record_offset = self.offset;
        self.start = i;

        let key = String::from_utf8(key)
            .map_err(|_| Error::parse(record_offset, "key is not valid UTF-8"))?;
        let value = String::from_utf8(value)
            .map_err(|_| Error::parse(record_offset, format!("value of {} is not valid UTF-8", key)))?;
        trace!("control field {}: {:?}", key, value);
        Ok(Some((key, value)))
    }

    // Moves the unconsumed tail to the front of the buffer
    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.offset += self.start as u64;
            self.start = 0;
        }
    }

    // Reads more input, growing the buffer geometrically when it's full. The
    // buffer holds at most `limit` bytes of a field plus one byte of lookahead.
    fn fill(&mut self) -> Result<()> {
        let capacity = self.limit.saturating_add(1);
        if self.filled == self.buf.len() {
            if self.buf.len() >= capacity {
                return Err(Error::RecordTooLarge { limit: self.limit });
            }
            let grown = (self.buf.len() * 2)
                .max(INITIAL_BUFFER_SIZE)
                .min(capacity);
            trace!("growing control buffer {} -> {}", self.buf.len(), grown);
            self.buf.resize(grown, 0);
        }
        loop {
            match self.inner.read(&mut self.buf[self.filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_field().transpose()
    }
}

/// Writes control fields, folding multi-line values.
pub struct Writer<W> {
    inner: W,
    buf: Vec<u8>,
    written: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            written: 0,
        }
    }

    /// Writes one field. Every newline inside `value` starts a continuation
    /// line indented by a single space, and the field always ends with exactly
    /// one newline.
    pub fn write_field(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::parse(self.written, "empty key"));
        }
        if key
            .bytes()
            .any(|c| matches!(c, b':' | b' ' | b'\t' | b'\n' | b'\r'))
        {
            return Err(Error::parse(
                self.written,
                format!("unexpected character in key {:?}", key),
            ));
        }

        self.buf.clear();
        push_key_word(&mut self.buf, key.as_bytes(), true);
        self.buf.extend_from_slice(b": ");

        let value = value.as_bytes();
        let mut start = 0;
        for (i, &c) in value.iter().enumerate() {
            if c == b'\n' {
                self.buf.extend_from_slice(&value[start..=i]);
                start = i + 1;
                if start < value.len() {
                    self.buf.push(b' ');
                }
            }
        }
        self.buf.extend_from_slice(&value[start..]);
        if self.buf.last() != Some(&b'\n') {
            self.buf.push(b'\n');
        }

        self.inner.write_all(&self.buf)?;
        self.written += self.buf.len() as u64;
        Ok(())
    }

    /// Total bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
