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

//! Error types shared by every codec in the crate.

use std::fmt;

/// Result type used throughout deb-pool.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while reading or writing packages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying stream failed or ended early.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A container member is missing, misnamed or out of order.
    #[error("bad deb structure: {0}")]
    Structural(String),

    /// A compression extension, format version or field kind we can't handle.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed control text.
    #[error("parse error at byte {offset}: {message}")]
    Parse { offset: u64, message: String },

    /// A single control record outgrew the configured buffer limit.
    #[error("control record exceeds the {limit} byte limit")]
    RecordTooLarge { limit: usize },

    /// A data file's content disagrees with its `md5sums` entry.
    #[error("md5sum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Another error, labelled with where it happened.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// The broad class of an [`Error`], independent of any context labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    UnsupportedFormat,
    Parse,
    ChecksumMismatch,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Structural => "structural error",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::Parse => "parse error",
            ErrorKind::ChecksumMismatch => "checksum mismatch",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

impl Error {
    pub(crate) fn structural<S: Into<String>>(msg: S) -> Self {
        Self::Structural(msg.into())
    }

    pub(crate) fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub(crate) fn parse<S: Into<String>>(offset: u64, msg: S) -> Self {
        Self::Parse {
            offset,
            message: msg.into(),
        }
    }

    /// Wraps the error with a label naming the stage, member or entry.
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Structural(_) => ErrorKind::Structural,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Parse { .. } | Error::RecordTooLarge { .. } => ErrorKind::Parse,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Returns the innermost error, skipping context labels.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Adds context labels to fallible results.
pub trait ResultExt<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T>;

    fn with_context<S, F>(self, f: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| Error::context(e.into(), context))
    }

    fn with_context<S, F>(self, f: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S,
    {
        self.map_err(|e| Error::context(e.into(), f()))
    }
}
