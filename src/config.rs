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

//! Knobs for reading and writing packages.

use chrono::{DateTime, Utc};

use crate::shared::DebCompression;

/// Default ceiling for a single control record, in bytes.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1 << 20;

/// Options applied while reading a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    max_record_size: usize,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self {
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }

    /// Sets the largest control record (key, value and folded lines
    /// together) the control parser will buffer before giving up.
    pub fn set_max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size.max(1);
        self
    }

    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options applied while writing a package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteOptions {
    compression: Option<DebCompression>,
    mtime: Option<DateTime<Utc>>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the package's own compression setting.
    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Stamps container members and generated control entries with `mtime`
    /// instead of the current time.
    pub fn set_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn compression(&self) -> Option<DebCompression> {
        self.compression
    }

    // Falls back to the wall clock when no mtime was pinned
    pub(crate) fn mtime_or_now(&self) -> DateTime<Utc> {
        self.mtime.unwrap_or_else(Utc::now)
    }
}
