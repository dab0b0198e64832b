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

//! A pure Rust library for reading and writing Deb packages.
//!
//! deb-pool handles the three layers of a binary `.deb`: the outer `ar`
//! container, the (optionally gzip, xz or zstd compressed) control and data
//! tar archives, and the RFC 822 style `control` file. Reading hashes the
//! whole package with MD5, SHA1 and SHA256 in the same pass and checks data
//! files against the package's `md5sums`, which is what a repository indexer
//! needs to build `Packages` entries.
//!
//! [`DebPackage`] is the entry point for both directions; the lower layers
//! ([`textproto`], [`control`], [`tarlayer`]) are public for callers that only
//! need part of the format.

pub mod archive;
pub mod binary;
pub mod config;
pub mod control;
pub mod digest;
pub mod error;
mod shared;
pub mod tarlayer;
pub mod textproto;
#[cfg(test)]
mod test;

pub use binary::{ChecksumMismatch, DebArchive, DebPackage};
pub use config::{ReadOptions, WriteOptions};
pub use control::{DebControl, ExtraFields};
pub use digest::Checksums;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use shared::*;
