/*
    deb-pool - Rust library for reading and writing Deb packages
    Copyright (C) 2022  NotSludgeBomb

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

use std::fs;
use std::path::Path;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use chrono::{DateTime, TimeZone, Utc};

// Used to configure which compression format is used for data and control archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebCompression {
    None,
    Gzip,
    #[default]
    Xz,
    Zstd,
}

impl DebCompression {
    // Suffix appended to `control.tar` / `data.tar`
    pub fn extension(&self) -> &'static str {
        match self {
            DebCompression::None => "",
            DebCompression::Gzip => ".gz",
            DebCompression::Xz => ".xz",
            DebCompression::Zstd => ".zst",
        }
    }

    // Recovers the compression from a member name like `data.tar.zst`
    pub fn from_member(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once(".tar")?;
        match ext {
            "" => Some(DebCompression::None),
            ".gz" => Some(DebCompression::Gzip),
            ".xz" => Some(DebCompression::Xz),
            ".zst" => Some(DebCompression::Zstd),
            _ => None,
        }
    }
}

// The tar type flag of a file, narrowed to the kinds packages actually carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    HardLink,
    Other(u8),
}

impl EntryKind {
    pub fn from_byte(flag: u8) -> Self {
        match flag {
            b'0' | b'\0' | b'7' => EntryKind::Regular,
            b'1' => EntryKind::HardLink,
            b'2' => EntryKind::Symlink,
            b'5' => EntryKind::Directory,
            other => EntryKind::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            EntryKind::Regular => b'0',
            EntryKind::HardLink => b'1',
            EntryKind::Symlink => b'2',
            EntryKind::Directory => b'5',
            EntryKind::Other(flag) => *flag,
        }
    }

    pub fn is_regular(&self) -> bool {
        *self == EntryKind::Regular
    }
}

/// A file in one of a package's archives.
///
/// Data files and auxiliary control files (maintainer scripts, `conffiles`,
/// `triggers`, ...) share this type. Paths are always stored cleaned and
/// relative, so `/usr/bin/foo`, `./usr/bin/foo` and `usr//bin/foo` all end up
/// as `usr/bin/foo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebFile {
    contents: Vec<u8>,
    mode: u32,
    path: String,
    kind: EntryKind,
    mtime: DateTime<Utc>,
    link_name: Option<String>,
    md5sum: Option<[u8; 16]>, // Sum declared by the package's md5sums, if any
}

impl DebFile {
    // Creates DebFile from AsRef<Path>
    #[cfg(unix)]
    pub fn from_path<F, T>(from: F, to: T) -> std::io::Result<Self>
    where
        F: AsRef<Path>,
        T: AsRef<str>,
    {
        let metadata = fs::metadata(&from)?;
        Ok(Self::from_buf(fs::read(&from)?, to)
            .set_mode(metadata.mode() & 0o7777)
            .set_mtime(DateTime::<Utc>::from(metadata.modified()?)))
    }

    // Same function but for Windows, as file modes are a Unix feature
    #[cfg(windows)]
    pub fn from_path<F, T>(from: F, to: T) -> std::io::Result<Self>
    where
        F: AsRef<Path>,
        T: AsRef<str>,
    {
        let metadata = fs::metadata(&from)?;
        Ok(Self::from_buf(fs::read(&from)?, to)
            .set_mtime(DateTime::<Utc>::from(metadata.modified()?)))
    }

    // Creates a regular DebFile from Vec<u8>
    pub fn from_buf<T: AsRef<str>>(buf: Vec<u8>, to: T) -> Self {
        Self {
            contents: buf,
            mode: 0o644,
            path: clean_path(to.as_ref()),
            kind: EntryKind::Regular,
            mtime: DateTime::<Utc>::default(),
            link_name: None,
            md5sum: None,
        }
    }

    // Creates a directory entry
    pub fn directory<T: AsRef<str>>(to: T) -> Self {
        Self::from_buf(Vec::new(), to)
            .set_kind(EntryKind::Directory)
            .set_mode(0o755)
    }

    // Creates a symbolic link pointing at `target`
    pub fn symlink<T: AsRef<str>, L: Into<String>>(to: T, target: L) -> Self {
        Self::from_buf(Vec::new(), to)
            .set_kind(EntryKind::Symlink)
            .set_mode(0o777)
            .set_link_name(target)
    }

    // Sets the file's mode to have executable permissions
    pub fn is_exec(mut self) -> Self {
        self.mode = 0o755;
        self
    }

    // Sets the file's mode to have rw- permissions
    pub fn is_conf(mut self) -> Self {
        self.mode = 0o644;
        self
    }

    // Sets the file's contents
    pub fn set_contents(mut self, contents: Vec<u8>) -> Self {
        self.contents = contents;
        self
    }

    // Sets the file's mode
    pub fn set_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    // Sets the file's path, cleaning it on the way in
    pub fn set_path<T: AsRef<str>>(mut self, to: T) -> Self {
        self.path = clean_path(to.as_ref());
        self
    }

    pub fn set_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn set_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn set_link_name<L: Into<String>>(mut self, target: L) -> Self {
        self.link_name = Some(target.into());
        self
    }

    pub(crate) fn set_md5sum(mut self, sum: Option<[u8; 16]>) -> Self {
        self.md5sum = sum;
        self
    }

    // Returns the file's contents
    pub fn contents(&self) -> &Vec<u8> {
        &self.contents
    }

    // Returns the file's mode
    pub fn mode(&self) -> u32 {
        self.mode
    }

    // Returns the file's cleaned path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn mtime(&self) -> &DateTime<Utc> {
        &self.mtime
    }

    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }

    /// Returns the MD5 the package's `md5sums` declared for this file.
    pub fn md5sum(&self) -> Option<&[u8; 16]> {
        self.md5sum.as_ref()
    }

    /// Returns the MD5 of the file's actual contents.
    pub fn computed_md5(&self) -> [u8; 16] {
        md5::compute(&self.contents).0
    }
}

/// Cleans an archive path lexically.
///
/// Empty and `.` components are dropped, `..` removes the previous component
/// and can never climb above the root, and the result has neither a leading
/// nor a trailing slash. The root itself is `.`.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

// Converts tar/ar style seconds to a timestamp, falling back to the epoch
pub(crate) fn from_unix(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_default()
}

// Inverse of `from_unix`; times before the epoch clamp to zero
pub(crate) fn to_unix(time: &DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp()).unwrap_or(0)
}
