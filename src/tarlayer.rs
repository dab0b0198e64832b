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

//! The (optionally compressed) tar archives inside a package.

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, trace};
use xz::read::XzDecoder;
use xz::write::XzEncoder;

use crate::error::{Error, Result, ResultExt};
use crate::shared::*;

/// The parts of a tar header the package model cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub path: String, // Cleaned
    pub kind: EntryKind,
    pub mode: u32,
    pub mtime: DateTime<Utc>,
    pub size: u64,
    pub link_name: Option<String>,
}

impl EntryHeader {
    fn from_tar<R: Read>(entry: &tar::Entry<'_, R>) -> io::Result<Self> {
        let header = entry.header();
        Ok(Self {
            path: clean_path(&String::from_utf8_lossy(&entry.path_bytes())),
            kind: EntryKind::from_byte(header.entry_type().as_byte()),
            mode: header.mode()?,
            mtime: from_unix(header.mtime()?),
            size: header.size()?,
            link_name: entry
                .link_name_bytes()
                .map(|target| String::from_utf8_lossy(&target).into_owned()),
        })
    }

    pub fn for_file(file: &DebFile) -> Self {
        Self {
            path: file.path().to_string(),
            kind: file.kind(),
            mode: file.mode(),
            mtime: *file.mtime(),
            size: file.contents().len() as u64,
            link_name: file.link_name().map(str::to_string),
        }
    }
}

// Suffix from the last dot of the final path element
fn extension(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(i) => &base[i..],
        None => "",
    }
}

/// Peels compression layers off a member body based on its name.
///
/// `control.tar.xz` is xz-decoded and then read as tar; `data.tar` is read as
/// tar directly. Extensions are stripped one at a time until `.tar` (or no
/// extension) is left.
pub fn open_layers<'a>(member: &str, mut reader: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>> {
    let mut name = clean_path(member);
    loop {
        let ext = extension(&name).to_string();
        reader = match ext.as_str() {
            "" | ".tar" => return Ok(reader),
            ".gz" => Box::new(GzDecoder::new(reader)),
            ".xz" => Box::new(XzDecoder::new(reader)),
            ".zst" => Box::new(zstd::stream::read::Decoder::new(reader)?),
            other => {
                return Err(Error::unsupported(format!(
                    "unsupported compression {:?} in {}",
                    other, member
                )))
            }
        };
        trace!("{}: peeled {} layer", member, ext);
        name.truncate(name.len() - ext.len());
    }
}

/// Calls `handler` for every entry of the tar stream `layer`.
///
/// Whatever content the handler leaves unread is drained before moving on,
/// since tar entries can only be visited in order.
pub fn read_entries<'a, F>(layer: Box<dyn Read + 'a>, mut handler: F) -> Result<()>
where
    F: FnMut(&EntryHeader, &mut dyn Read) -> Result<()>,
{
    let mut archive = tar::Archive::new(layer);
    for entry in archive.entries().context("reading tar archive")? {
        let mut entry = entry.context("reading tar header")?;
        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let header = EntryHeader::from_tar(&entry)
            .with_context(|| format!("reading tar header of {}", raw_name))?;
        debug!(
            "tar entry {} type={:?} size={} mode={:o}",
            raw_name, header.kind, header.size, header.mode
        );

        let content: &mut dyn Read = &mut entry;
        handler(&header, content).with_context(|| format!("tar entry {}", raw_name))?;

        io::copy(&mut entry, &mut io::sink())
            .with_context(|| format!("skipping rest of tar entry {}", raw_name))?;
    }
    Ok(())
}

/// Collects entries for a tar layer being built.
pub struct TarWriter {
    builder: tar::Builder<Vec<u8>>,
}

impl TarWriter {
    fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    pub fn append(&mut self, entry: &EntryHeader, contents: &[u8]) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::new(entry.kind.as_byte()));
        header.set_mode(entry.mode);
        header.set_mtime(to_unix(&entry.mtime));
        header.set_uid(0);
        header.set_gid(0);
        header.set_username("root")?;
        header.set_groupname("root")?;

        // The tar crate refuses a path with no components, so the archive
        // root is named by hand
        if entry.path == "." {
            header.as_old_mut().name[..2].copy_from_slice(b"./");
            header.set_size(0);
            header.set_cksum();
            return self
                .builder
                .append(&header, io::empty())
                .context("writing tar entry ./");
        }

        let written = match &entry.link_name {
            Some(target) => {
                header.set_size(0);
                self.builder.append_link(&mut header, &entry.path, target)
            }
            None => {
                header.set_size(contents.len() as u64);
                self.builder.append_data(&mut header, &entry.path, contents)
            }
        };
        written.with_context(|| format!("writing tar entry {}", entry.path))
    }

    pub fn append_file(&mut self, file: &DebFile) -> Result<()> {
        self.append(&EntryHeader::for_file(file), file.contents())
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.builder.into_inner().context("finishing tar archive")
    }
}

/// Builds a complete tar layer in memory and compresses it.
///
/// The whole layer has to be buffered because the enclosing `ar` member
/// header records its size up front.
pub fn build_layer<F>(compression: DebCompression, f: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut TarWriter) -> Result<()>,
{
    let mut writer = TarWriter::new();
    f(&mut writer)?;
    let tar = writer.finish()?;
    compress(compression, &tar)
}

// Compressing tar archives per the configured standard
fn compress(compression: DebCompression, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match compression {
        DebCompression::None => out.extend_from_slice(data),
        DebCompression::Gzip => {
            let mut encoder = GzEncoder::new(&mut out, flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?;
        }
        DebCompression::Xz => {
            let mut encoder = XzEncoder::new(&mut out, 9);
            encoder.write_all(data)?;
            encoder.finish()?;
        }
        DebCompression::Zstd => zstd::stream::copy_encode(data, &mut out, 0)?,
    }
    trace!("compressed layer {:?}: {} -> {} bytes", compression, data.len(), out.len());
    Ok(out)
}
