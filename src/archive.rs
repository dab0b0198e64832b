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

//! The outer `ar` container of a Deb package.
//!
//! A package is an `ar` archive with three members, in this order:
//!
//! 1. `debian-binary`, holding the format version `2.0`
//! 2. `control.tar[.gz|.xz|.zst]`, the package's metadata
//! 3. `data.tar[.gz|.xz|.zst]`, the files it installs
//!
//! Anything after the data archive is logged and ignored. Reading and writing
//! both run the raw bytes through MD5, SHA1 and SHA256 on the way past.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::Regex;

use crate::binary::{ChecksumMismatch, DebArchive, DebPackage};
use crate::config::{ReadOptions, WriteOptions};
use crate::control::DebControl;
use crate::digest::{Checksums, HashingReader, HashingWriter};
use crate::error::{Error, Result, ResultExt};
use crate::shared::*;
use crate::tarlayer::{self, EntryHeader, TarWriter};

pub(crate) const DEBIAN_BINARY: &str = "debian-binary";
pub(crate) const FORMAT_VERSION: &[u8] = b"2.0\n";

const STAGE_VERSION: &str = "reading deb version";
const STAGE_CONTROL: &str = "reading control archive";
const STAGE_DATA: &str = "reading data archive";

// `<md5>  <path>`, tolerating a single space or a binary-mode `*`
static MD5SUMS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{32}) [ *]?(.+?)\s*$").expect("md5sums pattern is valid")
});

/// Reads a package from `input` with default options.
pub fn decode<R: Read>(input: R) -> Result<DebPackage> {
    decode_with(input, &ReadOptions::default())
}

/// Reads a package from `input`.
///
/// Checksum mismatches between data files and `md5sums` don't fail the read;
/// they are logged and recorded on the returned package.
pub fn decode_with<R: Read>(input: R, options: &ReadOptions) -> Result<DebPackage> {
    let mut hashed = HashingReader::new(input);
    let mut decoder = Decoder::new(options);

    decoder.read_members(&mut ar::Archive::new(&mut hashed))?;

    let residual = hashed.drain().context("reading package to the end")?;
    if residual != 0 {
        info!("{} unused bytes at the end of the package", residual);
    }

    let package = decoder.finish(hashed.finish())?;
    info!(
        "read package {} {} {}",
        package.control.package, package.control.version, package.control.architecture
    );
    Ok(package)
}

/// Writes `package` to `output` as a complete `.deb` and returns the digests
/// of every byte written.
pub fn encode<W: Write>(package: &DebPackage, output: W) -> Result<Checksums> {
    encode_with(package, output, &WriteOptions::default())
}

pub fn encode_with<W: Write>(
    package: &DebPackage,
    output: W,
    options: &WriteOptions,
) -> Result<Checksums> {
    let checksums = build(package, options)?.write(output)?;
    info!(
        "wrote package {} ({} bytes)",
        package.canonical_name(),
        checksums.size
    );
    Ok(checksums)
}

// State collected while walking the container
struct Decoder<'o> {
    options: &'o ReadOptions,
    control: Option<DebControl>,
    control_files: Vec<DebFile>,
    md5sums: Option<HashMap<String, [u8; 16]>>,
    data: Vec<DebFile>,
    mismatches: Vec<ChecksumMismatch>,
    compression: DebCompression,
}

impl<'o> Decoder<'o> {
    fn new(options: &'o ReadOptions) -> Self {
        Self {
            options,
            control: None,
            control_files: Vec::new(),
            md5sums: None,
            data: Vec::new(),
            mismatches: Vec::new(),
            compression: DebCompression::default(),
        }
    }

    fn read_members<R: Read>(&mut self, archive: &mut ar::Archive<R>) -> Result<()> {
        {
            let (name, mut entry) = next_member(archive, STAGE_VERSION)?;
            if name != DEBIAN_BINARY {
                return Err(Error::structural(format!(
                    "expected {} got {}",
                    DEBIAN_BINARY, name
                ))
                .context(STAGE_VERSION));
            }
            let mut version = Vec::new();
            (&mut entry)
                .take(64)
                .read_to_end(&mut version)
                .context(STAGE_VERSION)?;
            if version != b"2.0\n" && version != b"2.0" {
                return Err(Error::unsupported(format!(
                    "unsupported deb version {:?}",
                    String::from_utf8_lossy(&version)
                ))
                .context(STAGE_VERSION));
            }
            io::copy(&mut entry, &mut io::sink()).context(STAGE_VERSION)?;
        }

        {
            let (name, mut entry) = next_member(archive, STAGE_CONTROL)?;
            if !name.starts_with("control.") {
                return Err(Error::structural(format!("expected control.tar got {}", name))
                    .context(STAGE_CONTROL));
            }
            let layer = tarlayer::open_layers(&name, Box::new(&mut entry))
                .with_context(|| format!("{} {}", STAGE_CONTROL, name))?;
            tarlayer::read_entries(layer, |header, content| {
                self.read_control_entry(header, content)
            })
            .with_context(|| format!("{} {}", STAGE_CONTROL, name))?;
            io::copy(&mut entry, &mut io::sink()).context(STAGE_CONTROL)?;

            if self.control.is_none() {
                return Err(Error::structural(format!("{} has no control file", name))
                    .context(STAGE_CONTROL));
            }
        }

        {
            let (name, mut entry) = next_member(archive, STAGE_DATA)?;
            if !name.starts_with("data.") {
                return Err(Error::structural(format!("expected data.tar got {}", name))
                    .context(STAGE_DATA));
            }
            if let Some(compression) = DebCompression::from_member(&name) {
                self.compression = compression;
            }
            let layer = tarlayer::open_layers(&name, Box::new(&mut entry))
                .with_context(|| format!("{} {}", STAGE_DATA, name))?;
            tarlayer::read_entries(layer, |header, content| self.read_data_entry(header, content))
                .with_context(|| format!("{} {}", STAGE_DATA, name))?;
            io::copy(&mut entry, &mut io::sink()).context(STAGE_DATA)?;
        }

        // Trailing members such as signatures are skipped
        loop {
            match archive.next_entry() {
                None => break,
                Some(Ok(mut entry)) => {
                    let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();
                    info!(
                        "ignoring extra member {} ({} bytes)",
                        name,
                        entry.header().size()
                    );
                    io::copy(&mut entry, &mut io::sink())
                        .with_context(|| format!("skipping extra member {}", name))?;
                }
                Some(Err(e)) => {
                    warn!("ignoring malformed data after the data archive: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    fn read_control_entry(&mut self, header: &EntryHeader, content: &mut dyn Read) -> Result<()> {
        if !header.kind.is_regular() {
            debug!("skipping control entry {}: not a regular file", header.path);
            return Ok(());
        }

        match header.path.as_str() {
            "control" => {
                self.control = Some(DebControl::read_from(
                    content,
                    self.options.max_record_size(),
                )?);
            }
            "md5sums" => {
                self.md5sums = Some(parse_md5sums(content)?);
            }
            _ => {
                let mut buf = Vec::new();
                content.read_to_end(&mut buf)?;
                self.control_files.push(
                    DebFile::from_buf(buf, &header.path)
                        .set_mode(header.mode)
                        .set_mtime(header.mtime),
                );
            }
        }
        Ok(())
    }

    fn read_data_entry(&mut self, header: &EntryHeader, content: &mut dyn Read) -> Result<()> {
        let mut contents = Vec::new();
        content.read_to_end(&mut contents)?;

        let mut declared = None;
        if let (true, Some(sums)) = (header.kind.is_regular(), &self.md5sums) {
            match sums.get(&header.path) {
                Some(expected) => {
                    declared = Some(*expected);
                    let actual = md5::compute(&contents).0;
                    if actual != *expected {
                        let mismatch = ChecksumMismatch {
                            path: header.path.clone(),
                            expected: *expected,
                            actual,
                        };
                        warn!("{}", mismatch.to_error());
                        self.mismatches.push(mismatch);
                    }
                }
                None => debug!("no md5sum for {}", header.path),
            }
        }

        let mut file = DebFile::from_buf(contents, &header.path)
            .set_kind(header.kind)
            .set_mode(header.mode)
            .set_mtime(header.mtime)
            .set_md5sum(declared);
        if let Some(target) = &header.link_name {
            file = file.set_link_name(target.as_str());
        }
        self.data.push(file);
        Ok(())
    }

    fn finish(self, checksums: Checksums) -> Result<DebPackage> {
        if let Some(sums) = &self.md5sums {
            for path in sums.keys() {
                if !self.data.iter().any(|f| f.path() == path) {
                    debug!("md5sums lists {} but the data archive doesn't", path);
                }
            }
        }

        let control = self
            .control
            .ok_or_else(|| Error::structural("package has no control file"))?;
        Ok(DebPackage {
            control,
            control_files: self.control_files,
            data: self.data,
            checksums: Some(checksums),
            mismatches: self.mismatches,
            compression: self.compression,
        })
    }
}

fn next_member<'a, R: Read>(
    archive: &'a mut ar::Archive<R>,
    stage: &str,
) -> Result<(String, Member<ar::Entry<'a, R>>)> {
    match archive.next_entry() {
        None => Err(Error::structural("unexpected end of package").context(stage)),
        Some(Err(e)) => Err(Error::from(e).context(stage)),
        Some(Ok(entry)) => {
            let name = clean_path(&String::from_utf8_lossy(entry.header().identifier()));
            let size = entry.header().size();
            debug!("ar member {} ({} bytes)", name, size);
            Ok((
                name,
                Member {
                    inner: entry,
                    remaining: size,
                },
            ))
        }
    }
}

// An ar member that fails with `UnexpectedEof` if the input ends before its
// declared size has been read
struct Member<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for Member<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.remaining == 0 {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("package truncated {} bytes before the end of a member", self.remaining),
            ));
        }
        self.remaining = self.remaining.saturating_sub(n as u64);
        Ok(n)
    }
}

fn parse_md5sums(content: &mut dyn Read) -> Result<HashMap<String, [u8; 16]>> {
    let mut sums = HashMap::new();
    let mut offset = 0u64;
    for line in BufReader::new(content).split(b'\n') {
        let line = line?;
        let line_offset = offset;
        offset += line.len() as u64 + 1;

        let line = String::from_utf8(line)
            .map_err(|_| Error::parse(line_offset, "md5sums line is not valid UTF-8"))?;
        if line.trim().is_empty() {
            continue;
        }
        let caps = MD5SUMS_LINE
            .captures(&line)
            .ok_or_else(|| Error::parse(line_offset, format!("malformed md5sums line {:?}", line)))?;

        let mut sum = [0u8; 16];
        hex::decode_to_slice(&caps[1], &mut sum)
            .map_err(|e| Error::parse(line_offset, format!("bad md5 in md5sums: {}", e)))?;
        sums.insert(clean_path(&caps[2]), sum);
    }
    debug!("md5sums lists {} files", sums.len());
    Ok(sums)
}

// The md5sums file dpkg expects, covering every regular data file
fn render_md5sums(files: &[DebFile]) -> Vec<u8> {
    let mut out = String::new();
    for file in files.iter().filter(|f| f.kind().is_regular()) {
        out.push_str(&hex::encode(file.computed_md5()));
        out.push_str("  ");
        out.push_str(file.path());
        out.push('\n');
    }
    out.into_bytes()
}

/// Builds both tar layers of `package` into memory.
pub(crate) fn build(package: &DebPackage, options: &WriteOptions) -> Result<DebArchive> {
    let compression = options.compression().unwrap_or(package.compression);
    let mtime = options.mtime_or_now();

    let control = tarlayer::build_layer(compression, |tar| {
        write_control_layer(package, &mtime, tar)
    })
    .context("building control archive")?;

    let data = tarlayer::build_layer(compression, |tar| {
        for file in &package.data {
            tar.append_file(file)?;
        }
        Ok(())
    })
    .context("building data archive")?;

    Ok(DebArchive {
        control_name: format!("control.tar{}", compression.extension()),
        control,
        data_name: format!("data.tar{}", compression.extension()),
        data,
        mtime: to_unix(&mtime),
    })
}

fn write_control_layer(
    package: &DebPackage,
    mtime: &chrono::DateTime<chrono::Utc>,
    tar: &mut TarWriter,
) -> Result<()> {
    let generated = |path: &str, contents: &[u8]| EntryHeader {
        path: path.to_string(),
        kind: EntryKind::Regular,
        mode: 0o644,
        mtime: *mtime,
        size: contents.len() as u64,
        link_name: None,
    };

    let control = package.control.to_bytes()?;
    tar.append(&generated("control", &control), &control)?;

    let md5sums = render_md5sums(&package.data);
    if !md5sums.is_empty() {
        tar.append(&generated("md5sums", &md5sums), &md5sums)?;
    }

    for file in &package.control_files {
        if matches!(file.path(), "control" | "md5sums") {
            warn!("not writing {}: it is generated from the package", file.path());
            continue;
        }
        tar.append_file(file)?;
    }
    Ok(())
}

impl DebArchive {
    /// Writes the package to `output` and returns the digests of every byte
    /// written.
    pub fn write<W: Write>(&self, output: W) -> Result<Checksums> {
        let mut hashed = HashingWriter::new(output);
        {
            let mut archive = ar::Builder::new(&mut hashed);
            append_member(&mut archive, DEBIAN_BINARY, FORMAT_VERSION, self.mtime)
                .context("writing deb version")?;
            append_member(&mut archive, &self.control_name, &self.control, self.mtime)
                .with_context(|| format!("writing {}", self.control_name))?;
            append_member(&mut archive, &self.data_name, &self.data, self.mtime)
                .with_context(|| format!("writing {}", self.data_name))?;
            archive.into_inner().context("finishing package")?;
        }
        hashed.flush()?;
        let (checksums, _) = hashed.finish();
        Ok(checksums)
    }
}

// Odd-sized members get a trailing '\n' pad from the ar builder
pub(crate) fn append_member<W: Write>(
    archive: &mut ar::Builder<W>,
    name: &str,
    data: &[u8],
    mtime: u64,
) -> io::Result<()> {
    let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
    header.set_mode(0o100644);
    header.set_mtime(mtime);
    archive.append(&header, data)
}
