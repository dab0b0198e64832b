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

//! Whole-package digests, computed while the bytes stream past.

use std::io::{self, Read, Write};

use log::debug;
use sha1::{Digest, Sha1};
use sha2::Sha256;

/// Digests and length of a complete package byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checksums {
    pub md5: [u8; 16],
    pub sha1: [u8; 20],
    pub sha256: [u8; 32],
    pub size: u64,
}

impl Checksums {
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1)
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

// The three running digests plus a byte counter
struct Hashers {
    md5: md5::Context,
    sha1: Sha1,
    sha256: Sha256,
    size: u64,
}

impl Hashers {
    fn new() -> Self {
        Self {
            md5: md5::Context::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            size: 0,
        }
    }

    fn update(&mut self, buf: &[u8]) {
        self.md5.consume(buf);
        self.sha1.update(buf);
        self.sha256.update(buf);
        self.size += buf.len() as u64;
    }

    fn finish(self) -> Checksums {
        let checksums = Checksums {
            md5: self.md5.compute().0,
            sha1: self.sha1.finalize().into(),
            sha256: self.sha256.finalize().into(),
            size: self.size,
        };
        debug!(
            "package digests: size={} md5={} sha1={} sha256={}",
            checksums.size,
            checksums.md5_hex(),
            checksums.sha1_hex(),
            checksums.sha256_hex()
        );
        checksums
    }
}

/// A reader that hashes every byte handed to its consumer.
pub struct HashingReader<R> {
    inner: R,
    hashers: Hashers,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hashers: Hashers::new(),
        }
    }

    /// Reads whatever the consumer left behind so the digests cover the
    /// entire stream. Returns how many residual bytes there were.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Number of bytes seen so far.
    pub fn position(&self) -> u64 {
        self.hashers.size
    }

    pub fn finish(self) -> Checksums {
        self.hashers.finish()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hashers.update(&buf[..n]);
        Ok(n)
    }
}

/// A writer that hashes every byte its inner writer accepts.
pub struct HashingWriter<W> {
    inner: W,
    hashers: Hashers,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hashers: Hashers::new(),
        }
    }

    /// Returns the digests and the inner writer.
    pub fn finish(self) -> (Checksums, W) {
        (self.hashers.finish(), self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hashers.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
