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

mod fields;
mod package;

use chrono::{TimeZone, Utc};

use crate::*;

pub(crate) fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Uncompressed tar with regular files
pub(crate) fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}

// Raw ar archive with members in the given order
pub(crate) fn ar_of(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = ar::Builder::new(Vec::new());
    for (name, data) in members {
        let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub(crate) const SIMPLE_CONTROL: &[u8] =
    b"Package: test\nVersion: 0.1.0\nArchitecture: all\nDescription: test package\n";

// Hand-assembled package with an uncompressed control and data layer
pub(crate) fn simple_deb(control_tar: &[u8], data_tar: &[u8]) -> Vec<u8> {
    ar_of(&[
        ("debian-binary", b"2.0\n"),
        ("control.tar", control_tar),
        ("data.tar", data_tar),
    ])
}

pub(crate) fn hello_package() -> DebPackage {
    DebPackage::new("hello")
        .set_version("1.0-1")
        .set_architecture("amd64")
        .set_maintainer("NotSludgeBomb <notsludgebomb@protonmail.com>")
        .set_description("test package for deb-pool\nIt prints a greeting.")
        .set_installed_size(12)
        .with_depend("libc6 (>= 2.34)")
        .with_depend("bash")
        .with_file(DebFile::directory("/usr/bin"))
        .with_file(
            DebFile::from_buf(
                "#!/usr/bin/bash\necho hello world!\n".as_bytes().to_vec(),
                "/usr/bin/hello",
            )
            .is_exec(),
        )
        .with_file(DebFile::symlink("/usr/bin/hi", "hello"))
        .postinst_from_str("#!/bin/sh\nexit 0\n")
        .with_control_file(DebFile::from_buf(b"/etc/hello.conf\n".to_vec(), "conffiles"))
        .preinst_from_str("#!/bin/sh\nexit 0\n")
}

pub(crate) fn pinned() -> WriteOptions {
    WriteOptions::new().set_mtime(Utc.with_ymd_and_hms(2023, 9, 1, 12, 0, 0).unwrap())
}
