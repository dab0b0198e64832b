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

use super::{hello_package, init, pinned};
use crate::*;

#[test]
fn build_and_read_package() -> Result<()> {
    init();
    let package = hello_package();
    let mut out = Vec::new();
    package.write_with(&mut out, &pinned())?;
    let reader = DebPackage::read(out.as_slice())?;

    assert_eq!(reader.name(), "hello");
    assert_eq!(reader.version(), "1.0-1");
    assert_eq!(reader.architecture(), "amd64");
    assert_eq!(reader.depends(), &vec!["libc6 (>= 2.34)".to_string(), "bash".to_string()]);
    assert_eq!(reader.maintainer(), "NotSludgeBomb <notsludgebomb@protonmail.com>");
    assert_eq!(reader.description(), "test package for deb-pool\nIt prints a greeting.");
    assert_eq!(reader.control(), package.control());
    assert!(reader.mismatches().is_empty());
    reader.verify()?;
    Ok(())
}

#[test]
fn data_files_round_trip() -> Result<()> {
    let package = hello_package();
    let reader = DebPackage::read(package.to_bytes()?.as_slice())?;

    let paths: Vec<&str> = reader.files().iter().map(|f| f.path()).collect();
    assert_eq!(paths, ["usr/bin", "usr/bin/hello", "usr/bin/hi"]);

    let dir = reader.file("/usr/bin").unwrap();
    assert_eq!(dir.kind(), EntryKind::Directory);
    assert_eq!(dir.mode(), 0o755);
    assert_eq!(dir.md5sum(), None);

    let hello = reader.file("./usr/bin/hello").unwrap();
    assert_eq!(hello.kind(), EntryKind::Regular);
    assert_eq!(hello.mode(), 0o755);
    assert_eq!(hello.contents(), b"#!/usr/bin/bash\necho hello world!\n");
    assert_eq!(hello.md5sum(), Some(&hello.computed_md5()));

    let link = reader.file("usr/bin/hi").unwrap();
    assert_eq!(link.kind(), EntryKind::Symlink);
    assert_eq!(link.link_name(), Some("hello"));
    assert!(link.contents().is_empty());
    Ok(())
}

#[test]
fn control_files_keep_their_order() -> Result<()> {
    let package = hello_package();
    let reader = DebPackage::read(package.to_bytes()?.as_slice())?;

    let paths: Vec<&str> = reader.control_files().iter().map(|f| f.path()).collect();
    assert_eq!(paths, ["postinst", "conffiles", "preinst"]);
    assert_eq!(reader.postinst(), Some(&b"#!/bin/sh\nexit 0\n".to_vec()));
    assert_eq!(reader.control_file("conffiles"), Some(&b"/etc/hello.conf\n".to_vec()));
    assert_eq!(reader.control_files()[0].mode(), 0o755);
    assert_eq!(reader.control_files()[1].mode(), 0o644);
    assert_eq!(reader.prerm(), None);
    Ok(())
}

#[test]
fn replacing_a_script_keeps_its_slot() {
    let package = hello_package().postinst_from_str("#!/bin/sh\necho again\n").no_preinst();
    let paths: Vec<&str> = package.control_files().iter().map(|f| f.path()).collect();
    assert_eq!(paths, ["postinst", "conffiles"]);
    assert_eq!(package.postinst(), Some(&b"#!/bin/sh\necho again\n".to_vec()));
}

#[test]
fn every_compression_reads_back() -> Result<()> {
    init();
    for compression in [
        DebCompression::None,
        DebCompression::Gzip,
        DebCompression::Xz,
        DebCompression::Zstd,
    ] {
        let package = hello_package().set_compression(compression);
        let archive = package.build_with(&pinned())?;
        assert_eq!(archive.control_name(), format!("control.tar{}", compression.extension()));
        assert_eq!(archive.data_name(), format!("data.tar{}", compression.extension()));

        let reader = archive.to_package()?;
        assert_eq!(reader.compression(), compression);
        assert_eq!(reader.control(), package.control());
        assert_eq!(reader.control_files().len(), 3);
        assert_eq!(
            reader.file("usr/bin/hello").map(|f| f.contents().clone()),
            package.file("usr/bin/hello").map(|f| f.contents().clone())
        );
    }
    Ok(())
}

#[test]
fn write_options_override_compression() -> Result<()> {
    let package = hello_package().set_compression(DebCompression::Gzip);
    let options = pinned().set_compression(DebCompression::Zstd);
    let archive = package.build_with(&options)?;
    assert_eq!(archive.control_name(), "control.tar.zst");
    assert_eq!(archive.to_package()?.compression(), DebCompression::Zstd);
    Ok(())
}

#[test]
fn default_compression_is_xz() -> Result<()> {
    let archive = DebPackage::new("plain").build()?;
    assert_eq!(archive.data_name(), "data.tar.xz");
    Ok(())
}

#[test]
fn pinned_mtime_is_reproducible() -> Result<()> {
    let package = hello_package();
    let mut first = Vec::new();
    let mut second = Vec::new();
    let a = package.write_with(&mut first, &pinned())?;
    let b = package.write_with(&mut second, &pinned())?;
    assert_eq!(first, second);
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn archive_root_survives_round_trip() -> Result<()> {
    let package = DebPackage::new("root")
        .set_version("1")
        .with_file(DebFile::directory("./"))
        .with_file(DebFile::from_buf(b"x".to_vec(), "./etc/root.conf"));
    let reader = DebPackage::read(package.to_bytes()?.as_slice())?;
    let paths: Vec<&str> = reader.files().iter().map(|f| f.path()).collect();
    assert_eq!(paths, [".", "etc/root.conf"]);
    Ok(())
}

#[test]
fn md5sums_is_regenerated() -> Result<()> {
    let package = hello_package().with_control_file(DebFile::from_buf(
        b"00000000000000000000000000000000  usr/bin/hello\n".to_vec(),
        "md5sums",
    ));
    let reader = DebPackage::read(package.to_bytes()?.as_slice())?;
    assert!(reader.mismatches().is_empty());
    assert!(reader.control_file("md5sums").is_none());
    reader.verify()?;
    Ok(())
}

#[test]
fn custom_fields_survive() -> Result<()> {
    let package = DebPackage::new("custom")
        .set_version("2.0")
        .set_essential(true)
        .set_field("X-Origin", "local")?
        .set_field("Installed-Size", "99")?;
    let reader = DebPackage::read(package.to_bytes()?.as_slice())?;
    assert_eq!(reader.control().extra.get("x-origin"), Some("local"));
    assert_eq!(reader.control().installed_size, 99);
    assert_eq!(reader.control().essential, "yes");

    let err = DebPackage::new("bad").set_field("Installed-Size", "big").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    Ok(())
}

#[test]
fn relationship_fields_round_trip() -> Result<()> {
    let package = DebPackage::new("tool")
        .set_version("3.1-2")
        .set_source("tool-src")
        .set_section("utils")
        .set_homepage("https://example.org/tool")
        .with_break("tool-old (<< 3.0)")
        .with_provide("tool-any")
        .with_replace("tool-old")
        .with_enhance("shell")
        .with_built_using("gcc-12 (= 12.2.0-14)");
    let bytes = package.to_bytes()?;
    let reader = DebPackage::read(bytes.as_slice())?;

    let control = reader.control();
    assert_eq!(control.source, "tool-src");
    assert_eq!(control.section, "utils");
    assert_eq!(control.homepage, "https://example.org/tool");
    assert_eq!(control.breaks, ["tool-old (<< 3.0)"]);
    assert_eq!(control.provides, ["tool-any"]);
    assert_eq!(control.replaces, ["tool-old"]);
    assert_eq!(control.enhances, ["shell"]);
    assert_eq!(control.built_using, ["gcc-12 (= 12.2.0-14)"]);
    assert_eq!(control, package.control());
    assert_eq!(reader.control().field("Built-Using").as_deref(), Some("gcc-12 (= 12.2.0-14)"));
    Ok(())
}

#[test]
fn canonical_file_name() {
    assert_eq!(hello_package().canonical_name(), "hello_1.0-1_amd64.deb");
}

#[test]
fn save_and_open() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let package = hello_package();
    let path = dir.path().join(package.canonical_name());

    let written = package.save(&path)?;
    assert_eq!(written.size, fs::metadata(&path)?.len());

    let reader = DebPackage::open(&path)?;
    assert_eq!(reader.checksums(), Some(&written));
    assert_eq!(reader.name(), "hello");
    Ok(())
}

#[test]
fn open_missing_file_is_io_error() {
    let err = DebPackage::open("/nonexistent/hello.deb").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("/nonexistent/hello.deb"));
}

#[cfg(unix)]
#[test]
fn with_dir_adds_tree() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir()?;
    fs::create_dir(dir.path().join("sub"))?;
    fs::write(dir.path().join("b"), "bee")?;
    fs::write(dir.path().join("sub/a"), "ay")?;
    fs::set_permissions(dir.path().join("b"), fs::Permissions::from_mode(0o750))?;

    let package =
        DebPackage::new("tree").with_dir(dir.path(), std::path::Path::new("/usr/share/tree"))?;
    let paths: Vec<&str> = package.files().iter().map(|f| f.path()).collect();
    assert_eq!(paths, ["usr/share/tree/b", "usr/share/tree/sub/a"]);
    assert_eq!(package.files()[0].mode(), 0o750);
    assert_eq!(package.files()[1].contents(), b"ay");
    Ok(())
}

#[test]
fn concurrent_reads() -> Result<()> {
    let bytes = hello_package().to_bytes()?;
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| DebPackage::read(bytes.as_slice())))
            .collect();
        for handle in handles {
            let package = handle.join().unwrap().unwrap();
            assert_eq!(package.name(), "hello");
            assert_eq!(package.files().len(), 3);
        }
    });
    Ok(())
}

#[test]
fn read_options_bound_control_records() -> Result<()> {
    let description = "x".repeat(4096);
    let bytes = DebPackage::new("big")
        .set_description(&description)
        .to_bytes()?;

    let err = DebPackage::read_with(bytes.as_slice(), &ReadOptions::new().set_max_record_size(1024))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(matches!(err.root(), Error::RecordTooLarge { limit: 1024 }));

    let reader = DebPackage::read(bytes.as_slice())?;
    assert_eq!(reader.description(), description);
    Ok(())
}
