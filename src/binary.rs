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

//! Build and read binary Deb packages.
//!
//! Binary packages contain executable programs, documentation for said executables,
//! configuration files, libraries, etc. Basically, anything that's not source code.
//!
//! # Example
//!
//! ```
//! use deb_pool::*;
//!
//! fn main() -> deb_pool::Result<()> {
//!     let package = DebPackage::new("example")
//!         .set_version("0.1.0")
//!         .set_description("deb-pool example")
//!         .set_architecture("amd64")
//!         .with_depend("bash")
//!         .with_file(DebFile::from_path(
//!             "target/release/example",
//!             "/usr/bin/example",
//!         )?);
//!
//!     let checksums = package.save("example_0.1.0_amd64.deb")?;
//!     println!("sha256 {}", checksums.sha256_hex());
//!
//!     let package = DebPackage::open("example_0.1.0_amd64.deb")?;
//!     package.verify()?;
//!     Ok(())
//! }
//! ```

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::archive;
use crate::config::{ReadOptions, WriteOptions};
use crate::control::DebControl;
use crate::digest::Checksums;
use crate::error::{Error, Result, ResultExt};
use crate::shared::*;

/// A data file whose content didn't match the sum `md5sums` declared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub path: String,
    pub expected: [u8; 16],
    pub actual: [u8; 16],
}

impl ChecksumMismatch {
    pub fn to_error(&self) -> Error {
        Error::ChecksumMismatch {
            path: self.path.clone(),
            expected: hex::encode(self.expected),
            actual: hex::encode(self.actual),
        }
    }
}

/// High-level interface for Deb packages.
///
/// A package is its control metadata, the auxiliary control files that ship
/// next to it (maintainer scripts, `conffiles`, `triggers`, ...) in the order
/// they appear, and the data files it installs. The `control` and `md5sums`
/// entries of the control archive are not stored; both are regenerated when
/// the package is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebPackage {
    pub(crate) control: DebControl,              // Package's metadata
    pub(crate) control_files: Vec<DebFile>,      // Scripts and other control entries
    pub(crate) data: Vec<DebFile>,               // Package's contents
    pub(crate) checksums: Option<Checksums>,     // Digests of the file it was read from
    pub(crate) mismatches: Vec<ChecksumMismatch>,
    pub(crate) compression: DebCompression,      // Configures the package's compression standard
}

impl DebPackage {
    /// Creates a new DebPackage with `name` as it's name.
    pub fn new(name: &str) -> Self {
        let mut control = DebControl::new();
        control.package = name.to_string();
        control.architecture = "all".to_string();
        Self::from_control(control)
    }

    /// Creates a DebPackage around existing metadata.
    pub fn from_control(control: DebControl) -> Self {
        Self {
            control,
            control_files: Vec::new(),
            data: Vec::new(),
            checksums: None,
            mismatches: Vec::new(),
            compression: DebCompression::default(),
        }
    }

    /// Reads a DebPackage from `input`.
    pub fn read<R: Read>(input: R) -> Result<Self> {
        archive::decode(input)
    }

    pub fn read_with<R: Read>(input: R, options: &ReadOptions) -> Result<Self> {
        archive::decode_with(input, options)
    }

    /// Reads the package file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ReadOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file =
            fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::read_with(BufReader::new(file), options)
            .with_context(|| format!("reading {}", path.display()))
    }

    /// Sets the package's name.
    pub fn set_name(mut self, name: &str) -> Self {
        self.control.package = name.to_string();
        self
    }

    /// Sets the package's version.
    pub fn set_version(mut self, version: &str) -> Self {
        self.control.version = version.to_string();
        self
    }

    /// Sets the package's priority.
    pub fn set_priority(mut self, priority: &str) -> Self {
        self.control.priority = priority.to_string();
        self
    }

    /// Sets the package's architecture.
    pub fn set_architecture(mut self, architecture: &str) -> Self {
        self.control.architecture = architecture.to_string();
        self
    }

    /// Sets the package's section.
    pub fn set_section(mut self, section: &str) -> Self {
        self.control.section = section.to_string();
        self
    }

    /// Sets the source package this was built from.
    pub fn set_source(mut self, source: &str) -> Self {
        self.control.source = source.to_string();
        self
    }

    /// Sets whether the package is essential.
    pub fn set_essential(mut self, essential: bool) -> Self {
        self.control.essential = if essential { "yes".to_string() } else { String::new() };
        self
    }

    /// Sets the package's installed size, in KiB.
    pub fn set_installed_size(mut self, size: i64) -> Self {
        self.control.installed_size = size;
        self
    }

    /// Adds a single dependency from &str.
    pub fn with_depend(mut self, depend: &str) -> Self {
        self.control.depends.push(depend.to_string());
        self
    }

    /// Adds a number of dependencies from Vec<&str>.
    pub fn with_depends(mut self, depends: Vec<&str>) -> Self {
        self.control
            .depends
            .extend(depends.iter().map(|str| str.to_string()));
        self
    }

    /// Resets dependencies.
    pub fn no_depends(mut self) -> Self {
        self.control.depends = Vec::new();
        self
    }

    /// Adds a single pre-dependency from &str.
    pub fn with_pre_depend(mut self, depend: &str) -> Self {
        self.control.pre_depends.push(depend.to_string());
        self
    }

    /// Adds a number of pre-dependencies from Vec<&str>.
    pub fn with_pre_depends(mut self, depends: Vec<&str>) -> Self {
        self.control
            .pre_depends
            .extend(depends.iter().map(|str| str.to_string()));
        self
    }

    /// Resets pre-dependencies.
    pub fn no_pre_depends(mut self) -> Self {
        self.control.pre_depends = Vec::new();
        self
    }

    /// Adds a single recommend from &str.
    pub fn with_recommend(mut self, recommend: &str) -> Self {
        self.control.recommends.push(recommend.to_string());
        self
    }

    /// Resets recommends.
    pub fn no_recommends(mut self) -> Self {
        self.control.recommends = Vec::new();
        self
    }

    /// Adds a single suggest from &str.
    pub fn with_suggest(mut self, suggest: &str) -> Self {
        self.control.suggests.push(suggest.to_string());
        self
    }

    /// Resets suggests.
    pub fn no_suggests(mut self) -> Self {
        self.control.suggests = Vec::new();
        self
    }

    /// Adds a single break from &str.
    pub fn with_break(mut self, conflict: &str) -> Self {
        self.control.breaks.push(conflict.to_string());
        self
    }

    /// Adds a single conflict from &str.
    pub fn with_conflict(mut self, conflict: &str) -> Self {
        self.control.conflicts.push(conflict.to_string());
        self
    }

    /// Adds a single provide from &str.
    pub fn with_provide(mut self, provide: &str) -> Self {
        self.control.provides.push(provide.to_string());
        self
    }

    /// Adds a single replace from &str.
    pub fn with_replace(mut self, replace: &str) -> Self {
        self.control.replaces.push(replace.to_string());
        self
    }

    /// Adds a single enhance from &str.
    pub fn with_enhance(mut self, enhance: &str) -> Self {
        self.control.enhances.push(enhance.to_string());
        self
    }

    /// Adds a "built using" package, e.g. `gcc-12 (= 12.2.0-14)`.
    pub fn with_built_using(mut self, using: &str) -> Self {
        self.control.built_using.push(using.to_string());
        self
    }

    /// Sets the package's maintainer.
    pub fn set_maintainer(mut self, maintainer: &str) -> Self {
        self.control.maintainer = maintainer.to_string();
        self
    }

    /// Sets the package's description.
    ///
    /// The first line is the synopsis; any further lines become the extended
    /// description and are folded when the control file is written.
    pub fn set_description(mut self, description: &str) -> Self {
        self.control.description = description.to_string();
        self
    }

    /// Sets the package's homepage.
    pub fn set_homepage(mut self, homepage: &str) -> Self {
        self.control.homepage = homepage.to_string();
        self
    }

    /// Sets any control field by name.
    ///
    /// Known fields are parsed into their typed slot (so `Installed-Size`
    /// must be an integer); anything else is kept as an extra field.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the value doesn't fit the field.
    pub fn set_field(mut self, key: &str, value: &str) -> Result<Self> {
        self.control.set_field(key, value)?;
        Ok(self)
    }

    /// Adds a file to the package.
    pub fn with_file(mut self, file: DebFile) -> Self {
        self.data.push(file);
        self
    }

    /// Recursively adds directory `from` to package as `to`.
    ///
    /// This adds all files and sub-directories to `to`. For example, if you
    /// had a directory `test` containing the files `foo` and `bar`, then
    /// you can add those files as `/usr/bin/foo` and `/usr/bin/bar` with
    /// `with_dir("test", "/usr/bin")?;`
    ///
    /// This function isn't available when compiling on Windows, as it's utility
    /// relies on being able to read the modes of the directory's children,
    /// which is a feature Windows lacks.
    ///
    /// # Errors
    ///
    /// This function may return an error if `from` doesn't exist.
    #[cfg(unix)]
    pub fn with_dir<P>(mut self, from: P, to: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path_from = PathBuf::from(from.as_ref());
        let path_to = PathBuf::from(to.as_ref());
        for file_result in walkdir::WalkDir::new(&path_from).sort_by_file_name() {
            let file = file_result
                .map_err(std::io::Error::from)
                .with_context(|| format!("walking {}", path_from.display()))?;
            if file.file_type().is_file() {
                // Cutting the `from` directory out of the path
                let relative = file.path().strip_prefix(&path_from).unwrap_or(file.path());
                let target = path_to.join(relative);
                self = self.with_file(
                    DebFile::from_path(file.path(), target.to_string_lossy())
                        .with_context(|| format!("reading {}", file.path().display()))?,
                );
            }
        }
        Ok(self)
    }

    /// Removes all file's from the package.
    pub fn clear_files(mut self) -> Self {
        self.data = Vec::new();
        self
    }

    /// Adds an auxiliary control file, replacing one with the same path.
    ///
    /// Replacements keep their original position so the control archive
    /// is written in a stable order.
    pub fn with_control_file(mut self, file: DebFile) -> Self {
        match self.control_files.iter_mut().find(|f| f.path() == file.path()) {
            Some(slot) => *slot = file,
            None => self.control_files.push(file),
        }
        self
    }

    /// Removes the auxiliary control file at `path`.
    pub fn no_control_file(mut self, path: &str) -> Self {
        let path = clean_path(path);
        self.control_files.retain(|f| f.path() != path);
        self
    }

    fn with_script(self, name: &str, script: Vec<u8>) -> Self {
        self.with_control_file(DebFile::from_buf(script, name).is_exec())
    }

    /// Sets config script from &str.
    pub fn config_from_str(self, script: &str) -> Self {
        self.with_script("config", script.as_bytes().to_vec())
    }

    /// Sets config script from Vec<u8>.
    pub fn config_from_buf(self, script: Vec<u8>) -> Self {
        self.with_script("config", script)
    }

    /// Resets config script.
    pub fn no_config(self) -> Self {
        self.no_control_file("config")
    }

    /// Sets preinst script from &str.
    pub fn preinst_from_str(self, script: &str) -> Self {
        self.with_script("preinst", script.as_bytes().to_vec())
    }

    /// Sets preinst script from Vec<u8>.
    pub fn preinst_from_buf(self, script: Vec<u8>) -> Self {
        self.with_script("preinst", script)
    }

    /// Resets preinst script.
    pub fn no_preinst(self) -> Self {
        self.no_control_file("preinst")
    }

    /// Sets postinst script from &str.
    pub fn postinst_from_str(self, script: &str) -> Self {
        self.with_script("postinst", script.as_bytes().to_vec())
    }

    /// Sets postinst script from Vec<u8>.
    pub fn postinst_from_buf(self, script: Vec<u8>) -> Self {
        self.with_script("postinst", script)
    }

    /// Resets postinst script.
    pub fn no_postinst(self) -> Self {
        self.no_control_file("postinst")
    }

    /// Sets prerm script from &str.
    pub fn prerm_from_str(self, script: &str) -> Self {
        self.with_script("prerm", script.as_bytes().to_vec())
    }

    /// Sets prerm script from Vec<u8>.
    pub fn prerm_from_buf(self, script: Vec<u8>) -> Self {
        self.with_script("prerm", script)
    }

    /// Resets prerm script.
    pub fn no_prerm(self) -> Self {
        self.no_control_file("prerm")
    }

    /// Sets postrm script from &str.
    pub fn postrm_from_str(self, script: &str) -> Self {
        self.with_script("postrm", script.as_bytes().to_vec())
    }

    /// Sets postrm script from Vec<u8>.
    pub fn postrm_from_buf(self, script: Vec<u8>) -> Self {
        self.with_script("postrm", script)
    }

    /// Resets postrm script.
    pub fn no_postrm(self) -> Self {
        self.no_control_file("postrm")
    }

    /// Sets the package's compression standard.
    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Returns the package's name.
    pub fn name(&self) -> &str {
        &self.control.package
    }

    /// Returns the package's version.
    pub fn version(&self) -> &str {
        &self.control.version
    }

    /// Returns the package's architecture.
    pub fn architecture(&self) -> &str {
        &self.control.architecture
    }

    /// Returns the package's depends.
    pub fn depends(&self) -> &Vec<String> {
        &self.control.depends
    }

    /// Returns the package's maintainer.
    pub fn maintainer(&self) -> &str {
        &self.control.maintainer
    }

    /// Returns the package's description.
    pub fn description(&self) -> &str {
        &self.control.description
    }

    /// Returns the package's metadata.
    pub fn control(&self) -> &DebControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut DebControl {
        &mut self.control
    }

    /// Returns a vector of the packages files.
    pub fn files(&self) -> &Vec<DebFile> {
        &self.data
    }

    /// Looks up a data file by path.
    pub fn file(&self, path: &str) -> Option<&DebFile> {
        let path = clean_path(path);
        self.data.iter().find(|f| f.path() == path)
    }

    /// Returns the auxiliary control files in archive order.
    pub fn control_files(&self) -> &Vec<DebFile> {
        &self.control_files
    }

    /// Returns the contents of the auxiliary control file at `path`.
    pub fn control_file(&self, path: &str) -> Option<&Vec<u8>> {
        let path = clean_path(path);
        self.control_files
            .iter()
            .find(|f| f.path() == path)
            .map(|f| f.contents())
    }

    /// Returns the package's config script.
    pub fn config(&self) -> Option<&Vec<u8>> {
        self.control_file("config")
    }

    /// Returns the package's preinst script.
    pub fn preinst(&self) -> Option<&Vec<u8>> {
        self.control_file("preinst")
    }

    /// Returns the package's postinst script.
    pub fn postinst(&self) -> Option<&Vec<u8>> {
        self.control_file("postinst")
    }

    /// Returns the package's prerm script.
    pub fn prerm(&self) -> Option<&Vec<u8>> {
        self.control_file("prerm")
    }

    /// Returns the package's postrm script.
    pub fn postrm(&self) -> Option<&Vec<u8>> {
        self.control_file("postrm")
    }

    /// Returns the package's compression standard.
    pub fn compression(&self) -> DebCompression {
        self.compression
    }

    /// Digests of the byte stream this package was read from.
    ///
    /// `None` for packages built in memory.
    pub fn checksums(&self) -> Option<&Checksums> {
        self.checksums.as_ref()
    }

    /// Data files whose content didn't match `md5sums` when read.
    pub fn mismatches(&self) -> &[ChecksumMismatch] {
        &self.mismatches
    }

    /// Fails with the first recorded checksum mismatch, if any.
    pub fn verify(&self) -> Result<()> {
        match self.mismatches.first() {
            Some(mismatch) => Err(mismatch.to_error()),
            None => Ok(()),
        }
    }

    /// The conventional file name, `<package>_<version>_<architecture>.deb`.
    pub fn canonical_name(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.control.package, self.control.version, self.control.architecture
        )
    }

    /// Builds the package into a DebArchive struct.
    pub fn build(&self) -> Result<DebArchive> {
        self.build_with(&WriteOptions::default())
    }

    pub fn build_with(&self, options: &WriteOptions) -> Result<DebArchive> {
        archive::build(self, options)
    }

    /// Writes the package to `output` and returns the digests of what was
    /// written.
    pub fn write<W: Write>(&self, output: W) -> Result<Checksums> {
        self.write_with(output, &WriteOptions::default())
    }

    pub fn write_with<W: Write>(&self, output: W, options: &WriteOptions) -> Result<Checksums> {
        archive::encode_with(self, output, options)
    }

    /// Returns the package as a complete `.deb` byte stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Writes the package to the file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<Checksums> {
        let path = path.as_ref();
        let file =
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut output = BufWriter::new(file);
        let checksums = self
            .write(&mut output)
            .with_context(|| format!("writing {}", path.display()))?;
        output
            .flush()
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("saved {}", path.display());
        Ok(checksums)
    }
}

/// An intermediary layer between the DebPackage struct and an actual .deb file.
///
/// Both tar layers are already built and compressed; all that's left is to
/// frame them in the outer `ar` container with `write()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebArchive {
    pub(crate) control_name: String,
    pub(crate) control: Vec<u8>,
    pub(crate) data_name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) mtime: u64,
}

impl DebArchive {
    /// Member name of the control archive, e.g. `control.tar.xz`.
    pub fn control_name(&self) -> &str {
        &self.control_name
    }

    /// Compressed bytes of the control archive.
    pub fn control(&self) -> &[u8] {
        &self.control
    }

    pub fn data_name(&self) -> &str {
        &self.data_name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Converts DebArchive back to a DebPackage.
    ///
    /// # Errors
    ///
    /// This function may return an error if the archive's control file (where all
    /// of a package's metadata is stored) contains invalid syntax.
    pub fn to_package(&self) -> Result<DebPackage> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        archive::decode(bytes.as_slice())
    }
}
