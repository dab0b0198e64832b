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

//! The `control` file of a binary package.
//!
//! Well-known fields are mapped onto typed members of [`DebControl`] through
//! the static [`FIELDS`] table. Everything else is kept verbatim, in the
//! order it was first seen, in [`ExtraFields`].
//!
//! More about these fields here:
//! <https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control>

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::textproto::{self, normalize_key};

/// How a known field's value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// Comma separated; items are trimmed.
    List,
}

// One typed member of DebControl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Package,
    Version,
    Architecture,
    InstalledSize,
    Source,
    Section,
    Priority,
    Essential,
    Maintainer,
    Vendor,
    Depends,
    PreDepends,
    Recommends,
    Suggests,
    Enhances,
    Breaks,
    Replaces,
    Provides,
    Conflicts,
    BuiltUsing,
    Homepage,
    Description,
}

/// A row of the known-field table.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub omit_empty: bool,
    slot: Slot,
}

const fn field(name: &'static str, kind: FieldKind, omit_empty: bool, slot: Slot) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        omit_empty,
        slot,
    }
}

/// Known control fields, in the order they are written out.
pub static FIELDS: [FieldSpec; 22] = [
    field("Package", FieldKind::Text, false, Slot::Package),
    field("Version", FieldKind::Text, false, Slot::Version),
    field("Architecture", FieldKind::Text, false, Slot::Architecture),
    field("Installed-Size", FieldKind::Integer, false, Slot::InstalledSize),
    field("Source", FieldKind::Text, true, Slot::Source),
    field("Section", FieldKind::Text, true, Slot::Section),
    field("Priority", FieldKind::Text, true, Slot::Priority),
    field("Essential", FieldKind::Text, true, Slot::Essential),
    field("Maintainer", FieldKind::Text, true, Slot::Maintainer),
    field("Vendor", FieldKind::Text, true, Slot::Vendor),
    field("Depends", FieldKind::List, true, Slot::Depends),
    field("Pre-Depends", FieldKind::List, true, Slot::PreDepends),
    field("Recommends", FieldKind::List, true, Slot::Recommends),
    field("Suggests", FieldKind::List, true, Slot::Suggests),
    field("Enhances", FieldKind::List, true, Slot::Enhances),
    field("Breaks", FieldKind::List, true, Slot::Breaks),
    field("Replaces", FieldKind::List, true, Slot::Replaces),
    field("Provides", FieldKind::List, true, Slot::Provides),
    field("Conflicts", FieldKind::List, true, Slot::Conflicts),
    field("Built-Using", FieldKind::List, true, Slot::BuiltUsing),
    field("Homepage", FieldKind::Text, true, Slot::Homepage),
    field("Description", FieldKind::Text, true, Slot::Description),
];

static INDEX: LazyLock<HashMap<&'static str, &'static FieldSpec>> =
    LazyLock::new(|| FIELDS.iter().map(|spec| (spec.name, spec)).collect());

/// Looks up a known field by its normalized name.
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    INDEX.get(name).copied()
}

/// Unknown control fields, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFields {
    fields: Vec<(String, String)>,
}

impl ExtraFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field. A key that is already present keeps its position.
    pub fn insert<K: AsRef<str>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = normalize_key(key.as_ref());
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let pos = self.fields.iter().position(|(k, _)| *k == key)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

enum SlotRef<'a> {
    Text(&'a str),
    Integer(i64),
    List(&'a [String]),
}

enum SlotMut<'a> {
    Text(&'a mut String),
    Integer(&'a mut i64),
    List(&'a mut Vec<String>),
}

/// A package's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebControl {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub installed_size: i64,
    pub source: String,
    pub section: String,
    pub priority: String,
    pub essential: String,
    pub maintainer: String,
    pub vendor: String,
    pub depends: Vec<String>,
    pub pre_depends: Vec<String>,
    pub recommends: Vec<String>,
    pub suggests: Vec<String>,
    pub enhances: Vec<String>,
    pub breaks: Vec<String>,
    pub replaces: Vec<String>,
    pub provides: Vec<String>,
    pub conflicts: Vec<String>,
    pub built_using: Vec<String>,
    pub homepage: String,
    pub description: String,
    pub extra: ExtraFields,
}

impl DebControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a control file from `input`, buffering at most `max_record_size`
    /// bytes for any single field.
    pub fn read_from<R: Read>(input: R, max_record_size: usize) -> Result<Self> {
        let mut output = Self::new();
        let mut reader = textproto::Reader::with_limit(input, max_record_size);
        while let Some((key, value)) = reader.next_field()? {
            output
                .set_normalized(&key, value)
                .map_err(|e| match e {
                    Error::Parse { message, .. } => Error::parse(reader.record_offset(), message),
                    other => other,
                })?;
        }
        Ok(output)
    }

    /// Writes the known fields in table order, then the unknown ones in the
    /// order they were added. Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, output: W) -> Result<u64> {
        let mut writer = textproto::Writer::new(output);
        for spec in FIELDS.iter() {
            if let Some(value) = self.render(spec) {
                writer.write_field(spec.name, &value)?;
            }
        }
        for (key, value) in self.extra.iter() {
            writer.write_field(key, value)?;
        }
        Ok(writer.written())
    }

    // Converts DebControl into a dpkg-readable control file
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Sets any field by name, routing known names to their typed member.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_normalized(&normalize_key(key), value.to_string())
    }

    /// Returns a field's value as it would be written, or `None` when the
    /// field is unset.
    pub fn field(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        match field_spec(&key) {
            Some(spec) => match self.slot(spec.slot) {
                SlotRef::Text(s) if s.is_empty() => None,
                SlotRef::List(l) if l.is_empty() => None,
                _ => Some(self.render_value(spec)),
            },
            None => self.extra.get(&key).map(str::to_string),
        }
    }

    fn set_normalized(&mut self, key: &str, value: String) -> Result<()> {
        let Some(spec) = field_spec(key) else {
            self.extra.insert(key, value);
            return Ok(());
        };
        match (spec.kind, self.slot_mut(spec.slot)) {
            (FieldKind::Text, SlotMut::Text(slot)) => *slot = value,
            (FieldKind::Integer, SlotMut::Integer(slot)) => {
                *slot = value.trim().parse().map_err(|_| {
                    Error::parse(0, format!("invalid {} value {:?}", spec.name, value))
                })?;
            }
            (FieldKind::List, SlotMut::List(slot)) => *slot = split_list(&value),
            (kind, _) => {
                return Err(Error::unsupported(format!(
                    "field {} can't hold a {:?} value",
                    spec.name, kind
                )))
            }
        }
        Ok(())
    }

    // The value to write for `spec`, or None if it's skipped
    fn render(&self, spec: &FieldSpec) -> Option<String> {
        if spec.omit_empty && self.is_empty_slot(spec.slot) {
            return None;
        }
        Some(self.render_value(spec))
    }

    fn render_value(&self, spec: &FieldSpec) -> String {
        match self.slot(spec.slot) {
            SlotRef::Text(s) => s.to_string(),
            SlotRef::Integer(n) => n.to_string(),
            SlotRef::List(l) => l.join(", "),
        }
    }

    fn is_empty_slot(&self, slot: Slot) -> bool {
        match self.slot(slot) {
            SlotRef::Text(s) => s.is_empty(),
            SlotRef::Integer(n) => n == 0,
            SlotRef::List(l) => l.is_empty(),
        }
    }

    fn slot(&self, slot: Slot) -> SlotRef<'_> {
        match slot {
            Slot::Package => SlotRef::Text(&self.package),
            Slot::Version => SlotRef::Text(&self.version),
            Slot::Architecture => SlotRef::Text(&self.architecture),
            Slot::InstalledSize => SlotRef::Integer(self.installed_size),
            Slot::Source => SlotRef::Text(&self.source),
            Slot::Section => SlotRef::Text(&self.section),
            Slot::Priority => SlotRef::Text(&self.priority),
            Slot::Essential => SlotRef::Text(&self.essential),
            Slot::Maintainer => SlotRef::Text(&self.maintainer),
            Slot::Vendor => SlotRef::Text(&self.vendor),
            Slot::Depends => SlotRef::List(&self.depends),
            Slot::PreDepends => SlotRef::List(&self.pre_depends),
            Slot::Recommends => SlotRef::List(&self.recommends),
            Slot::Suggests => SlotRef::List(&self.suggests),
            Slot::Enhances => SlotRef::List(&self.enhances),
            Slot::Breaks => SlotRef::List(&self.breaks),
            Slot::Replaces => SlotRef::List(&self.replaces),
            Slot::Provides => SlotRef::List(&self.provides),
            Slot::Conflicts => SlotRef::List(&self.conflicts),
            Slot::BuiltUsing => SlotRef::List(&self.built_using),
            Slot::Homepage => SlotRef::Text(&self.homepage),
            Slot::Description => SlotRef::Text(&self.description),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> SlotMut<'_> {
        match slot {
            Slot::Package => SlotMut::Text(&mut self.package),
            Slot::Version => SlotMut::Text(&mut self.version),
            Slot::Architecture => SlotMut::Text(&mut self.architecture),
            Slot::InstalledSize => SlotMut::Integer(&mut self.installed_size),
            Slot::Source => SlotMut::Text(&mut self.source),
            Slot::Section => SlotMut::Text(&mut self.section),
            Slot::Priority => SlotMut::Text(&mut self.priority),
            Slot::Essential => SlotMut::Text(&mut self.essential),
            Slot::Maintainer => SlotMut::Text(&mut self.maintainer),
            Slot::Vendor => SlotMut::Text(&mut self.vendor),
            Slot::Depends => SlotMut::List(&mut self.depends),
            Slot::PreDepends => SlotMut::List(&mut self.pre_depends),
            Slot::Recommends => SlotMut::List(&mut self.recommends),
            Slot::Suggests => SlotMut::List(&mut self.suggests),
            Slot::Enhances => SlotMut::List(&mut self.enhances),
            Slot::Breaks => SlotMut::List(&mut self.breaks),
            Slot::Replaces => SlotMut::List(&mut self.replaces),
            Slot::Provides => SlotMut::List(&mut self.provides),
            Slot::Conflicts => SlotMut::List(&mut self.conflicts),
            Slot::BuiltUsing => SlotMut::List(&mut self.built_using),
            Slot::Homepage => SlotMut::Text(&mut self.homepage),
            Slot::Description => SlotMut::Text(&mut self.description),
        }
    }
}

// Converts comma-separated lists to Vec<String>
fn split_list(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input
        .split(',')
        .map(|item| item.trim().to_string())
        .collect()
}
