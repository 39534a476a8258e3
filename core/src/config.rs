//! The bootconf configuration store
//!
//! Each OS image carries a small line-oriented text file of
//! `key: value` pairs describing how and whether to boot it. The store
//! is schema-typed: known keys coerce to their declared type at parse
//! time, unknown keys are preserved verbatim as text so that a
//! parse-then-write round trip never loses a vendor extension.
//!
//! Entries remember insertion order and serialise in it, one
//! `name: value\n` per line, so repeated rewrites of the same store are
//! byte-stable. Deleting an entry tombstones it (the name is cleared);
//! tombstoned entries are skipped on write-out and cannot be revived.
//!
//! Writes are prepared entirely in memory; the caller hands the finished
//! buffer to the filesystem in a single write so a power cut cannot leave
//! a half-serialised config behind.

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    error::{Error, Result, Status},
    stamp,
};

/// The declared type of a configuration cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Uint,
    Stamp,
    Text,
    Path,
}

impl Kind {
    #[inline]
    fn is_numeric(self) -> bool {
        matches!(self, Kind::Bool | Kind::Uint | Kind::Stamp)
    }
}

/// The keys the loader understands. Anything else found in a config file
/// is carried as [`Kind::Text`].
const SCHEMA: &[(&str, Kind)] = &[
    ("title", Kind::Text),
    ("loader", Kind::Path),
    ("image-invalid", Kind::Bool),
    ("boot-other", Kind::Bool),
    ("boot-requested-at", Kind::Stamp),
    ("boot-time", Kind::Stamp),
    ("boot-attempts", Kind::Uint),
    ("update", Kind::Bool),
    ("update-window-start", Kind::Stamp),
    ("update-window-end", Kind::Stamp),
];

fn schema_kind(name: &str) -> Option<Kind> {
    SCHEMA.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    /// Empty name marks a tombstone.
    name: String,
    kind: Kind,
    number: u64,
    text: String,
}

impl Entry {
    fn is_tombstone(&self) -> bool {
        self.name.is_empty()
    }
}

/// An ordered collection of typed configuration cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    entries: Vec<Entry>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config file. Every line must be empty or `key: value`
    /// with a non-empty ASCII key; values of schema keys must coerce to
    /// the declared type. Anything else fails the whole parse.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text =
            core::str::from_utf8(data).map_err(|_| Error::new(Status::COMPROMISED_DATA))?;
        let mut store = Store::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::new(Status::COMPROMISED_DATA))?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || !key.is_ascii() {
                return Err(Error::new(Status::COMPROMISED_DATA));
            }
            store.set_parsed(key, value)?;
        }
        Ok(store)
    }

    fn set_parsed(&mut self, key: &str, value: &str) -> Result<()> {
        let kind = schema_kind(key).unwrap_or(Kind::Text);
        if kind.is_numeric() {
            let n: u64 = value
                .parse()
                .map_err(|_| Error::new(Status::COMPROMISED_DATA))?;
            let n = match kind {
                Kind::Bool => {
                    if n > 1 {
                        return Err(Error::new(Status::COMPROMISED_DATA));
                    }
                    n
                }
                _ => n,
            };
            self.put(key, kind, n, String::new());
        } else {
            self.put(key, kind, 0, value.to_string());
        }
        Ok(())
    }

    /// Insert or overwrite, keeping the position of first insertion.
    fn put(&mut self, name: &str, kind: Kind, number: u64, text: String) {
        if let Some(e) = self.entry_mut(name) {
            e.number = number;
            set_text(e, &text);
            return;
        }
        self.entries.push(Entry {
            name: name.to_string(),
            kind,
            number,
            text,
        });
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| !e.is_tombstone() && e.name == name)
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| !e.is_tombstone() && e.name == name)
    }

    /// Numeric value of `name`; 0 when missing or not numeric.
    pub fn get_uint(&self, name: &str) -> u64 {
        match self.entry(name) {
            Some(e) if e.kind.is_numeric() => e.number,
            _ => 0,
        }
    }

    /// Text value of `name`; empty when missing or not textual.
    pub fn get_str(&self, name: &str) -> &str {
        match self.entry(name) {
            Some(e) if !e.kind.is_numeric() => &e.text,
            _ => "",
        }
    }

    /// Set a numeric cell. Booleans coerce to 0/1. Returns false when
    /// the name is not a numeric cell of the schema.
    pub fn set_uint(&mut self, name: &str, value: u64) -> bool {
        let kind = match self.cell_kind(name) {
            Some(k) if k.is_numeric() => k,
            _ => return false,
        };
        let value = match kind {
            Kind::Bool => u64::from(value != 0),
            _ => value,
        };
        self.put(name, kind, value, String::new());
        true
    }

    /// Set a stamp cell. Values strictly between 0 and the epoch stamp
    /// are rejected.
    pub fn set_stamp(&mut self, name: &str, value: u64) -> bool {
        if !stamp::acceptable(value) {
            return false;
        }
        match self.cell_kind(name) {
            Some(Kind::Stamp) => {}
            _ => return false,
        }
        self.put(name, Kind::Stamp, value, String::new());
        true
    }

    /// Set a textual cell. The backing buffer only grows; a shorter
    /// value reuses the existing allocation.
    pub fn set_string(&mut self, name: &str, value: &str) -> bool {
        let kind = match self.cell_kind(name) {
            Some(k) if !k.is_numeric() => k,
            _ => return false,
        };
        self.put(name, kind, 0, value.to_string());
        true
    }

    /// Tombstone `name`: value, length and name are all cleared, and the
    /// write-out iterator will skip it. A tombstone cannot be revived.
    pub fn del(&mut self, name: &str) {
        if let Some(e) = self.entry_mut(name) {
            e.name.clear();
            e.text.clear();
            e.number = 0;
        }
    }

    fn cell_kind(&self, name: &str) -> Option<Kind> {
        schema_kind(name).or_else(|| self.entry(name).map(|e| e.kind))
    }

    /// Serialise to the on-disk form: insertion order, tombstones
    /// skipped, `name: value\n` per entry. The returned buffer is handed
    /// to the filesystem whole.
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 24);
        for e in &self.entries {
            if e.is_tombstone() {
                continue;
            }
            let line = if e.kind.is_numeric() {
                format!("{}: {}\n", e.name, e.number)
            } else {
                format!("{}: {}\n", e.name, e.text)
            };
            out.extend_from_slice(line.as_bytes());
        }
        out
    }

    /// Names of the live entries, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.is_tombstone())
            .map(|e| e.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Entry::is_tombstone)
    }
}

/// Overwrite in place, growing only when the new value is longer than the
/// buffer ever was.
fn set_text(e: &mut Entry, value: &str) {
    e.text.clear();
    e.text.push_str(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_unknown_keys() {
        let c = Store::parse(
            b"title: SteamOS\nboot-attempts: 2\nimage-invalid: 0\nvendor-extra: keep me\n",
        )
        .unwrap();
        assert_eq!(c.get_str("title"), "SteamOS");
        assert_eq!(c.get_uint("boot-attempts"), 2);
        assert_eq!(c.get_uint("image-invalid"), 0);
        assert_eq!(c.get_str("vendor-extra"), "keep me");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(Store::parse(b"no separator here\n").is_err());
        assert!(Store::parse(b": empty key\n").is_err());
        assert!(Store::parse(b"boot-attempts: twelve\n").is_err());
        assert!(Store::parse(b"image-invalid: 2\n").is_err());
        assert!(Store::parse(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn serialisation_is_byte_exact() {
        let mut c = Store::new();
        c.set_string("title", "foo");
        c.set_uint("boot-attempts", 2);
        c.set_uint("image-invalid", 0);
        assert_eq!(
            c.write(),
            b"title: foo\nboot-attempts: 2\nimage-invalid: 0\n"
        );
    }

    #[test]
    fn write_then_parse_round_trips() {
        let mut c = Store::new();
        c.set_string("title", "Image A");
        c.set_uint("boot-other", 1);
        c.set_stamp("boot-requested-at", 20_240_102_030_405);
        c.set_uint("boot-attempts", 3);
        c.set_string("loader", "\\EFI\\steamos\\grubx64.efi");
        c.del("boot-attempts");
        let reread = Store::parse(&c.write()).unwrap();
        assert_eq!(reread.get_str("title"), "Image A");
        assert_eq!(reread.get_uint("boot-other"), 1);
        assert_eq!(reread.get_uint("boot-requested-at"), 20_240_102_030_405);
        assert_eq!(reread.get_str("loader"), "\\EFI\\steamos\\grubx64.efi");
        // the tombstone is gone from the byte stream entirely
        assert_eq!(reread.get_uint("boot-attempts"), 0);
        let bytes = String::from_utf8(c.write()).unwrap();
        assert!(!bytes.contains("boot-attempts"));
    }

    #[test]
    fn insertion_order_is_stable_across_updates() {
        let mut c = Store::new();
        c.set_string("title", "one");
        c.set_uint("boot-attempts", 1);
        c.set_string("title", "two");
        assert_eq!(c.write(), b"title: two\nboot-attempts: 1\n");
    }

    #[test]
    fn stamp_rejection_range() {
        let mut c = Store::new();
        assert!(c.set_stamp("boot-time", 0));
        assert!(c.set_stamp("boot-time", stamp::EPOCH));
        assert!(c.set_stamp("boot-time", 99_999_999_999_999));
        assert!(!c.set_stamp("boot-time", 1));
        assert!(!c.set_stamp("boot-time", stamp::EPOCH - 1));
        // rejected writes leave the old value alone
        assert_eq!(c.get_uint("boot-time"), 99_999_999_999_999);
    }

    #[test]
    fn mutations_are_schema_bound() {
        let mut c = Store::new();
        assert!(!c.set_uint("title", 1));
        assert!(!c.set_string("boot-attempts", "nope"));
        assert!(!c.set_uint("no-such-key", 1));
        assert!(!c.set_stamp("boot-attempts", stamp::EPOCH));
        // bool coerces
        assert!(c.set_uint("boot-other", 5));
        assert_eq!(c.get_uint("boot-other"), 1);
    }

    #[test]
    fn typed_lookups_return_zero_values_across_kinds() {
        let c = Store::parse(b"title: x\nboot-attempts: 7\n").unwrap();
        assert_eq!(c.get_uint("title"), 0);
        assert_eq!(c.get_str("boot-attempts"), "");
        assert_eq!(c.get_uint("missing"), 0);
        assert_eq!(c.get_str("missing"), "");
    }

    #[test]
    fn tombstones_cannot_be_revived_by_lookup() {
        let mut c = Store::parse(b"title: x\n").unwrap();
        c.del("title");
        assert_eq!(c.get_str("title"), "");
        assert!(c.is_empty());
        // a fresh set after deletion creates a new live cell
        c.set_string("title", "y");
        assert_eq!(c.get_str("title"), "y");
    }
}
