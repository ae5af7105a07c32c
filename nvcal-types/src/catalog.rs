// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The catalog built from the schema: numbered items, EFS items, and named
//! data types, plus the tagged key used to look either kind up.

use crate::member::Member;
use std::collections::BTreeMap;

/// Numeric ids at or above this threshold name EFS items rather than
/// numbered items; they are synthesised into a path under
/// `/nv/item_files/rfnv/`.
pub const EFS_SYNTHESIS_THRESHOLD: u32 = 20000;

/// Every emitted numbered-item payload is exactly this many bytes,
/// zero-padded on the right.
pub const NUMBERED_ITEM_PAYLOAD_SIZE: usize = 128;

/// A tagged key distinguishing numbered items (by id) from EFS items
/// (by path). Replaces a dynamic map keyed by either an integer or a
/// string with one associative container per kind.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ItemKey {
    NumericId(u32),
    Path(String),
}

/// Synthesise the EFS path an id >= [`EFS_SYNTHESIS_THRESHOLD`] is
/// redirected to.
pub fn synthesize_efs_path(id: u32) -> String {
    format!("/nv/item_files/rfnv/000{id}")
}

/// Read/write permission recorded on a catalog entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "ro" | "read-only" | "readonly" => Self::ReadOnly,
            _ => Self::ReadWrite,
        }
    }
}

/// A numeric-id catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub struct NumberedItem {
    pub id: u32,
    pub name: String,
    pub permission: Permission,
    pub members: Vec<Member>,
}

impl NumberedItem {
    /// Aggregate byte size per the schema interpreter's formula.
    pub fn computed_size(&self) -> usize {
        self.members.iter().map(Member::byte_size).sum()
    }
}

bitflags::bitflags! {
    /// Flags carried by an `NvEfsItem` schema entry.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct EfsItemFlags: u8 {
        const COMPRESSED = 0b01;
        const VARIABLE_SIZE = 0b10;
    }
}

/// A path-keyed catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub struct EfsItem {
    pub path: String,
    pub permission: Permission,
    pub flags: EfsItemFlags,
    pub members: Vec<Member>,
}

impl EfsItem {
    pub fn computed_size(&self) -> usize {
        self.members.iter().map(Member::byte_size).sum()
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(EfsItemFlags::COMPRESSED)
    }

    pub fn is_variable_size(&self) -> bool {
        self.flags.contains(EfsItemFlags::VARIABLE_SIZE)
    }
}

/// The immutable catalog built once per run by the schema interpreter.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub nv_items: BTreeMap<u32, NumberedItem>,
    pub efs_items: BTreeMap<String, EfsItem>,
    pub data_types: BTreeMap<String, crate::member::DataType>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numbered(&self, id: u32) -> Option<&NumberedItem> {
        self.nv_items.get(&id)
    }

    pub fn efs(&self, path: &str) -> Option<&EfsItem> {
        self.efs_items.get(path)
    }

    /// Look up by the tagged key variant used throughout the value tree.
    pub fn lookup(&self, key: &ItemKey) -> Option<CatalogEntry<'_>> {
        match key {
            ItemKey::NumericId(id) => self.numbered(*id).map(CatalogEntry::Numbered),
            ItemKey::Path(path) => self.efs(path).map(CatalogEntry::Efs),
        }
    }
}

#[derive(Clone, Debug)]
pub enum CatalogEntry<'a> {
    Numbered(&'a NumberedItem),
    Efs(&'a EfsItem),
}

impl<'a> CatalogEntry<'a> {
    pub fn members(&self) -> &'a [Member] {
        match self {
            Self::Numbered(item) => &item.members,
            Self::Efs(item) => &item.members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_efs_path_matches_spec() {
        assert_eq!(
            synthesize_efs_path(20000),
            "/nv/item_files/rfnv/00020000"
        );
    }

    #[test]
    fn numbered_item_computed_size() {
        let item = NumberedItem {
            id: 946,
            name: "band_cal".to_string(),
            permission: Permission::ReadWrite,
            members: vec![Member::new("band1", "int32", 1), Member::new("band2", "int16", 1)],
        };
        assert_eq!(item.computed_size(), 6);
    }
}
