// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte layouts and path conventions for the QCN compound-file tree.

/// The eight-byte prefix prepended to an `EFS_Backup` path before it is
/// stored under `EFS_Dir`. Magic and undocumented in the system this was
/// distilled from; named here as an explicit constant rather than
/// re-derived at each call site. The first byte of the original path is
/// dropped (the leading `/`) when the prefix is prepended.
pub const EFS_BACKUP_PATH_PREFIX: [u8; 8] = [0x01, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00];

/// Total size in bytes of one `NV_ITEM_ARRAY` packet: a 8-byte header
/// (stream-size, index, item-id, padding, all `uint16`) plus the 128-byte
/// payload.
pub const NV_ITEM_PACKET_SIZE: usize = 136;

pub const NV_ITEM_PACKET_HEADER_SIZE: usize = 8;

/// Root storage path under which every QCN's device-default tree lives.
pub const DEFAULT_DEVICE_PATH: &str = "/00000000/default";

/// Which ordinal-key format the writer uses for the Provisioning store.
///
/// The system this was distilled from shows an inconsistency between a
/// `%08d`-formatted writer and a `%08X`-formatted transformer; this is
/// preserved as an explicit compatibility knob rather than silently picking
/// one. [`Self::Hex`] is the default (the newer transformer's behavior);
/// [`Self::Decimal`] exists so files written by the older path can still be
/// read back and re-written identically.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrdinalKeyStyle {
    Decimal,
    Hex,
}

impl OrdinalKeyStyle {
    pub fn format(self, ordinal: u32) -> String {
        match self {
            Self::Decimal => format!("{ordinal:08}"),
            Self::Hex => format!("{ordinal:08X}"),
        }
    }
}

impl Default for OrdinalKeyStyle {
    fn default() -> Self {
        Self::Hex
    }
}

pub fn efs_store_paths(prefix: &str) -> [(&'static str, String); 3] {
    [
        ("Provisioning_Item_Files", format!("{prefix}/Provisioning_Item_Files")),
        ("NV_Items", format!("{prefix}/NV_Items")),
        ("EFS_Backup", format!("{prefix}/EFS_Backup")),
    ]
}
