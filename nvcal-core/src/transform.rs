// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The item transformer: walks schema + master data, applying the
//! marshaller to every item, partitioning EFS items into the
//! provisioning/backup/plain stores, and compressing variable-size items
//! declared `compressed`.

use crate::marshal::{self, MarshalOutcome};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use nvcal_types::catalog::{CatalogEntry, NUMBERED_ITEM_PAYLOAD_SIZE};
use nvcal_types::value::Diagnostic;
use nvcal_types::{Catalog, Document, EfsStore, EfsValue, NumberedValue};
use std::io::Write;

/// Transform a loaded master file (numbered + EFS value maps) into the
/// unified [`Document`], applying the marshaller and the store-separation
/// rule.
pub fn transform_master(
    catalog: &Catalog,
    nv_values: impl IntoIterator<Item = NumberedValue>,
    efs_values: impl IntoIterator<Item = EfsValue>,
) -> Document {
    let mut document = Document::new();

    for mut value in nv_values {
        let members: &[_] = match catalog.numbered(value.id) {
            Some(item) => &item.members,
            None => &[],
        };
        let encoding = value.encoding.unwrap_or(nvcal_types::Encoding::default_encoding());
        let MarshalOutcome { params, mut bytes, errors } = marshal::marshal(members, &value.raw, encoding, false);

        if bytes.len() > NUMBERED_ITEM_PAYLOAD_SIZE {
            value.errors.push(Diagnostic::new(format!(
                "item {} produced {} bytes, truncated to {}",
                value.id,
                bytes.len(),
                NUMBERED_ITEM_PAYLOAD_SIZE
            )));
            bytes.truncate(NUMBERED_ITEM_PAYLOAD_SIZE);
        } else {
            bytes.resize(NUMBERED_ITEM_PAYLOAD_SIZE, 0);
        }

        value.params = params;
        value.bytes = bytes;
        value.errors.extend(errors);

        document.nv_item_array.insert(value.id, value);
    }

    for mut value in efs_values {
        let (members, variable_size, compressed): (&[_], bool, bool) = match catalog.efs(&value.path) {
            Some(item) => (&item.members, item.is_variable_size(), item.is_compressed()),
            None => (&[], false, false),
        };
        let encoding = value.encoding.unwrap_or(nvcal_types::Encoding::default_encoding());
        let MarshalOutcome { params, mut bytes, errors } = marshal::marshal(members, &value.raw, encoding, variable_size);

        if compressed {
            bytes = match deflate(&bytes) {
                Ok(compressed_bytes) => compressed_bytes,
                Err(e) => {
                    value.errors.push(Diagnostic::new(format!("compression failed: {e}")));
                    bytes
                }
            };
        }

        value.params = params;
        value.bytes = bytes;
        value.errors.extend(errors);

        route_efs_value(&mut document, value);
    }

    document
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Apply the §3 separation rule: provisioning-store items go to
/// `Provisioning_Item_Files`, items sourced from id >= 20000 go to
/// `EFS_Backup`, everything else goes to `NV_Items`.
fn route_efs_value(document: &mut Document, value: EfsValue) {
    let store = if value.provisioning_store {
        &mut document.provisioning_item_files
    } else if value.source_numbered_id.is_some() {
        &mut document.efs_backup
    } else {
        &mut document.nv_items
    };

    insert_ordinal(store, value);
}

/// Ordinal keys are `"%08X"`-formatted by default (the newer transformer's
/// behavior). See [`crate::qcn::OrdinalKeyStyle`] for the writer-side
/// compatibility flag that lets a `"%08d"`-written file round-trip.
fn insert_ordinal(store: &mut EfsStore, value: EfsValue) {
    let next = store.len() as u32;
    let key = format!("{:08X}", next);
    store.insert_next(value, key);
}

/// Resolve the schema view for a catalog entry, used by the printer to
/// fall back to a raw hex/decimal dump when no schema is present.
pub fn catalog_entry_for<'a>(catalog: &'a Catalog, key: &nvcal_types::ItemKey) -> Option<CatalogEntry<'a>> {
    catalog.lookup(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvcal_types::value::ValueShape;
    use nvcal_types::{EfsItem, EfsItemFlags, Member, NumberedItem, Permission};
    use std::collections::BTreeMap;

    fn simple_catalog() -> Catalog {
        let mut nv_items = BTreeMap::new();
        nv_items.insert(
            946,
            NumberedItem {
                id: 946,
                name: "band_cal".to_string(),
                permission: Permission::ReadWrite,
                members: vec![Member::new("band1", "int32", 1), Member::new("band2", "int16", 1)],
            },
        );

        let mut efs_items = BTreeMap::new();
        efs_items.insert(
            "/nv/item_files/x".to_string(),
            EfsItem {
                path: "/nv/item_files/x".to_string(),
                permission: Permission::ReadWrite,
                flags: EfsItemFlags::empty(),
                members: vec![Member::new("payload", "uint8", 3)],
            },
        );

        Catalog {
            nv_items,
            efs_items,
            data_types: BTreeMap::new(),
        }
    }

    #[test]
    fn numbered_item_is_padded_to_128_bytes() {
        let catalog = simple_catalog();
        let value = NumberedValue {
            id: 946,
            name: "band_cal".to_string(),
            index: 1,
            mapping: None,
            encoding: Some(nvcal_types::Encoding::Dec),
            raw: ValueShape::Scalar("132183, 10211".to_string()),
            params: Vec::new(),
            bytes: Vec::new(),
            errors: Vec::new(),
        };

        let document = transform_master(&catalog, vec![value], vec![]);
        let packed = document.nv_item_array.get(&946).unwrap();
        assert_eq!(packed.bytes.len(), NUMBERED_ITEM_PAYLOAD_SIZE);
        assert_eq!(&packed.bytes[..6], &[0x57, 0x04, 0x02, 0x00, 0xe3, 0x27]);
        assert!(packed.bytes[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn efs_items_route_by_source_and_flag() {
        let catalog = simple_catalog();

        let plain = EfsValue {
            path: "/nv/item_files/x".to_string(),
            index: 1,
            mapping: None,
            encoding: Some(nvcal_types::Encoding::Dec),
            provisioning_store: false,
            source_numbered_id: None,
            raw: ValueShape::Scalar("1, 2, 3".to_string()),
            params: Vec::new(),
            bytes: Vec::new(),
            errors: Vec::new(),
        };

        let mut backup = plain.clone();
        backup.path = "/nv/item_files/rfnv/00020000".to_string();
        backup.source_numbered_id = Some(20000);

        let mut provisioning = plain.clone();
        provisioning.provisioning_store = true;

        let document = transform_master(&catalog, vec![], vec![plain, backup, provisioning]);

        assert_eq!(document.nv_items.len(), 1);
        assert_eq!(document.efs_backup.len(), 1);
        assert_eq!(document.provisioning_item_files.len(), 1);
    }
}
