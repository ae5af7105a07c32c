// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered, human-readable rendering of a [`Document`]. Sorts numbered items
//! by numeric id and EFS items by lower-cased path; falls back to a hex/
//! decimal byte dump when no schema member list is available.

use nvcal_types::pod::{uint8_or_ascii, Uint8Rendering};
use nvcal_types::value::{EfsValue, NumberedValue, ParamValue};
use nvcal_types::{Catalog, CatalogEntry, Document};
use std::fmt::Write as _;

/// `-v` raises this to separate the three EFS stores rather than merging
/// them into one flat list.
pub fn print_document(document: &Document, catalog: &Catalog, verbosity: u8) -> String {
    let mut out = String::new();

    writeln!(out, "file version: {}.{}.{}",
        document.file_version.major, document.file_version.minor, document.file_version.revision)
        .unwrap();
    writeln!(out, "mobile phone number: {}", document.mobile_property_info.mobile_model_no).unwrap();
    writeln!(out, "mobile sw version: {}", document.mobile_property_info.sw_version).unwrap();
    writeln!(out, "qpst version: {}", document.mobile_property_info.qpst_version).unwrap();
    out.push('\n');

    let mut numbered: Vec<&NumberedValue> = document.nv_item_array.values().collect();
    numbered.sort_by_key(|v| v.id);
    for value in numbered {
        print_numbered(&mut out, value, catalog);
    }

    if verbosity >= 1 {
        print_efs_store(&mut out, "NV_Items", &document.nv_items, catalog);
        print_efs_store(&mut out, "Provisioning_Item_Files", &document.provisioning_item_files, catalog);
        print_efs_store(&mut out, "EFS_Backup", &document.efs_backup, catalog);
    } else {
        let mut merged: Vec<&EfsValue> = document
            .nv_items
            .iter()
            .chain(document.provisioning_item_files.iter())
            .chain(document.efs_backup.iter())
            .map(|(_, v)| v)
            .collect();
        merged.sort_by_key(|v| v.path.to_lowercase());
        for value in merged {
            print_efs(&mut out, value, catalog);
        }
    }

    if !document.unprocessed.is_empty() {
        writeln!(out, "\n:unprocessed").unwrap();
        for node in &document.unprocessed {
            writeln!(out, "  {node}").unwrap();
        }
    }

    if !document.errors.is_empty() {
        writeln!(out, "\nerrors:").unwrap();
        for e in &document.errors {
            writeln!(out, "  {e}").unwrap();
        }
    }

    out
}

fn print_efs_store(out: &mut String, label: &str, store: &nvcal_types::EfsStore, catalog: &Catalog) {
    if store.is_empty() {
        return;
    }
    writeln!(out, "\n{label}:").unwrap();
    let mut values: Vec<&EfsValue> = store.iter().map(|(_, v)| v).collect();
    values.sort_by_key(|v| v.path.to_lowercase());
    for value in values {
        print_efs(out, value, catalog);
    }
}

fn print_numbered(out: &mut String, value: &NumberedValue, catalog: &Catalog) {
    writeln!(out, "item {} ({}):", value.id, value.name).unwrap();
    let entry = catalog.numbered(value.id).map(CatalogEntry::Numbered);
    print_params_or_raw(out, &value.params, entry, &value.bytes);
    print_errors(out, &value.errors);
}

fn print_efs(out: &mut String, value: &EfsValue, catalog: &Catalog) {
    writeln!(out, "path {}:", value.path).unwrap();
    let entry = catalog.efs(&value.path).map(CatalogEntry::Efs);
    print_params_or_raw(out, &value.params, entry, &value.bytes);
    print_errors(out, &value.errors);
}

fn print_params_or_raw(out: &mut String, params: &[ParamValue], entry: Option<CatalogEntry<'_>>, bytes: &[u8]) {
    if entry.is_none() || params.is_empty() {
        match uint8_or_ascii(bytes) {
            Uint8Rendering::Ascii(s) => writeln!(out, "  (no schema) = \"{s}\"").unwrap(),
            Uint8Rendering::Bytes(b) => {
                let hex: Vec<String> = b.iter().map(|byte| format!("{byte:02x}")).collect();
                writeln!(out, "  (no schema) = {}", hex.join(" ")).unwrap();
            }
        }
        return;
    }

    for param in params {
        let val = param.val.join(", ");
        writeln!(out, "  {} ({}): {}", param.name, param.type_name, val).unwrap();
    }
}

fn print_errors(out: &mut String, errors: &[nvcal_types::Diagnostic]) {
    for e in errors {
        writeln!(out, "  error: {e}").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvcal_types::value::ValueShape;
    use nvcal_types::MobilePropertyInfo;

    #[test]
    fn mobile_property_info_line_matches_empty_sw_version() {
        let mut document = Document::new();
        document.mobile_property_info = MobilePropertyInfo {
            efs: 0,
            mobile_model_no: 0,
            major_rev: 0,
            minor_rev: 0,
            sw_version: String::new(),
            qpst_version: String::new(),
        };

        let catalog = Catalog::new();
        let rendered = print_document(&document, &catalog, 0);
        assert!(rendered.contains("mobile phone number: 0"));
        assert!(rendered.contains("mobile sw version: "));
    }

    #[test]
    fn numbered_items_are_sorted_by_id() {
        let mut document = Document::new();
        for id in [5, 1, 3] {
            document.nv_item_array.insert(
                id,
                NumberedValue {
                    id,
                    name: String::new(),
                    index: 1,
                    mapping: None,
                    encoding: None,
                    raw: ValueShape::Scalar(String::new()),
                    params: Vec::new(),
                    bytes: Vec::new(),
                    errors: Vec::new(),
                },
            );
        }
        let catalog = Catalog::new();
        let rendered = print_document(&document, &catalog, 0);
        let pos1 = rendered.find("item 1 ").unwrap();
        let pos3 = rendered.find("item 3 ").unwrap();
        let pos5 = rendered.find("item 5 ").unwrap();
        assert!(pos1 < pos3 && pos3 < pos5);
    }
}
