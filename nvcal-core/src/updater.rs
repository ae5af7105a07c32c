// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell update-script emission: one `nvimgr` invocation per item, with long
//! byte sequences split across backslash line continuations.

use nvcal_types::value::{EfsValue, NumberedValue};
use nvcal_types::Document;
use std::fmt::Write as _;

/// Byte values per continuation line in the emitted script.
const BYTES_PER_LINE: usize = 16;

pub fn render_update_script(document: &Document) -> String {
    let mut out = String::new();
    writeln!(out, "#!/bin/sh").unwrap();

    let mut numbered: Vec<&NumberedValue> = document.nv_item_array.values().collect();
    numbered.sort_by_key(|v| v.id);
    for value in numbered {
        emit_item(&mut out, &value.id.to_string(), &value.bytes);
    }

    let mut efs: Vec<&EfsValue> = document
        .nv_items
        .iter()
        .chain(document.provisioning_item_files.iter())
        .chain(document.efs_backup.iter())
        .map(|(_, v)| v)
        .collect();
    efs.sort_by_key(|v| v.path.to_lowercase());
    for value in efs {
        emit_item(&mut out, &value.path, &value.bytes);
    }

    out
}

fn emit_item(out: &mut String, id_or_path: &str, bytes: &[u8]) {
    write!(out, "nvimgr --item {id_or_path} {} \\\n", bytes.len()).unwrap();

    let lines: Vec<&[u8]> = bytes.chunks(BYTES_PER_LINE).collect();
    for (i, line) in lines.iter().enumerate() {
        let decimals: Vec<String> = line.iter().map(|b| b.to_string()).collect();
        let is_last = i == lines.len() - 1;
        if is_last {
            writeln!(out, "    {}", decimals.join(" ")).unwrap();
        } else {
            write!(out, "    {} \\\n", decimals.join(" ")).unwrap();
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvcal_types::value::ValueShape;

    #[test]
    fn numbered_item_emits_nvimgr_call_with_continuations() {
        let mut document = Document::new();
        document.nv_item_array.insert(
            946,
            NumberedValue {
                id: 946,
                name: String::new(),
                index: 1,
                mapping: None,
                encoding: None,
                raw: ValueShape::Scalar(String::new()),
                params: Vec::new(),
                bytes: vec![1; 20],
                errors: Vec::new(),
            },
        );

        let script = render_update_script(&document);
        assert!(script.contains("nvimgr --item 946 20 \\"));
        assert!(script.lines().filter(|l| l.trim_end_matches('\\').trim().len() > 0 && l.contains('1')).count() >= 2);
    }

    #[test]
    fn empty_document_still_emits_shebang() {
        let document = Document::new();
        let script = render_update_script(&document);
        assert_eq!(script, "#!/bin/sh\n");
    }
}
