// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Two-file textual diffing: prints both inputs through the printer into
//! temporary files and invokes an external diff tool, propagating its exit
//! code. XML inputs are first compiled to a temporary QCN and read back, so
//! the diff reflects the round-trip rather than the raw text.

use crate::error::Result;
use crate::qcn::{read_qcn, write_qcn, WriteOptions};
use crate::{load_document, master, printer, transform};
use nvcal_types::Catalog;
use std::io::Write as _;
use std::path::Path;
use std::process::Command;

/// Render a single input to its normalised [`Document`], compiling XML
/// through a temporary QCN so the diff observes the same round-trip a
/// `--compile` run would produce.
fn normalise(path: &Path, catalog: &Catalog) -> Result<nvcal_types::Document> {
    if path.extension().and_then(|e| e.to_str()) == Some("xml") {
        let loaded = master::load_master_file(path)?;
        let mut document = transform::transform_master(
            catalog,
            loaded.nv_values.into_values(),
            loaded.efs_values.into_values(),
        );
        document.errors.extend(loaded.errors);

        let temp = tempfile::Builder::new().suffix(".qcn").tempfile()?;
        let temp_path = temp.path().to_path_buf();
        write_qcn(&document, &temp_path, WriteOptions::default())?;
        return read_qcn(&temp_path);
    }

    load_document(path, catalog)
}

/// Diff two inputs after normalisation, returning the underlying diff
/// tool's exit code.
pub fn diff_files(path_a: &Path, path_b: &Path, catalog: &Catalog, diff_tool: &str, verbosity: u8) -> Result<i32> {
    let doc_a = normalise(path_a, catalog)?;
    let doc_b = normalise(path_b, catalog)?;

    let rendered_a = printer::print_document(&doc_a, catalog, verbosity);
    let rendered_b = printer::print_document(&doc_b, catalog, verbosity);

    let mut file_a = tempfile::Builder::new().suffix(".txt").tempfile()?;
    let mut file_b = tempfile::Builder::new().suffix(".txt").tempfile()?;
    file_a.write_all(rendered_a.as_bytes())?;
    file_b.write_all(rendered_b.as_bytes())?;
    file_a.flush()?;
    file_b.flush()?;

    let status = Command::new(diff_tool)
        .arg(file_a.path())
        .arg(file_b.path())
        .status()?;

    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn diffing_same_qcn_twice_is_clean() {
        let catalog = Catalog::new();
        let document = nvcal_types::Document::new();

        let mut temp = tempfile::Builder::new().suffix(".qcn").tempfile().unwrap();
        let path = temp.path().to_path_buf();
        write_qcn(&document, &path, WriteOptions::default()).unwrap();
        temp.flush().unwrap();

        let code = diff_files(&path, &path, &catalog, "diff", 0).unwrap();
        assert_eq!(code, 0);
    }
}
