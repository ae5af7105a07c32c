// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The schema-driven codec at the heart of the NV calibration pipeline:
//! the XML schema interpreter, master-file loader, value marshaller, item
//! transformer, QCN and MBN readers/writers, and the printer/updater/differ
//! sinks that consume the unified [`Document`] model.

pub mod differ;
pub mod error;
pub mod marshal;
pub mod master;
pub mod mbn;
pub mod printer;
pub mod qcn;
pub mod schema;
pub mod transform;
pub mod updater;

pub use error::{CoreError, Result};

use nvcal_types::{Catalog, Document};
use std::path::Path;

/// Load a single input into the unified [`Document`] model, dispatching on
/// its file extension. `.xml` is loaded directly (without a QCN round
/// trip) — see [`differ::diff_files`] for the round-tripping variant used
/// by the diff path.
pub fn load_document(path: &Path, catalog: &Catalog) -> Result<Document> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xml") => {
            let loaded = master::load_master_file(path)?;
            let mut document = transform::transform_master(
                catalog,
                loaded.nv_values.into_values(),
                loaded.efs_values.into_values(),
            );
            document.errors.extend(loaded.errors);
            Ok(document)
        }
        Some("qcn") => qcn::read_qcn(path),
        Some("mbn") => mbn::read_mbn(path),
        _ => Err(CoreError::Format(format!(
            "unrecognised file extension for {}",
            path.display()
        ))),
    }
}
