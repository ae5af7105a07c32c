// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The top-level, format-agnostic document every loader builds and every
//! sink (printer, writer, differ) consumes.

use crate::value::{Diagnostic, EfsStore, NumberedValue};
use std::collections::BTreeMap;

/// The small fixed-shape `File_Version` record: three `uint16` fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub revision: u16,
}

/// The small fixed-shape `Mobile_Property_Info` record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MobilePropertyInfo {
    pub efs: u32,
    pub mobile_model_no: u16,
    pub major_rev: u8,
    pub minor_rev: u8,
    pub sw_version: String,
    pub qpst_version: String,
}

/// The unified in-memory model every input format normalizes into, and
/// every output format (print, update script, write) consumes from.
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub file_version: FileVersion,
    pub mobile_property_info: MobilePropertyInfo,

    /// Ordered numeric id -> value.
    pub nv_item_array: BTreeMap<u32, NumberedValue>,

    pub nv_items: EfsStore,
    pub provisioning_item_files: EfsStore,
    pub efs_backup: EfsStore,

    /// Directory-tree nodes the reader could not classify under a known
    /// store; kept so a careful caller can inspect what was skipped.
    pub unprocessed: Vec<String>,

    /// Accumulated, ordered, human-readable diagnostics for the whole
    /// document, independent of any individual item's own `errors` list.
    pub errors: Vec<Diagnostic>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(Diagnostic::new(message));
    }

    /// True if no numeric id, EFS path, or document-level error was
    /// recorded — useful for "diff same file twice" style checks.
    pub fn is_empty(&self) -> bool {
        self.nv_item_array.is_empty()
            && self.nv_items.is_empty()
            && self.provisioning_item_files.is_empty()
            && self.efs_backup.is_empty()
    }
}
