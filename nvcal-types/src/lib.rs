// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Data model and byte codec primitives for Qualcomm NV calibration files.
//!
//! This crate defines the data structures shared by every component of the
//! pipeline — the catalog built from the schema, the value tree built by
//! each format's loader, and the byte codec primitives the marshaller and
//! the QCN/MBN readers both build on.
//!
//! # Minimal by Design
//!
//! Mirroring the split used elsewhere in this workspace: this crate holds
//! only data structures and pure byte-level primitives. XML parsing,
//! compound-file I/O, and ELF/MCFG walking are out of scope here and live
//! in `nvcal-core`.

pub mod catalog;
pub mod container;
pub mod error;
pub mod member;
pub mod pod;
pub mod value;

pub use catalog::{Catalog, CatalogEntry, EfsItem, EfsItemFlags, ItemKey, NumberedItem, Permission};
pub use container::{Document, FileVersion, MobilePropertyInfo};
pub use error::NvError;
pub use member::{DataType, Member, PrimitiveType};
pub use value::{Diagnostic, Encoding, EfsStore, EfsValue, NamedChild, NumberedValue, ParamValue, Params, ValueShape};
