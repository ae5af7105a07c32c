// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The QCN compound-file reader and writer.
//!
//! A QCN is an OLE2/compound-file container. Compound-file primitives
//! (stream create/read, directory entries) are treated as an external
//! collaborator, provided here by the `cfb` crate.

mod layout;
mod reader;
mod writer;

pub use layout::{OrdinalKeyStyle, EFS_BACKUP_PATH_PREFIX, NV_ITEM_PACKET_SIZE};
pub use reader::read_qcn;
pub use writer::{write_qcn, WriteOptions};
