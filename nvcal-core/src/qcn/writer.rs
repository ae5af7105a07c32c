// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The QCN writer: builds the OLE2 directory tree and streams out of a
//! [`Document`]. Strict: a size check or compound-file I/O failure aborts
//! with a fatal error, per the propagation policy.

use crate::error::{CoreError, Result};
use crate::qcn::layout::{
    efs_store_paths, OrdinalKeyStyle, DEFAULT_DEVICE_PATH, EFS_BACKUP_PATH_PREFIX, NV_ITEM_PACKET_SIZE,
};
use nvcal_types::catalog::NUMBERED_ITEM_PAYLOAD_SIZE;
use nvcal_types::pod::{pack_uint, BitWidth};
use nvcal_types::value::EfsStore;
use nvcal_types::Document;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    /// Ordinal-key format used for the `Provisioning_Item_Files` store.
    /// `NV_Items` and `EFS_Backup` are always written `%08X`.
    pub provisioning_key_style: OrdinalKeyStyle,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            provisioning_key_style: OrdinalKeyStyle::default(),
        }
    }
}

pub fn write_qcn(document: &Document, path: &Path, options: WriteOptions) -> Result<()> {
    let file = File::create(path)?;
    let mut comp = cfb::CompoundFile::create(file).map_err(|e| CoreError::Format(e.to_string()))?;

    write_file_version(&mut comp, document)?;

    comp.create_storage("/00000000")
        .map_err(|e| CoreError::Format(e.to_string()))?;
    comp.create_storage(DEFAULT_DEVICE_PATH)
        .map_err(|e| CoreError::Format(e.to_string()))?;

    write_mobile_property_info(&mut comp, document)?;

    for (name, store_path) in efs_store_paths(DEFAULT_DEVICE_PATH) {
        let store = match name {
            "Provisioning_Item_Files" => &document.provisioning_item_files,
            "NV_Items" => &document.nv_items,
            _ => &document.efs_backup,
        };
        let style = if name == "Provisioning_Item_Files" {
            options.provisioning_key_style
        } else {
            OrdinalKeyStyle::Hex
        };
        let apply_backup_prefix = name == "EFS_Backup";
        write_efs_store(&mut comp, &store_path, store, style, apply_backup_prefix)?;
    }

    write_nv_item_array(&mut comp, document)?;

    comp.flush()?;
    Ok(())
}

fn write_file_version<F: std::io::Read + std::io::Write + std::io::Seek>(
    comp: &mut cfb::CompoundFile<F>,
    document: &Document,
) -> Result<()> {
    let mut bytes = Vec::with_capacity(6);
    bytes.extend(pack_uint(BitWidth::W16, document.file_version.major as u64)?);
    bytes.extend(pack_uint(BitWidth::W16, document.file_version.minor as u64)?);
    bytes.extend(pack_uint(BitWidth::W16, document.file_version.revision as u64)?);

    let mut stream = comp
        .create_stream("/File_Version")
        .map_err(|e| CoreError::Format(e.to_string()))?;
    stream.write_all(&bytes)?;
    Ok(())
}

fn write_mobile_property_info<F: std::io::Read + std::io::Write + std::io::Seek>(
    comp: &mut cfb::CompoundFile<F>,
    document: &Document,
) -> Result<()> {
    let info = &document.mobile_property_info;
    let mut bytes = Vec::new();
    bytes.extend(pack_uint(BitWidth::W32, info.efs as u64)?);
    bytes.extend(pack_uint(BitWidth::W16, info.mobile_model_no as u64)?);
    bytes.push(info.major_rev);
    bytes.push(info.minor_rev);
    bytes.extend(pack_uint(BitWidth::W16, info.sw_version.len() as u64)?);
    bytes.extend(info.sw_version.as_bytes());
    bytes.extend(pack_uint(BitWidth::W16, info.qpst_version.len() as u64)?);
    bytes.extend(info.qpst_version.as_bytes());

    let path = format!("{DEFAULT_DEVICE_PATH}/Mobile_Property_Info");
    let mut stream = comp
        .create_stream(&path)
        .map_err(|e| CoreError::Format(e.to_string()))?;
    stream.write_all(&bytes)?;
    Ok(())
}

fn write_efs_store<F: std::io::Read + std::io::Write + std::io::Seek>(
    comp: &mut cfb::CompoundFile<F>,
    store_path: &str,
    store: &EfsStore,
    style: OrdinalKeyStyle,
    apply_backup_prefix: bool,
) -> Result<()> {
    comp.create_storage(store_path)
        .map_err(|e| CoreError::Format(e.to_string()))?;
    let dir_path = format!("{store_path}/EFS_Dir");
    let data_path = format!("{store_path}/EFS_Data");
    comp.create_storage(&dir_path)
        .map_err(|e| CoreError::Format(e.to_string()))?;
    comp.create_storage(&data_path)
        .map_err(|e| CoreError::Format(e.to_string()))?;

    for (ordinal, (_original_key, value)) in store.iter().enumerate() {
        let key = style.format(ordinal as u32);

        let path_bytes: Vec<u8> = if apply_backup_prefix {
            let mut buf = EFS_BACKUP_PATH_PREFIX.to_vec();
            buf.extend(value.path.as_bytes().iter().skip(1));
            buf
        } else {
            value.path.as_bytes().to_vec()
        };

        let mut dir_stream = comp
            .create_stream(format!("{dir_path}/{key}"))
            .map_err(|e| CoreError::Format(e.to_string()))?;
        dir_stream.write_all(&path_bytes)?;

        let mut data_stream = comp
            .create_stream(format!("{data_path}/{key}"))
            .map_err(|e| CoreError::Format(e.to_string()))?;
        data_stream.write_all(&value.bytes)?;
    }

    Ok(())
}

fn write_nv_item_array<F: std::io::Read + std::io::Write + std::io::Seek>(
    comp: &mut cfb::CompoundFile<F>,
    document: &Document,
) -> Result<()> {
    let storage_path = format!("{DEFAULT_DEVICE_PATH}/NV_NUMBERED_ITEMS");
    comp.create_storage(&storage_path)
        .map_err(|e| CoreError::Format(e.to_string()))?;

    let mut bytes = Vec::with_capacity(document.nv_item_array.len() * NV_ITEM_PACKET_SIZE);
    for (id, value) in &document.nv_item_array {
        if value.bytes.len() != NUMBERED_ITEM_PAYLOAD_SIZE {
            return Err(CoreError::Format(format!(
                "item {id} has payload of {} bytes, expected {NUMBERED_ITEM_PAYLOAD_SIZE}",
                value.bytes.len()
            )));
        }

        bytes.extend(pack_uint(BitWidth::W16, NV_ITEM_PACKET_SIZE as u64)?);
        bytes.extend(pack_uint(BitWidth::W16, value.index as u64)?);
        bytes.extend(pack_uint(BitWidth::W16, *id as u64)?);
        bytes.extend(pack_uint(BitWidth::W16, 0)?); // padding
        bytes.extend(&value.bytes);
    }

    let stream_path = format!("{storage_path}/NV_ITEM_ARRAY");
    let mut stream = comp
        .create_stream(&stream_path)
        .map_err(|e| CoreError::Format(e.to_string()))?;
    stream.write_all(&bytes)?;
    Ok(())
}
