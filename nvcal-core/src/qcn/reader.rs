// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The QCN reader: walks the compound-file directory tree and normalises
//! every document pair into the unified [`Document`] model.

use crate::error::{CoreError, Result};
use crate::qcn::layout::{EFS_BACKUP_PATH_PREFIX, NV_ITEM_PACKET_HEADER_SIZE, NV_ITEM_PACKET_SIZE};
use nvcal_types::container::{FileVersion, MobilePropertyInfo};
use nvcal_types::pod::{unpack_cstr, unpack_uint, BitWidth};
use nvcal_types::value::EfsValue;
use nvcal_types::{Document, NumberedValue, ValueShape};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub fn read_qcn(path: &Path) -> Result<Document> {
    let file = File::open(path)?;
    let mut comp = cfb::CompoundFile::open(file).map_err(|e| CoreError::Format(e.to_string()))?;

    let stream_paths: Vec<String> = comp
        .walk()
        .filter(|e| e.is_stream())
        .map(|e| e.path().to_string_lossy().replace('\\', "/"))
        .collect();

    let mut document = Document::new();
    // (store name) -> ordinal -> bytes, collected from the EFS_Dir/EFS_Data
    // sibling document pairs before being joined into EfsValues.
    let mut dirs: BTreeMap<String, BTreeMap<String, Vec<u8>>> = BTreeMap::new();
    let mut datas: BTreeMap<String, BTreeMap<String, Vec<u8>>> = BTreeMap::new();

    for stream_path in stream_paths {
        log::debug!("opening compound-file stream {stream_path}");
        let mut buf = Vec::new();
        {
            let mut stream = comp
                .open_stream(&stream_path)
                .map_err(|e| CoreError::Format(e.to_string()))?;
            stream.read_to_end(&mut buf)?;
        }

        let segments: Vec<&str> = stream_path.trim_start_matches('/').split('/').collect();
        let name = *segments.last().unwrap_or(&"");
        let parent = if segments.len() >= 2 { segments[segments.len() - 2] } else { "" };
        let grandparent = if segments.len() >= 3 { segments[segments.len() - 3] } else { "" };

        match (parent, name) {
            (_, "File_Version") => {
                document.file_version = parse_file_version(&buf)?;
            }
            (_, "Mobile_Property_Info") => {
                document.mobile_property_info = parse_mobile_property_info(&buf)?;
            }
            (_, "NV_ITEM_ARRAY") => {
                parse_nv_item_array(&buf, &mut document)?;
            }
            ("EFS_Dir", _) => {
                dirs.entry(grandparent.to_string()).or_default().insert(name.to_string(), buf);
            }
            ("EFS_Data", _) => {
                datas.entry(grandparent.to_string()).or_default().insert(name.to_string(), buf);
            }
            _ => {
                document.unprocessed.push(stream_path);
            }
        }
    }

    for (store_name, dir_entries) in &dirs {
        let data_entries = datas.get(store_name);
        for (key, path_bytes) in dir_entries {
            let data_bytes = data_entries.and_then(|d| d.get(key)).cloned().unwrap_or_default();
            let (path, source_numbered_id) = decode_efs_path(store_name, path_bytes);

            let value = EfsValue {
                path,
                index: 1,
                mapping: None,
                encoding: None,
                provisioning_store: store_name == "Provisioning_Item_Files",
                source_numbered_id,
                raw: ValueShape::Scalar(String::new()),
                params: Vec::new(),
                bytes: data_bytes,
                errors: Vec::new(),
            };

            let store = match store_name.as_str() {
                "Provisioning_Item_Files" => &mut document.provisioning_item_files,
                "NV_Items" => &mut document.nv_items,
                "EFS_Backup" => &mut document.efs_backup,
                _ => {
                    document.unprocessed.push(format!("{store_name}/{key}"));
                    continue;
                }
            };
            store.insert_next(value, key.clone());
        }
    }

    Ok(document)
}

fn decode_efs_path(store_name: &str, path_bytes: &[u8]) -> (String, Option<u32>) {
    if store_name == "EFS_Backup" && path_bytes.len() >= EFS_BACKUP_PATH_PREFIX.len() {
        let (prefix, rest) = path_bytes.split_at(EFS_BACKUP_PATH_PREFIX.len());
        if prefix == EFS_BACKUP_PATH_PREFIX {
            let mut path = String::from("/");
            path.push_str(&String::from_utf8_lossy(rest));
            return (path, None);
        }
    }

    (String::from_utf8_lossy(path_bytes).into_owned(), None)
}

fn parse_file_version(buf: &[u8]) -> Result<FileVersion> {
    let mut offset = 0;
    let major = unpack_uint(&mut offset, buf, BitWidth::W16)? as u16;
    let minor = unpack_uint(&mut offset, buf, BitWidth::W16)? as u16;
    let revision = unpack_uint(&mut offset, buf, BitWidth::W16)? as u16;
    Ok(FileVersion { major, minor, revision })
}

fn parse_mobile_property_info(buf: &[u8]) -> Result<MobilePropertyInfo> {
    let mut offset = 0;
    let efs = unpack_uint(&mut offset, buf, BitWidth::W32)? as u32;
    let mobile_model_no = unpack_uint(&mut offset, buf, BitWidth::W16)? as u16;
    let major_rev = *buf.get(offset).ok_or_else(|| CoreError::Format("input too small".to_string()))?;
    offset += 1;
    let minor_rev = *buf.get(offset).ok_or_else(|| CoreError::Format("input too small".to_string()))?;
    offset += 1;
    let sw_len = unpack_uint(&mut offset, buf, BitWidth::W16)? as usize;
    let sw_version = unpack_cstr(&mut offset, buf, sw_len)?;
    let qpst_len = unpack_uint(&mut offset, buf, BitWidth::W16)? as usize;
    let qpst_version = unpack_cstr(&mut offset, buf, qpst_len)?;

    Ok(MobilePropertyInfo {
        efs,
        mobile_model_no,
        major_rev,
        minor_rev,
        sw_version,
        qpst_version,
    })
}

fn parse_nv_item_array(buf: &[u8], document: &mut Document) -> Result<()> {
    let mut offset = 0;
    while offset + NV_ITEM_PACKET_SIZE <= buf.len() {
        let packet = &buf[offset..offset + NV_ITEM_PACKET_SIZE];
        let mut cursor = 0;
        let _stream_size = unpack_uint(&mut cursor, packet, BitWidth::W16)?;
        let index = unpack_uint(&mut cursor, packet, BitWidth::W16)? as u32;
        let id = unpack_uint(&mut cursor, packet, BitWidth::W16)? as u32;
        let _padding = unpack_uint(&mut cursor, packet, BitWidth::W16)?;
        let payload = packet[NV_ITEM_PACKET_HEADER_SIZE..].to_vec();

        document.nv_item_array.insert(
            id,
            NumberedValue {
                id,
                name: String::new(),
                index,
                mapping: None,
                encoding: None,
                raw: ValueShape::Scalar(String::new()),
                params: Vec::new(),
                bytes: payload,
                errors: Vec::new(),
            },
        );

        offset += NV_ITEM_PACKET_SIZE;
    }
    Ok(())
}
