// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The MBN reader: an ELF32 image wrapping an MCFG record stream used for
//! carrier configuration. Extracts the single `PT_LOAD` segment, then walks
//! its MCFG header and item records, normalising them into the same
//! in-memory model produced by the QCN reader.

use crate::error::{CoreError, Result};
use nvcal_types::pod::{unpack_cstr, unpack_uint, BitWidth};
use nvcal_types::value::{Diagnostic, ValueShape};
use nvcal_types::{Document, EfsValue, NumberedValue};
use std::fs;
use std::path::Path;

const ELF_PROGRAM_HEADER_OFFSET_FIELD: usize = 0x1c;
const ELF_PROGRAM_HEADER_ENTSIZE_FIELD: usize = 0x2a;
const ELF_PROGRAM_HEADER_COUNT_FIELD: usize = 0x2c;
const ELF_PROGRAM_HEADER_SIZE: usize = 32;
const PT_LOAD: u32 = 1;

const MCFG_MAGIC: u32 = 0x4753434d;
const MCFG_HEADER_SIZE: usize = 16;
const MCFG_MAX_FORMAT_VERSION: u32 = 3;

const VERSION_RECORD_SIZE: usize = 8;
const ITEM_PREFIX_SIZE: usize = 8;

const RECORD_TYPE_LEGACY_NV_ITEM: u16 = 0x01;
const RECORD_TYPE_EFS_FILE: u16 = 0x02;

pub fn read_mbn(path: &Path) -> Result<Document> {
    let data = fs::read(path)?;
    let segment = find_load_segment(&data)?;
    parse_mcfg(segment)
}

/// Read the ELF32 header, walk its program headers, and return the file
/// bytes backing the first `PT_LOAD` segment.
fn find_load_segment(data: &[u8]) -> Result<&[u8]> {
    let mut offset = ELF_PROGRAM_HEADER_OFFSET_FIELD;
    let phoff = unpack_uint(&mut offset, data, BitWidth::W32)? as usize;

    let mut offset = ELF_PROGRAM_HEADER_ENTSIZE_FIELD;
    let phentsize = unpack_uint(&mut offset, data, BitWidth::W16)? as usize;

    let mut offset = ELF_PROGRAM_HEADER_COUNT_FIELD;
    let phnum = unpack_uint(&mut offset, data, BitWidth::W16)? as usize;

    let entsize = if phentsize == 0 { ELF_PROGRAM_HEADER_SIZE } else { phentsize };

    for i in 0..phnum {
        let header_start = phoff + i * entsize;
        let header = data
            .get(header_start..header_start + ELF_PROGRAM_HEADER_SIZE)
            .ok_or_else(|| CoreError::Format("truncated ELF32 program header".to_string()))?;

        let mut cursor = 0;
        let p_type = unpack_uint(&mut cursor, header, BitWidth::W32)? as u32;
        let p_offset = unpack_uint(&mut cursor, header, BitWidth::W32)? as usize;
        let _p_vaddr = unpack_uint(&mut cursor, header, BitWidth::W32)?;
        let _p_paddr = unpack_uint(&mut cursor, header, BitWidth::W32)?;
        let p_filesz = unpack_uint(&mut cursor, header, BitWidth::W32)? as usize;

        if p_type == PT_LOAD {
            return data
                .get(p_offset..p_offset + p_filesz)
                .ok_or_else(|| CoreError::Format("PT_LOAD segment extends past end of file".to_string()));
        }
    }

    Err(CoreError::Format("no PT_LOAD segment found".to_string()))
}

fn parse_mcfg(segment: &[u8]) -> Result<Document> {
    let mut document = Document::new();
    let mut offset = 0usize;

    let magic = unpack_uint(&mut offset, segment, BitWidth::W32)? as u32;
    if magic != MCFG_MAGIC {
        return Err(CoreError::Format(format!(
            "bad MCFG magic: expected {MCFG_MAGIC:#x}, got {magic:#x}"
        )));
    }
    let format_version = unpack_uint(&mut offset, segment, BitWidth::W8)? as u32;
    if format_version > MCFG_MAX_FORMAT_VERSION {
        return Err(CoreError::Format(format!(
            "unsupported MCFG format version {format_version}, max {MCFG_MAX_FORMAT_VERSION}"
        )));
    }
    let _config_type = unpack_uint(&mut offset, segment, BitWidth::W8)?;
    let num_items = unpack_uint(&mut offset, segment, BitWidth::W16)? as usize;
    let _muxd_carrier = unpack_uint(&mut offset, segment, BitWidth::W32)?;
    let _spare_crc = unpack_uint(&mut offset, segment, BitWidth::W32)?;
    debug_assert_eq!(offset, MCFG_HEADER_SIZE);

    let _version_type = unpack_uint(&mut offset, segment, BitWidth::W16)?;
    let _version_length = unpack_uint(&mut offset, segment, BitWidth::W16)?;
    let _version = unpack_uint(&mut offset, segment, BitWidth::W32)?;
    debug_assert_eq!(offset, MCFG_HEADER_SIZE + VERSION_RECORD_SIZE);

    let mut next_efs_ordinal = 1u32;

    for _ in 0..num_items {
        if offset + ITEM_PREFIX_SIZE > segment.len() {
            document.push_error("MBN item stream truncated before expected item count");
            break;
        }

        let _length = unpack_uint(&mut offset, segment, BitWidth::W16)?;
        let record_type = unpack_uint(&mut offset, segment, BitWidth::W16)? as u16;
        let _attrib = unpack_uint(&mut offset, segment, BitWidth::W8)?;
        let _sp_ops = unpack_uint(&mut offset, segment, BitWidth::W8)?;
        let _spare = unpack_uint(&mut offset, segment, BitWidth::W16)?;

        match record_type {
            RECORD_TYPE_LEGACY_NV_ITEM => {
                let id = unpack_uint(&mut offset, segment, BitWidth::W16)? as u32;
                let payload_len = unpack_uint(&mut offset, segment, BitWidth::W16)? as usize;
                let payload = segment
                    .get(offset..offset + payload_len)
                    .ok_or_else(|| CoreError::Format("legacy NV item payload truncated".to_string()))?
                    .to_vec();
                offset += payload_len;

                let index = payload.first().copied().unwrap_or(0) as u32;
                let bytes = if payload.is_empty() { Vec::new() } else { payload[1..].to_vec() };

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
                        bytes,
                        errors: Vec::new(),
                    },
                );
            }
            RECORD_TYPE_EFS_FILE => {
                let _path_type = unpack_uint(&mut offset, segment, BitWidth::W16)?;
                let path_len = unpack_uint(&mut offset, segment, BitWidth::W16)? as usize;
                let path = unpack_cstr(&mut offset, segment, path_len)?;

                let _content_type = unpack_uint(&mut offset, segment, BitWidth::W16)?;
                let content_len = unpack_uint(&mut offset, segment, BitWidth::W16)? as usize;
                let content = segment
                    .get(offset..offset + content_len)
                    .ok_or_else(|| CoreError::Format("EFS file content truncated".to_string()))?
                    .to_vec();
                offset += content_len;

                let value = EfsValue {
                    path,
                    index: 1,
                    mapping: None,
                    encoding: None,
                    provisioning_store: false,
                    source_numbered_id: None,
                    raw: ValueShape::Scalar(String::new()),
                    params: Vec::new(),
                    bytes: content,
                    errors: Vec::new(),
                };

                let key = format!("{next_efs_ordinal:07}");
                next_efs_ordinal += 1;
                document.nv_items.insert_next(value, key);
            }
            other => {
                document.push_error(format!("MBN record type {other:#x} recognised but not decoded"));
            }
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend(v.to_le_bytes());
    }
    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend(v.to_le_bytes());
    }

    fn mcfg_with_one_efs_item() -> Vec<u8> {
        let mut body = Vec::new();
        push_u32(&mut body, MCFG_MAGIC);
        body.push(2); // format version
        body.push(0); // config type
        push_u16(&mut body, 1); // num_items
        push_u32(&mut body, 0); // muxd_carrier
        push_u32(&mut body, 0); // spare_crc
        // version record
        push_u16(&mut body, 0);
        push_u16(&mut body, 4);
        push_u32(&mut body, 1);

        // item prefix
        push_u16(&mut body, 0); // length (unused by the parser)
        push_u16(&mut body, RECORD_TYPE_EFS_FILE);
        body.push(0); // attrib
        body.push(0); // sp_ops
        push_u16(&mut body, 0); // spare

        let path = b"/nv/item_files/x";
        push_u16(&mut body, 0); // path record type
        push_u16(&mut body, path.len() as u16);
        body.extend(path);

        let content = [0x01u8, 0x02, 0x03];
        push_u16(&mut body, 0); // content record type
        push_u16(&mut body, content.len() as u16);
        body.extend(content);

        body
    }

    fn wrap_in_elf(segment: &[u8]) -> Vec<u8> {
        let phoff: u32 = 52;
        let mut file = vec![0u8; phoff as usize];
        file[ELF_PROGRAM_HEADER_OFFSET_FIELD..ELF_PROGRAM_HEADER_OFFSET_FIELD + 4]
            .copy_from_slice(&phoff.to_le_bytes());
        file[ELF_PROGRAM_HEADER_ENTSIZE_FIELD..ELF_PROGRAM_HEADER_ENTSIZE_FIELD + 2]
            .copy_from_slice(&(ELF_PROGRAM_HEADER_SIZE as u16).to_le_bytes());
        file[ELF_PROGRAM_HEADER_COUNT_FIELD..ELF_PROGRAM_HEADER_COUNT_FIELD + 2]
            .copy_from_slice(&1u16.to_le_bytes());

        let segment_offset = phoff as usize + ELF_PROGRAM_HEADER_SIZE;
        let mut phdr = Vec::new();
        push_u32(&mut phdr, PT_LOAD);
        push_u32(&mut phdr, segment_offset as u32);
        push_u32(&mut phdr, 0); // p_vaddr
        push_u32(&mut phdr, 0); // p_paddr
        push_u32(&mut phdr, segment.len() as u32);
        push_u32(&mut phdr, segment.len() as u32);
        push_u32(&mut phdr, 0); // p_flags
        push_u32(&mut phdr, 0); // p_align
        file.extend(phdr);
        file.extend(segment);
        file
    }

    #[test]
    fn efs_record_normalises_to_ordinal_one() {
        let segment = mcfg_with_one_efs_item();
        let file = wrap_in_elf(&segment);
        let located = find_load_segment(&file).unwrap();
        let document = parse_mcfg(located).unwrap();

        let value = document.nv_items.iter().next().unwrap();
        assert_eq!(value.0, "0000001");
        assert_eq!(value.1.path, "/nv/item_files/x");
        assert_eq!(value.1.bytes, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut segment = mcfg_with_one_efs_item();
        segment[0] = 0xff;
        assert!(parse_mcfg(&segment).is_err());
    }
}
