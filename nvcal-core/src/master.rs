// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The master-file loader: parses the value XML (with `xi:include`
//! directives) into item-id -> value-expression and path -> value-expression
//! maps.

use nvcal_types::catalog::{synthesize_efs_path, EFS_SYNTHESIS_THRESHOLD};
use nvcal_types::value::{Diagnostic, Encoding, NamedChild, ValueShape};
use nvcal_types::{EfsValue, NumberedValue};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Recursive `xi:include` depth guard. A cyclic include raises a
/// diagnostic rather than overflowing the stack.
pub const MAX_INCLUDE_DEPTH: usize = 16;

pub struct LoadedMaster {
    pub nv_values: BTreeMap<u32, NumberedValue>,
    pub efs_values: BTreeMap<String, EfsValue>,
    pub errors: Vec<Diagnostic>,
}

/// Load a master-value XML file, following `xi:include` directives
/// relative to each including file's own directory.
pub fn load_master_file(path: &Path) -> std::io::Result<LoadedMaster> {
    let mut nv_values = BTreeMap::new();
    let mut efs_values = BTreeMap::new();
    let mut errors = Vec::new();

    load_into(path, 0, &mut nv_values, &mut efs_values, &mut errors)?;

    Ok(LoadedMaster {
        nv_values,
        efs_values,
        errors,
    })
}

fn load_into(
    path: &Path,
    depth: usize,
    nv_values: &mut BTreeMap<u32, NumberedValue>,
    efs_values: &mut BTreeMap<String, EfsValue>,
    errors: &mut Vec<Diagnostic>,
) -> std::io::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        errors.push(Diagnostic::new(format!(
            "xi:include depth exceeded at {:?}; likely cyclic include",
            path
        )));
        return Ok(());
    }

    let content = fs::read_to_string(path)?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    parse_master_xml(&content, &base_dir, depth, nv_values, efs_values, errors);

    Ok(())
}

enum Item {
    Nv {
        id: u32,
        name: String,
        index: u32,
        mapping: Option<String>,
        encoding: Option<Encoding>,
    },
    Efs {
        path: String,
        index: u32,
        mapping: Option<String>,
        encoding: Option<Encoding>,
        provisioning_store: bool,
    },
}

fn parse_master_xml(
    xml: &str,
    base_dir: &Path,
    depth: usize,
    nv_values: &mut BTreeMap<u32, NumberedValue>,
    efs_values: &mut BTreeMap<String, EfsValue>,
    errors: &mut Vec<Diagnostic>,
) {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Item> = Vec::new();
    // text/children accumulated for the item currently on top of `stack`.
    let mut text_stack: Vec<String> = Vec::new();
    let mut children_stack: Vec<Vec<NamedChild>> = Vec::new();
    // when we're inside a structured child element, its tag + text so far.
    let mut current_child: Vec<(String, String)> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let is_include = local == "xi:include" || local == "include";

                if is_include {
                    let mut href = None;
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        if key == "href" {
                            href = Some(attr.unescape_value().unwrap_or_default().into_owned());
                        }
                    }
                    if let Some(href) = href {
                        let included = base_dir.join(&href);
                        log::debug!("entering xi:include {:?} at depth {}", included, depth + 1);
                        if let Err(e) = load_into(&included, depth + 1, nv_values, efs_values, errors) {
                            errors.push(Diagnostic::new(format!(
                                "failed to include {:?}: {e}",
                                included
                            )));
                        }
                    } else {
                        errors.push(Diagnostic::new("xi:include missing href"));
                    }
                    continue;
                }

                if local == "NvItem" {
                    let mut id = None;
                    let mut name = String::new();
                    let mut index = 1u32;
                    let mut mapping = None;
                    let mut encoding = None;
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let val = attr.unescape_value().unwrap_or_default().into_owned();
                        match key.as_str() {
                            "id" => id = val.parse::<u32>().ok(),
                            "name" => name = val,
                            "index" => index = val.parse::<u32>().unwrap_or(1),
                            "mapping" => mapping = Some(val),
                            "encoding" => encoding = Encoding::parse(&val),
                            _ => {}
                        }
                    }
                    match id {
                        Some(id) => {
                            stack.push(Item::Nv { id, name, index, mapping, encoding });
                            text_stack.push(String::new());
                            children_stack.push(Vec::new());
                        }
                        None => errors.push(Diagnostic::new("NvItem missing numeric id")),
                    }
                } else if local == "NvEfsItem" {
                    let mut path = String::new();
                    let mut index = 1u32;
                    let mut mapping = None;
                    let mut encoding = None;
                    let mut provisioning_store = false;
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let val = attr.unescape_value().unwrap_or_default().into_owned();
                        match key.as_str() {
                            "fullpathname" => path = val,
                            "index" => index = val.parse::<u32>().unwrap_or(1),
                            "mapping" => mapping = Some(val),
                            "encoding" => encoding = Encoding::parse(&val),
                            "useProvisioningStore" => provisioning_store = val == "true" || val == "1",
                            _ => {}
                        }
                    }
                    stack.push(Item::Efs { path, index, mapping, encoding, provisioning_store });
                    text_stack.push(String::new());
                    children_stack.push(Vec::new());
                } else if !stack.is_empty() {
                    // A structured child of the currently open item.
                    current_child.push((local, String::new()));
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                if let Some((_, buf)) = current_child.last_mut() {
                    buf.push_str(&text);
                } else if let Some(buf) = text_stack.last_mut() {
                    buf.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let local = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                if local == "NvItem" || local == "NvEfsItem" {
                    let item = stack.pop();
                    let text = text_stack.pop().unwrap_or_default();
                    let children = children_stack.pop().unwrap_or_default();
                    let raw = if children.is_empty() {
                        ValueShape::Scalar(text)
                    } else {
                        ValueShape::Members(children)
                    };

                    match item {
                        Some(Item::Nv { id, name, index, mapping, encoding }) if id >= EFS_SYNTHESIS_THRESHOLD => {
                            let _ = &name;
                            let path = synthesize_efs_path(id);
                            efs_values.insert(
                                path.clone(),
                                EfsValue {
                                    path,
                                    index,
                                    mapping,
                                    encoding,
                                    provisioning_store: false,
                                    source_numbered_id: Some(id),
                                    raw,
                                    params: Vec::new(),
                                    bytes: Vec::new(),
                                    errors: Vec::new(),
                                },
                            );
                        }
                        Some(Item::Nv { id, name, index, mapping, encoding }) => {
                            nv_values.insert(
                                id,
                                NumberedValue {
                                    id,
                                    name,
                                    index,
                                    mapping,
                                    encoding,
                                    raw,
                                    params: Vec::new(),
                                    bytes: Vec::new(),
                                    errors: Vec::new(),
                                },
                            );
                        }
                        Some(Item::Efs { path, index, mapping, encoding, provisioning_store }) => {
                            efs_values.insert(
                                path.clone(),
                                EfsValue {
                                    path,
                                    index,
                                    mapping,
                                    encoding,
                                    provisioning_store,
                                    source_numbered_id: None,
                                    raw,
                                    params: Vec::new(),
                                    bytes: Vec::new(),
                                    errors: Vec::new(),
                                },
                            );
                        }
                        None => {}
                    }
                } else if let Some((tag, text)) = current_child.pop() {
                    if let Some(top) = children_stack.last_mut() {
                        top.push(NamedChild { tag, content: text });
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                errors.push(Diagnostic::new(format!("XML parse error: {e}")));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scalar_item_parses_as_scalar_shape() {
        let xml = r#"<MasterFile>
            <NvItem id="946" encoding="dec">132183, 10211</NvItem>
        </MasterFile>"#;

        let mut nv = BTreeMap::new();
        let mut efs = BTreeMap::new();
        let mut errors = Vec::new();
        parse_master_xml(xml, Path::new("."), 0, &mut nv, &mut efs, &mut errors);

        assert!(errors.is_empty());
        let v = nv.get(&946).unwrap();
        assert_eq!(v.raw, ValueShape::Scalar("132183, 10211".to_string()));
        assert_eq!(v.encoding, Some(Encoding::Dec));
    }

    #[test]
    fn include_is_resolved_relative_to_including_file() {
        let dir = tempfile::tempdir().unwrap();
        let included_path = dir.path().join("included.xml");
        let mut included = fs::File::create(&included_path).unwrap();
        write!(included, r#"<MasterFile><NvItem id="1">5</NvItem></MasterFile>"#).unwrap();

        let main_path = dir.path().join("main.xml");
        let mut main = fs::File::create(&main_path).unwrap();
        write!(
            main,
            r#"<MasterFile><xi:include href="included.xml"/><NvItem id="2">7</NvItem></MasterFile>"#
        )
        .unwrap();

        let loaded = load_master_file(&main_path).unwrap();
        assert!(loaded.errors.is_empty());
        assert_eq!(loaded.nv_values.len(), 2);
        assert_eq!(
            loaded.nv_values[&1].raw,
            ValueShape::Scalar("5".to_string())
        );
    }
}
