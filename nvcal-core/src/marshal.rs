// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The value marshaller: given a schema member list and a textual value
//! list, emits a byte buffer and a list of per-field errors.

use nvcal_types::pod::{pack_int, pack_string_fixed, pack_uint, BitWidth};
use nvcal_types::value::{Diagnostic, Encoding, NamedChild, ParamValue, ValueShape};
use nvcal_types::{Member, Params, PrimitiveType};
use regex::Regex;
use std::sync::OnceLock;

/// Above this declared element count, a `uint8` member whose source has no
/// comma separator is promoted wholesale to an ASCII string even though
/// the schema declared `uint8`. Kept as a single gate so the policy lives
/// in exactly one place.
pub const UINT8_STRING_PROMOTION_THRESHOLD: usize = 20;

fn hex_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(0[xX][0-9a-fA-F]+|[0-9a-fA-F]+)$").unwrap())
}

fn dec_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?[0-9]+$").unwrap())
}

/// Tokenise a flat scalar value string on `[ ,\t\n]+`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c == ' ' || c == ',' || c == '\t' || c == '\n')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_int_token(token: &str, encoding: Encoding) -> Option<i128> {
    let t = token.trim();
    match encoding {
        Encoding::Hex => {
            if !hex_token_re().is_match(t) {
                return None;
            }
            let stripped = t.trim_start_matches("0x").trim_start_matches("0X");
            i128::from_str_radix(stripped, 16).ok()
        }
        Encoding::Dec | Encoding::String => {
            if dec_token_re().is_match(t) {
                t.parse::<i128>().ok()
            } else if hex_token_re().is_match(t) && (t.starts_with("0x") || t.starts_with("0X")) {
                // A `0x` literal is unambiguous even under dec encoding.
                let stripped = t.trim_start_matches("0x").trim_start_matches("0X");
                i128::from_str_radix(stripped, 16).ok()
            } else {
                None
            }
        }
    }
}

/// The result of marshalling one item: per-member records, the
/// concatenated byte buffer, and the flat, prefixed error list.
pub struct MarshalOutcome {
    pub params: Params,
    pub bytes: Vec<u8>,
    pub errors: Vec<Diagnostic>,
}

/// Marshal a `ValueShape` against a member list declared by the schema.
///
/// `variable_size` enables the trailing-member trim rule for EFS items
/// declared `variable-size`.
pub fn marshal(members: &[Member], shape: &ValueShape, encoding: Encoding, variable_size: bool) -> MarshalOutcome {
    if members.is_empty() {
        return marshal_missing_schema(shape);
    }

    match shape {
        ValueShape::Scalar(text) => marshal_scalar(members, text, encoding, variable_size),
        ValueShape::Members(children) => marshal_structured(members, children, encoding, variable_size),
    }
}

fn marshal_missing_schema(shape: &ValueShape) -> MarshalOutcome {
    match shape {
        ValueShape::Scalar(text) => {
            let tokens = tokenize(text);
            if tokens.len() <= 1 {
                let token = tokens.first().cloned().unwrap_or_default();
                let data = match token.parse::<i128>() {
                    Ok(v) => vec![(v & 0xff) as u8],
                    Err(_) => token.as_bytes().first().copied().map(|b| vec![b]).unwrap_or_default(),
                };
                let param = ParamValue {
                    name: String::new(),
                    type_name: PrimitiveType::Uint8.name().to_string(),
                    size: 1,
                    val: vec![token],
                    data: Some(data.clone()),
                    errors: vec![Diagnostic::new("missing schema!")],
                };
                MarshalOutcome {
                    params: vec![param],
                    bytes: data,
                    errors: vec![Diagnostic::new("missing schema!")],
                }
            } else {
                MarshalOutcome {
                    params: Vec::new(),
                    bytes: Vec::new(),
                    errors: vec![Diagnostic::new(
                        "schema error: no schema defined for item with multiple value elements",
                    )],
                }
            }
        }
        ValueShape::Members(_) => MarshalOutcome {
            params: Vec::new(),
            bytes: Vec::new(),
            errors: vec![Diagnostic::new(
                "schema error: no schema defined for item with multiple value elements",
            )],
        },
    }
}

fn declared_token_count(members: &[Member]) -> usize {
    members
        .iter()
        .map(|m| if m.primitive() == Some(PrimitiveType::String) { 1 } else { m.size.max(1) })
        .sum()
}

fn marshal_scalar(members: &[Member], text: &str, encoding: Encoding, variable_size: bool) -> MarshalOutcome {
    let encoding = encoding;
    let declared = declared_token_count(members);
    let has_comma = text.contains(',');

    // Whole-item promotion: a single uint8 member whose size exceeds the
    // threshold, fed a comma-free source, is packed as one ASCII string
    // regardless of per-token numeric parsing.
    if members.len() == 1
        && members[0].primitive() == Some(PrimitiveType::Uint8)
        && members[0].size > UINT8_STRING_PROMOTION_THRESHOLD
        && !has_comma
    {
        let member = &members[0];
        let data = pack_string_fixed(text.trim(), member.size);
        let param = ParamValue {
            name: member.name.clone(),
            type_name: member.type_name.clone(),
            size: member.size,
            val: vec![text.trim().to_string()],
            data: Some(data.clone()),
            errors: Vec::new(),
        };
        return MarshalOutcome {
            params: vec![param],
            bytes: data,
            errors: Vec::new(),
        };
    }

    let tokens = tokenize(text);
    let mut errors = Vec::new();
    if tokens.len() != declared {
        errors.push(Diagnostic::new(format!(
            "mismatch between {declared} declared, {defined} defined elements",
            defined = tokens.len()
        )));
    }

    let mut cursor = 0usize;
    let mut params = Vec::with_capacity(members.len());
    for member in members {
        let window_size = if member.primitive() == Some(PrimitiveType::String) { 1 } else { member.size.max(1) };
        let end = (cursor + window_size).min(tokens.len());
        let window = if cursor < tokens.len() { &tokens[cursor..end] } else { &[] };
        cursor = end;

        let param = marshal_member(member, window, encoding);
        errors.extend(
            param
                .errors
                .iter()
                .map(|d| Diagnostic::new(format!("error in {}: {}", member.name, d.message))),
        );
        params.push(param);
    }

    finish(members, params, errors, variable_size)
}

fn marshal_structured(members: &[Member], children: &[NamedChild], encoding: Encoding, variable_size: bool) -> MarshalOutcome {
    let mut errors = Vec::new();
    let mut params = Vec::with_capacity(members.len());

    for (i, member) in members.iter().enumerate() {
        let child = children
            .iter()
            .find(|c| c.tag == member.name && !member.name.is_empty())
            .or_else(|| children.get(i));

        let window: Vec<String> = match child {
            Some(c) => tokenize(&c.content),
            None => Vec::new(),
        };

        if child.is_none() {
            errors.push(Diagnostic::new(format!(
                "error in {}: no matching value supplied",
                member.name
            )));
        }

        let param = marshal_member(member, &window, encoding);
        errors.extend(
            param
                .errors
                .iter()
                .map(|d| Diagnostic::new(format!("error in {}: {}", member.name, d.message))),
        );
        params.push(param);
    }

    finish(members, params, errors, variable_size)
}

/// Marshal one member against its token window (already truncated to the
/// member's declared element count, or shorter if the source ran out).
fn marshal_member(member: &Member, tokens: &[String], encoding: Encoding) -> ParamValue {
    let mut errors = Vec::new();

    let primitive = match member.primitive() {
        Some(p) => p,
        None => {
            errors.push(Diagnostic::new(format!("unknown type: {}", member.type_name)));
            return ParamValue {
                name: member.name.clone(),
                type_name: member.type_name.clone(),
                size: member.size,
                val: tokens.to_vec(),
                data: Some(vec![0u8; member.size]),
                errors,
            };
        }
    };

    let data = match primitive {
        PrimitiveType::Uint8 => marshal_uint8(member, tokens, &mut errors),
        PrimitiveType::String => {
            let text = tokens.join(" ");
            pack_string_fixed(&text, member.size)
        }
        _ if primitive.is_signed() || primitive.is_unsigned_int() => {
            marshal_integer(primitive, member, tokens, encoding, &mut errors)
        }
        _ => Vec::new(),
    };

    ParamValue {
        name: member.name.clone(),
        type_name: member.type_name.clone(),
        size: member.size,
        val: tokens.to_vec(),
        data: Some(data),
        errors,
    }
}

fn marshal_uint8(member: &Member, tokens: &[String], errors: &mut Vec<Diagnostic>) -> Vec<u8> {
    let mut numeric_bytes = Vec::new();
    let mut promoted: Option<Vec<u8>> = None;
    let mut had_numeric = false;

    for token in tokens {
        match token.parse::<i64>().ok().or_else(|| {
            let t = token.trim();
            if hex_token_re().is_match(t) && (t.starts_with("0x") || t.starts_with("0X")) {
                i64::from_str_radix(t.trim_start_matches("0x").trim_start_matches("0X"), 16).ok()
            } else {
                None
            }
        }) {
            Some(v) => {
                had_numeric = true;
                if (0..=255).contains(&v) {
                    numeric_bytes.push(v as u8);
                } else {
                    errors.push(Diagnostic::new(format!("parameter {token} not a number")));
                    numeric_bytes.push(0);
                }
            }
            None => {
                promoted = Some(pack_string_fixed(token, member.size.max(1)));
            }
        }
    }

    match (promoted, had_numeric) {
        (Some(s), false) if tokens.len() == 1 => s,
        (Some(s), _) => {
            errors.push(Diagnostic::new("only one string element allowed"));
            s
        }
        (None, _) => {
            let mut out = numeric_bytes;
            let want = member.size.max(1);
            out.resize(want, 0);
            out
        }
    }
}

fn marshal_integer(
    primitive: PrimitiveType,
    member: &Member,
    tokens: &[String],
    encoding: Encoding,
    errors: &mut Vec<Diagnostic>,
) -> Vec<u8> {
    let width: BitWidth = primitive.bit_width().expect("integer primitive has a bit width");
    let mut out = Vec::with_capacity(width.bytes() * member.size.max(1));

    let expected = member.size.max(1);
    for i in 0..expected {
        let token = tokens.get(i);
        let token = match token {
            Some(t) => t,
            None => {
                out.extend(std::iter::repeat(0).take(width.bytes()));
                continue;
            }
        };

        match parse_int_token(token, encoding) {
            Some(v) => {
                let packed = if primitive.is_signed() {
                    pack_int(width, v as i64)
                } else {
                    pack_uint(width, v as u64)
                };
                match packed {
                    Ok(bytes) => out.extend(bytes),
                    Err(_) => {
                        errors.push(Diagnostic::new(format!("parameter {token} not a number")));
                        out.extend(std::iter::repeat(0).take(width.bytes()));
                    }
                }
            }
            None => {
                errors.push(Diagnostic::new(format!("parameter {token} not a number")));
                out.extend(std::iter::repeat(0).take(width.bytes()));
            }
        }
    }

    out
}

/// Apply the EFS `variable-size` trailing-member trim, then concatenate
/// member buffers into the item's aggregate bytes.
fn finish(members: &[Member], mut params: Params, mut errors: Vec<Diagnostic>, variable_size: bool) -> MarshalOutcome {
    if variable_size {
        let present: Vec<bool> = params.iter().map(|p| p.data.as_ref().is_some_and(|d| !d.is_empty())).collect();
        let monotone = is_monotone_prefix(&present);
        if monotone {
            let trim_from = present.iter().rposition(|&p| p).map(|i| i + 1).unwrap_or(0);
            params.truncate(trim_from);
        } else if present.iter().any(|&p| !p) {
            errors.push(Diagnostic::new(
                "variable-size item has non-monotone present flags; retaining all members",
            ));
        }
    }

    let string_count = members
        .iter()
        .filter(|m| m.primitive() == Some(PrimitiveType::String))
        .count();
    if string_count > 1 {
        errors.push(Diagnostic::new("only one string element allowed"));
    }

    let bytes: Vec<u8> = params.iter().flat_map(|p| p.data.clone().unwrap_or_default()).collect();

    MarshalOutcome { params, bytes, errors }
}

fn is_monotone_prefix(flags: &[bool]) -> bool {
    let mut seen_false = false;
    for &f in flags {
        if !f {
            seen_false = true;
        } else if seen_false {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvcal_types::Member;

    #[test]
    fn uint8_size_30_single_token_promotes_to_ascii() {
        let members = vec![Member::new("name", "uint8", 30)];
        let shape = ValueShape::Scalar("ims".to_string());
        let outcome = marshal(&members, &shape, Encoding::Dec, false);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.bytes.len(), 30);
        assert_eq!(&outcome.bytes[..3], b"ims");
        assert!(outcome.bytes[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn uint8_size_2_mixed_tokens_reports_single_string_error() {
        let members = vec![Member::new("name", "uint8", 2)];
        let shape = ValueShape::Scalar("0x20, 2az".to_string());
        let outcome = marshal(&members, &shape, Encoding::Hex, false);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.message.contains("only one string element allowed")));
    }

    #[test]
    fn dec_item_two_int_members() {
        let members = vec![Member::new("band1", "int32", 1), Member::new("band2", "int16", 1)];
        let shape = ValueShape::Scalar("132183, 10211".to_string());
        let outcome = marshal(&members, &shape, Encoding::Dec, false);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            &outcome.bytes,
            &[0x57, 0x04, 0x02, 0x00, 0xe3, 0x27]
        );
    }

    #[test]
    fn token_that_is_not_a_number_records_diagnostic() {
        let members = vec![Member::new("a", "int32", 1)];
        let shape = ValueShape::Scalar("not_a_number".to_string());
        let outcome = marshal(&members, &shape, Encoding::Dec, false);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.message.contains("not a number")));
        assert_eq!(outcome.bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn missing_schema_single_scalar_is_packed_as_uint8() {
        let shape = ValueShape::Scalar("5".to_string());
        let outcome = marshal(&[], &shape, Encoding::Dec, false);
        assert!(outcome.errors.iter().any(|e| e.message == "missing schema!"));
        assert_eq!(outcome.bytes, vec![5]);
    }

    #[test]
    fn missing_schema_multi_element_is_schema_error() {
        let shape = ValueShape::Scalar("5, 6".to_string());
        let outcome = marshal(&[], &shape, Encoding::Dec, false);
        assert!(outcome.errors.iter().any(|e| e.message.contains("schema error")));
        assert!(outcome.bytes.is_empty());
    }
}
