//! Document writers used by the tests to produce real byte streams.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::parser::BINARY_PROLOGUE;
use super::types::{Node, Property};

const TEST_VERSION: u32 = 7300;

/// Encode a single property, compressing arrays when asked.
pub fn encode_property(property: &Property, compress: bool) -> Vec<u8> {
    let mut out = Vec::new();
    match property {
        Property::I16(v) => {
            out.push(b'Y');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Property::Bool(v) => {
            out.push(b'C');
            out.push(u8::from(*v));
        }
        Property::I32(v) => {
            out.push(b'I');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Property::F32(v) => {
            out.push(b'F');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Property::F64(v) => {
            out.push(b'D');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Property::I64(v) => {
            out.push(b'L');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Property::F32Array(values) => {
            let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            encode_array(&mut out, b'f', values.len(), &raw, compress);
        }
        Property::F64Array(values) => {
            let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            encode_array(&mut out, b'd', values.len(), &raw, compress);
        }
        Property::I64Array(values) => {
            let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            encode_array(&mut out, b'l', values.len(), &raw, compress);
        }
        Property::I32Array(values) => {
            let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            encode_array(&mut out, b'i', values.len(), &raw, compress);
        }
        Property::BoolArray(values) => {
            let raw: Vec<u8> = values.iter().map(|v| u8::from(*v)).collect();
            encode_array(&mut out, b'b', values.len(), &raw, compress);
        }
        Property::String(bytes) => encode_blob(&mut out, b'S', bytes),
        Property::Raw(bytes) => encode_blob(&mut out, b'R', bytes),
        Property::Text(text) => encode_blob(&mut out, b'S', text.as_bytes()),
    }
    out
}

fn encode_array(out: &mut Vec<u8>, tag: u8, count: usize, raw: &[u8], compress: bool) {
    out.push(tag);
    out.extend_from_slice(&(count as u32).to_le_bytes());
    if compress {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        let compressed = encoder.finish().unwrap();
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&compressed);
    } else {
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        out.extend_from_slice(raw);
    }
}

fn encode_blob(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Write `root`'s children as a binary document.
pub fn write_binary(root: &Node, compress: bool) -> Vec<u8> {
    write_binary_version(root, TEST_VERSION, compress)
}

/// Write a binary document with an explicit version (7500+ uses wide headers).
pub fn write_binary_version(root: &Node, version: u32, compress: bool) -> Vec<u8> {
    let wide = version >= 7500;
    let mut out = Vec::new();
    out.extend_from_slice(BINARY_PROLOGUE);
    out.extend_from_slice(&[0, 0x1a, 0]);
    out.extend_from_slice(&version.to_le_bytes());
    assert_eq!(out.len(), 27);

    for child in &root.children {
        write_record(&mut out, child, wide, compress);
    }
    write_sentinel(&mut out, wide);
    out
}

fn write_sentinel(out: &mut Vec<u8>, wide: bool) {
    let len = if wide { 25 } else { 13 };
    out.extend(std::iter::repeat(0u8).take(len));
}

fn write_header_field(out: &mut Vec<u8>, at: usize, value: usize, wide: bool) {
    if wide {
        out[at..at + 8].copy_from_slice(&(value as u64).to_le_bytes());
    } else {
        out[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
    }
}

fn write_record(out: &mut Vec<u8>, node: &Node, wide: bool, compress: bool) {
    let field = if wide { 8 } else { 4 };
    let start = out.len();
    out.extend(std::iter::repeat(0u8).take(field * 3));
    out.push(node.name.len() as u8);
    out.extend_from_slice(node.name.as_bytes());

    let properties_start = out.len();
    for property in &node.properties {
        out.extend(encode_property(property, compress));
    }
    let properties_len = out.len() - properties_start;

    for child in &node.children {
        write_record(out, child, wide, compress);
    }
    if !node.children.is_empty() || node.properties.is_empty() {
        write_sentinel(out, wide);
    }

    let end = out.len();
    write_header_field(out, start, end, wide);
    write_header_field(out, start + field, node.properties.len(), wide);
    write_header_field(out, start + field * 2, properties_len, wide);
}

/// Write `root`'s children as a text document.
///
/// Arrays are written as comma-separated scalars.
pub fn write_text(root: &Node) -> String {
    let mut out = String::from("; FBX 6.1.0 project file\n");
    for child in &root.children {
        write_text_node(&mut out, child, 0);
    }
    out
}

fn write_text_node(out: &mut String, node: &Node, depth: usize) {
    let indent = "\t".repeat(depth);
    out.push_str(&indent);
    out.push_str(&node.name);
    out.push_str(": ");

    let values: Vec<String> = node.properties.iter().map(text_value).collect();
    out.push_str(&values.join(", "));

    if node.children.is_empty() {
        out.push('\n');
        return;
    }
    out.push_str(" {\n");
    for child in &node.children {
        write_text_node(out, child, depth + 1);
    }
    out.push_str(&indent);
    out.push_str("}\n");
}

fn text_value(property: &Property) -> String {
    match property {
        Property::String(_) | Property::Raw(_) | Property::Text(_) => {
            let text = property.to_text();
            format!("\"{}\"", text.replace('"', "\\\""))
        }
        other => other.to_text().into_owned(),
    }
}
