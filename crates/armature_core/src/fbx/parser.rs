//! Container parser for both FBX wire variants.
//!
//! A buffer that starts with the binary prologue is read as little-endian
//! records; anything else goes to the text tokenizer in [`super::text`].
//! Both paths produce the same [`Node`] tree shape.
//!
//! # Binary layout
//!
//! - 27 byte header: `"Kaydara FBX Binary  \0"`, two magic bytes, u32 version
//! - records: end offset, property count, property list length, u8 name
//!   length, name, properties, children
//! - a record with an end offset below 40 or an empty name closes its level

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use super::codec::read_property;
use super::text::parse_text;
use super::types::Node;

/// Leading bytes of a binary document (followed by a NUL).
pub const BINARY_PROLOGUE: &[u8] = b"Kaydara FBX Binary  ";

/// Bytes before the first top-level record.
const HEADER_SIZE: usize = 27;

/// Byte offset of the u32 file version inside the header.
const VERSION_OFFSET: usize = 23;

/// Records whose end offset is below this are null sentinels.
const MIN_VALID_OFFSET: u64 = 40;

/// First version whose record headers use 64-bit fields.
const WIDE_HEADER_VERSION: u32 = 7500;

/// Structural errors that abort a parse.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unknown property type {:?} at offset {offset}", tag_char(.tag))]
    UnknownPropertyType { tag: u8, offset: u64 },

    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: u64 },

    #[error("record at offset {offset} ends at {end_offset}, past the end of the {len} byte buffer")]
    RecordOutOfBounds { offset: u64, end_offset: u64, len: u64 },

    #[error("failed to inflate array at offset {offset}: {source}")]
    Inflate {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("array at offset {offset} inflated to {actual} bytes, expected {expected}")]
    ShortArray { offset: u64, expected: usize, actual: usize },

    #[error("array at offset {offset} declares {count} elements of {element_size} bytes, more than the input holds")]
    ArrayTooLarge { offset: u64, count: u64, element_size: usize },
}

fn tag_char(tag: &u8) -> char {
    char::from(*tag)
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// True when `data` carries the binary prologue.
pub fn is_binary(data: &[u8]) -> bool {
    data.starts_with(BINARY_PROLOGUE)
}

/// Parse a complete document into a synthetic root node.
///
/// The root has an empty name; its children are the top-level records.
pub fn parse_fbx(data: &[u8]) -> ParseResult<Node> {
    if is_binary(data) {
        parse_binary(data)
    } else {
        Ok(parse_text(data))
    }
}

struct RecordHeader {
    name: String,
    property_count: u64,
    end_offset: u64,
}

fn parse_binary(data: &[u8]) -> ParseResult<Node> {
    if data.len() < HEADER_SIZE {
        return Err(ParseError::UnexpectedEof {
            offset: data.len() as u64,
        });
    }
    let mut cursor = Cursor::new(data);
    cursor.set_position(VERSION_OFFSET as u64);
    let version = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| ParseError::UnexpectedEof {
            offset: VERSION_OFFSET as u64,
        })?;
    log::debug!("Parsing binary FBX version {}", version);

    let wide = version >= WIDE_HEADER_VERSION;
    let header_len: u64 = if wide { 25 } else { 13 };
    let len = data.len() as u64;
    cursor.set_position(HEADER_SIZE as u64);

    let mut root = Node::default();
    // Open records whose children are still being read
    let mut stack: Vec<(Node, u64)> = Vec::new();

    loop {
        let position = cursor.position();
        let open_end = stack.last().map(|(_, end_offset)| *end_offset);
        match open_end {
            Some(end_offset) if position >= end_offset => {
                close_record(&mut stack, &mut root);
                continue;
            }
            None if position + header_len > len => break,
            _ => {}
        }

        let Some(header) = read_record_header(&mut cursor, wide)? else {
            if stack.is_empty() {
                break;
            }
            close_record(&mut stack, &mut root);
            continue;
        };

        if header.end_offset > len {
            return Err(ParseError::RecordOutOfBounds {
                offset: position,
                end_offset: header.end_offset,
                len,
            });
        }

        let mut node = Node::new(header.name);
        for _ in 0..header.property_count {
            node.properties.push(read_property(&mut cursor)?);
        }

        if cursor.position() < header.end_offset {
            stack.push((node, header.end_offset));
        } else {
            attach(&mut stack, &mut root, node);
        }
    }

    while !stack.is_empty() {
        close_record(&mut stack, &mut root);
    }
    Ok(root)
}

/// Read a record header, returning `None` for the null sentinel.
fn read_record_header(cursor: &mut Cursor<&[u8]>, wide: bool) -> ParseResult<Option<RecordHeader>> {
    let offset = cursor.position();
    let eof = |_: std::io::Error| ParseError::UnexpectedEof { offset };

    let (end_offset, property_count) = if wide {
        let end_offset = cursor.read_u64::<LittleEndian>().map_err(eof)?;
        let property_count = cursor.read_u64::<LittleEndian>().map_err(eof)?;
        let _property_list_len = cursor.read_u64::<LittleEndian>().map_err(eof)?;
        (end_offset, property_count)
    } else {
        let end_offset = cursor.read_u32::<LittleEndian>().map_err(eof)?;
        let property_count = cursor.read_u32::<LittleEndian>().map_err(eof)?;
        let _property_list_len = cursor.read_u32::<LittleEndian>().map_err(eof)?;
        (u64::from(end_offset), u64::from(property_count))
    };
    let name_len = cursor.read_u8().map_err(eof)?;

    if end_offset < MIN_VALID_OFFSET || name_len == 0 {
        return Ok(None);
    }

    let start = cursor.position() as usize;
    let end = start + usize::from(name_len);
    let data: &[u8] = *cursor.get_ref();
    let name = data
        .get(start..end)
        .ok_or(ParseError::UnexpectedEof { offset: start as u64 })?;
    cursor.set_position(end as u64);

    Ok(Some(RecordHeader {
        name: String::from_utf8_lossy(name).into_owned(),
        property_count,
        end_offset,
    }))
}

fn attach(stack: &mut [(Node, u64)], root: &mut Node, node: Node) {
    match stack.last_mut() {
        Some((parent, _)) => parent.children.push(node),
        None => root.children.push(node),
    }
}

fn close_record(stack: &mut Vec<(Node, u64)>, root: &mut Node) {
    if let Some((node, _)) = stack.pop() {
        attach(stack, root, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fbx::test_support::{write_binary, write_binary_version, write_text};
    use crate::fbx::types::Property;

    fn sample_document() -> Node {
        let mut root = Node::default();

        let mut header = Node::new("FBXHeaderExtension");
        let mut version = Node::new("FBXVersion");
        version.properties.push(Property::I32(7300));
        header.children.push(version);
        root.children.push(header);

        let mut objects = Node::new("Objects");
        let mut model = Node::new("Model");
        model.properties.push(Property::I64(1001));
        model.properties.push(Property::String(b"Hips".to_vec()));
        model.properties.push(Property::String(b"LimbNode".to_vec()));
        let mut props = Node::new("Properties70");
        let mut p = Node::new("P");
        p.properties.push(Property::String(b"Lcl Translation".to_vec()));
        p.properties.push(Property::String(b"Lcl Translation".to_vec()));
        p.properties.push(Property::String(b"".to_vec()));
        p.properties.push(Property::String(b"A".to_vec()));
        p.properties.push(Property::F64(1.5));
        p.properties.push(Property::F64(-2.0));
        p.properties.push(Property::F64(0.25));
        props.children.push(p);
        model.children.push(props);
        objects.children.push(model);
        root.children.push(objects);
        root
    }

    fn assert_same_structure(binary: &Node, text: &Node) {
        assert_eq!(binary.name, text.name);
        assert_eq!(binary.properties.len(), text.properties.len(), "properties of {}", binary.name);
        for (b, t) in binary.properties.iter().zip(&text.properties) {
            assert_eq!(b.to_text(), t.to_text());
            assert!(matches!(t, Property::Text(_)));
        }
        assert_eq!(binary.children.len(), text.children.len(), "children of {}", binary.name);
        for (b, t) in binary.children.iter().zip(&text.children) {
            assert_same_structure(b, t);
        }
    }

    #[test]
    fn test_binary_round_trip() {
        let document = sample_document();
        let parsed = parse_fbx(&write_binary(&document, false)).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn test_wide_headers() {
        let document = sample_document();
        let parsed = parse_fbx(&write_binary_version(&document, 7500, true)).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn test_binary_and_text_agree() {
        let document = sample_document();
        let binary = parse_fbx(&write_binary(&document, false)).unwrap();
        let text = parse_fbx(write_text(&document).as_bytes()).unwrap();
        assert_same_structure(&binary, &text);

        // the text path loses the property types
        let p = &text.children[1].children[0].children[0].children[0];
        assert_eq!(p.properties[4], Property::Text("1.5".into()));
        assert_ne!(p.properties[4], binary.children[1].children[0].children[0].children[0].properties[4]);
    }

    #[test]
    fn test_record_out_of_bounds() {
        let mut bytes = write_binary(&sample_document(), false);
        // first record's end offset points past the buffer
        let bogus = (bytes.len() as u32 + 100).to_le_bytes();
        bytes[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&bogus);
        match parse_fbx(&bytes) {
            Err(ParseError::RecordOutOfBounds { offset, .. }) => assert_eq!(offset, HEADER_SIZE as u64),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_document() {
        let bytes = write_binary(&sample_document(), false);
        // cut inside the Properties70 payload
        let cut = &bytes[..bytes.len() - 40];
        assert!(parse_fbx(cut).is_err());
    }

    #[test]
    fn test_unknown_property_tag_is_fatal() {
        let mut root = Node::default();
        let mut node = Node::new("Bad");
        node.properties.push(Property::I32(5));
        root.children.push(node);
        let mut bytes = write_binary(&root, false);
        // header (13) + name (3) puts the tag right after the name
        let tag_offset = HEADER_SIZE + 13 + 3;
        assert_eq!(bytes[tag_offset], b'I');
        bytes[tag_offset] = b'Q';
        match parse_fbx(&bytes) {
            Err(ParseError::UnknownPropertyType { tag, offset }) => {
                assert_eq!(tag, b'Q');
                assert_eq!(offset, tag_offset as u64);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let mut node = Node::new("Leaf");
        node.properties.push(Property::I32(1));
        for _ in 0..2_000 {
            let mut parent = Node::new("N");
            parent.children.push(node);
            node = parent;
        }
        let mut root = Node::default();
        root.children.push(node);
        let bytes = write_binary(&root, false);
        let parsed = parse_fbx(&bytes).unwrap();
        let mut depth = 0;
        let mut current = &parsed.children[0];
        while let Some(child) = current.children.first() {
            current = child;
            depth += 1;
        }
        assert_eq!(depth, 2_000);
        assert_eq!(current.name, "Leaf");
    }
}
