//! Decoding of single typed property values from the binary variant.
//!
//! Every property starts with a one-byte type tag. Scalars follow directly;
//! arrays carry a `(count, encoding, byte length)` header and may be a zlib
//! stream; strings and blobs carry a 32-bit length.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use super::parser::{ParseError, ParseResult};
use super::types::Property;

/// Array encoding value marking a zlib-compressed payload.
const ENCODING_ZLIB: u32 = 1;

/// Decode one property at the reader's position.
pub fn read_property(reader: &mut Cursor<&[u8]>) -> ParseResult<Property> {
    let offset = reader.position();
    let tag = reader.read_u8().map_err(|_| ParseError::UnexpectedEof { offset })?;

    let property = match tag {
        b'Y' => Property::I16(scalar(reader, |r| r.read_i16::<LittleEndian>())?),
        b'C' => Property::Bool(scalar(reader, |r| r.read_u8())? != 0),
        b'I' => Property::I32(scalar(reader, |r| r.read_i32::<LittleEndian>())?),
        b'F' => Property::F32(scalar(reader, |r| r.read_f32::<LittleEndian>())?),
        b'D' => Property::F64(scalar(reader, |r| r.read_f64::<LittleEndian>())?),
        b'L' => Property::I64(scalar(reader, |r| r.read_i64::<LittleEndian>())?),
        b'f' => Property::F32Array(read_array(reader, 4, |r| r.read_f32::<LittleEndian>())?),
        b'd' => Property::F64Array(read_array(reader, 8, |r| r.read_f64::<LittleEndian>())?),
        b'l' => Property::I64Array(read_array(reader, 8, |r| r.read_i64::<LittleEndian>())?),
        b'i' => Property::I32Array(read_array(reader, 4, |r| r.read_i32::<LittleEndian>())?),
        b'b' => Property::BoolArray(read_array(reader, 1, |r| r.read_u8().map(|v| v != 0))?),
        b'S' => Property::String(read_blob(reader)?),
        b'R' => Property::Raw(read_blob(reader)?),
        other => return Err(ParseError::UnknownPropertyType { tag: other, offset }),
    };
    Ok(property)
}

fn scalar<T>(
    reader: &mut Cursor<&[u8]>,
    read: impl FnOnce(&mut Cursor<&[u8]>) -> io::Result<T>,
) -> ParseResult<T> {
    let offset = reader.position();
    read(reader).map_err(|_| ParseError::UnexpectedEof { offset })
}

fn remaining(reader: &Cursor<&[u8]>) -> u64 {
    (reader.get_ref().len() as u64).saturating_sub(reader.position())
}

/// Take `len` bytes from the reader as a slice of the underlying buffer.
fn take_slice<'a>(reader: &mut Cursor<&'a [u8]>, len: u64) -> ParseResult<&'a [u8]> {
    let offset = reader.position();
    if len > remaining(reader) {
        return Err(ParseError::UnexpectedEof { offset });
    }
    let data: &'a [u8] = *reader.get_ref();
    let start = offset as usize;
    let end = start + len as usize;
    reader.set_position(end as u64);
    Ok(&data[start..end])
}

fn read_blob(reader: &mut Cursor<&[u8]>) -> ParseResult<Vec<u8>> {
    let len = scalar(reader, |r| r.read_u32::<LittleEndian>())?;
    Ok(take_slice(reader, u64::from(len))?.to_vec())
}

fn read_array<T>(
    reader: &mut Cursor<&[u8]>,
    element_size: usize,
    read: impl Fn(&mut Cursor<&[u8]>) -> io::Result<T>,
) -> ParseResult<Vec<T>> {
    let offset = reader.position();
    let count = scalar(reader, |r| r.read_u32::<LittleEndian>())?;
    let encoding = scalar(reader, |r| r.read_u32::<LittleEndian>())?;
    let stored_len = scalar(reader, |r| r.read_u32::<LittleEndian>())?;

    let expected = (count as usize)
        .checked_mul(element_size)
        .ok_or(ParseError::ArrayTooLarge {
            offset,
            count: u64::from(count),
            element_size,
        })?;

    if encoding == ENCODING_ZLIB {
        let compressed = take_slice(reader, u64::from(stored_len))?;
        let mut inflated = Vec::new();
        ZlibDecoder::new(compressed)
            .take(expected as u64)
            .read_to_end(&mut inflated)
            .map_err(|source| ParseError::Inflate { offset, source })?;
        if inflated.len() < expected {
            return Err(ParseError::ShortArray {
                offset,
                expected,
                actual: inflated.len(),
            });
        }
        decode_elements(&inflated, count as usize, &read)
    } else {
        if expected as u64 > remaining(reader) {
            return Err(ParseError::ArrayTooLarge {
                offset,
                count: u64::from(count),
                element_size,
            });
        }
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(scalar(reader, &read)?);
        }
        Ok(values)
    }
}

fn decode_elements<T>(
    bytes: &[u8],
    count: usize,
    read: &impl Fn(&mut Cursor<&[u8]>) -> io::Result<T>,
) -> ParseResult<Vec<T>> {
    let mut cursor = Cursor::new(bytes);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(scalar(&mut cursor, read)?);
    }
    Ok(values)
}
