//! # Binary Codec
//!
//! Encodes and decodes [`Container`]s in the self-describing Bitswarm value format.
//!
//! ## Wire Format
//! ```text
//! value      := tag(1) body
//! primitive  := big-endian fixed width (1/2/4/8 bytes), IEEE-754 for floats
//! string     := len(2) utf8-bytes
//! array      := count(2) element*           (fixed width, no per-element tag)
//! str-array  := count(2) (len(2) bytes)*
//! list       := count(2) value*
//! map        := count(2) (key-len(2) key-bytes value)*
//! ```
//!
//! ## Safety
//! - Every length and count is checked against the remaining buffer *before* anything is
//!   allocated or indexed
//! - Nesting is capped at [`MAX_DEPTH`]
//! - Failures carry the byte offset of the offending field; decoding never panics
//!
//! Encoding is infallible: containers enforce the wire limits when values are inserted.

use bytes::BufMut;
use std::collections::HashSet;

use crate::core::container::{Container, ValueList, ValueMap, MAX_DEPTH};
use crate::core::value::{Value, ValueKind};
use crate::error::{CodecError, CodecReason};

type DecodeResult<T> = std::result::Result<T, CodecError>;

/// Encode a container, tag byte included.
pub fn encode(container: &Container) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    encode_into(container, &mut out);
    out
}

/// Encode a container into any `BufMut`.
pub fn encode_into<B: BufMut>(container: &Container, out: &mut B) {
    match container {
        Container::List(list) => {
            out.put_u8(ValueKind::List.tag());
            write_list(list, out);
        }
        Container::Map(map) => {
            out.put_u8(ValueKind::Map.tag());
            write_map(map, out);
        }
    }
}

/// Decode one container from the start of `buf`.
///
/// Returns the container and the number of bytes it occupied. Bytes after the container are
/// left for the caller to judge.
pub fn decode(buf: &[u8]) -> DecodeResult<(Container, usize)> {
    let mut reader = Reader::new(buf);
    let container = reader.container()?;
    Ok((container, reader.pos))
}

/// Decode a container that must span the whole buffer.
pub fn decode_exact(buf: &[u8]) -> DecodeResult<Container> {
    let (container, consumed) = decode(buf)?;
    if consumed != buf.len() {
        return Err(CodecError::new(consumed, CodecReason::TrailingBytes));
    }
    Ok(container)
}

// Lengths below are guaranteed to fit in u16 by the container insertion checks.
#[inline]
fn put_len<B: BufMut>(out: &mut B, len: usize) {
    out.put_u16(len as u16);
}

#[inline]
fn put_str<B: BufMut>(out: &mut B, s: &str) {
    put_len(out, s.len());
    out.put_slice(s.as_bytes());
}

fn write_value<B: BufMut>(value: &Value, out: &mut B) {
    out.put_u8(value.kind().tag());
    match value {
        Value::Null => {}
        Value::Bool(b) => out.put_u8(u8::from(*b)),
        Value::Byte(v) => out.put_u8(*v),
        Value::Short(v) => out.put_i16(*v),
        Value::Int(v) => out.put_i32(*v),
        Value::Long(v) => out.put_i64(*v),
        Value::Float(v) => out.put_f32(*v),
        Value::Double(v) => out.put_f64(*v),
        Value::Utf8String(s) => put_str(out, s),
        Value::BoolArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|b| out.put_u8(u8::from(*b)));
        }
        Value::ByteArray(v) => {
            put_len(out, v.len());
            out.put_slice(v);
        }
        Value::ShortArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|x| out.put_i16(*x));
        }
        Value::IntArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|x| out.put_i32(*x));
        }
        Value::LongArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|x| out.put_i64(*x));
        }
        Value::FloatArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|x| out.put_f32(*x));
        }
        Value::DoubleArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|x| out.put_f64(*x));
        }
        Value::Utf8StringArray(v) => {
            put_len(out, v.len());
            v.iter().for_each(|s| put_str(out, s));
        }
        Value::List(list) => write_list(list, out),
        Value::Map(map) => write_map(map, out),
    }
}

fn write_list<B: BufMut>(list: &ValueList, out: &mut B) {
    put_len(out, list.len());
    for value in list {
        write_value(value, out);
    }
}

fn write_map<B: BufMut>(map: &ValueMap, out: &mut B) {
    put_len(out, map.len());
    for (key, value) in map.iter() {
        put_str(out, key);
        write_value(value, out);
    }
}

/// Bounds-checked cursor over the input.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take a fixed-width field; running out here means the buffer ended mid-field.
    #[inline]
    fn fixed<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        if self.remaining() < N {
            return Err(CodecError::new(self.pos, CodecReason::Truncated));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    #[inline]
    fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.fixed::<1>()?[0])
    }

    #[inline]
    fn u16(&mut self) -> DecodeResult<u16> {
        Ok(u16::from_be_bytes(self.fixed()?))
    }

    /// Read a count prefix and verify `count * min_element_size` bytes remain.
    fn count(&mut self, min_element_size: usize) -> DecodeResult<usize> {
        let at = self.pos;
        let count = usize::from(self.u16()?);
        if count * min_element_size > self.remaining() {
            return Err(CodecError::new(at, CodecReason::LengthOverflow));
        }
        Ok(count)
    }

    fn bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CodecError::new(self.pos, CodecReason::LengthOverflow));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn str(&mut self) -> DecodeResult<&'a str> {
        let at = self.pos;
        let len = usize::from(self.u16()?);
        if len > self.remaining() {
            return Err(CodecError::new(at, CodecReason::LengthOverflow));
        }
        let start = self.pos;
        let raw = self.bytes(len)?;
        std::str::from_utf8(raw).map_err(|_| CodecError::new(start, CodecReason::InvalidUtf8))
    }

    fn bool(&mut self) -> DecodeResult<bool> {
        let at = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::new(at, CodecReason::InvalidBool(other))),
        }
    }

    fn container(&mut self) -> DecodeResult<Container> {
        let at = self.pos;
        let tag = self.u8()?;
        match ValueKind::from_tag(tag) {
            Some(ValueKind::List) => Ok(Container::List(self.list(at)?)),
            Some(ValueKind::Map) => Ok(Container::Map(self.map(at)?)),
            Some(_) => Err(CodecError::new(at, CodecReason::UnexpectedTag(tag))),
            None => Err(CodecError::new(at, CodecReason::UnknownTag(tag))),
        }
    }

    fn enter(&mut self, tag_offset: usize) -> DecodeResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CodecError::new(tag_offset, CodecReason::DepthExceeded));
        }
        Ok(())
    }

    fn list(&mut self, tag_offset: usize) -> DecodeResult<ValueList> {
        self.enter(tag_offset)?;
        // every element carries at least its tag byte
        let count = self.count(1)?;
        let mut list = ValueList::with_capacity(count);
        for _ in 0..count {
            let value = self.value()?;
            list.push_decoded(value);
        }
        self.depth -= 1;
        Ok(list)
    }

    fn map(&mut self, tag_offset: usize) -> DecodeResult<ValueMap> {
        self.enter(tag_offset)?;
        // key length (2) + tag (1) per entry at minimum
        let count = self.count(3)?;
        let mut map = ValueMap::new();
        let mut seen: HashSet<&'a str> = HashSet::with_capacity(count);
        for _ in 0..count {
            let key_at = self.pos;
            let key = self.str()?;
            if !seen.insert(key) {
                return Err(CodecError::new(key_at, CodecReason::DuplicateKey));
            }
            let value = self.value()?;
            map.push_decoded(key.to_owned(), value);
        }
        self.depth -= 1;
        Ok(map)
    }

    fn array<T, const N: usize>(&mut self, read: fn([u8; N]) -> T) -> DecodeResult<Vec<T>> {
        let count = self.count(N)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read(self.fixed::<N>()?));
        }
        Ok(out)
    }

    fn value(&mut self) -> DecodeResult<Value> {
        let at = self.pos;
        let tag = self.u8()?;
        let kind =
            ValueKind::from_tag(tag).ok_or(CodecError::new(at, CodecReason::UnknownTag(tag)))?;

        let value = match kind {
            ValueKind::Null => Value::Null,
            ValueKind::Bool => Value::Bool(self.bool()?),
            ValueKind::Byte => Value::Byte(self.u8()?),
            ValueKind::Short => Value::Short(i16::from_be_bytes(self.fixed()?)),
            ValueKind::Int => Value::Int(i32::from_be_bytes(self.fixed()?)),
            ValueKind::Long => Value::Long(i64::from_be_bytes(self.fixed()?)),
            ValueKind::Float => Value::Float(f32::from_be_bytes(self.fixed()?)),
            ValueKind::Double => Value::Double(f64::from_be_bytes(self.fixed()?)),
            ValueKind::Utf8String => Value::Utf8String(self.str()?.to_owned()),
            ValueKind::BoolArray => {
                let count = self.count(1)?;
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    out.push(self.bool()?);
                }
                Value::BoolArray(out)
            }
            ValueKind::ByteArray => {
                let count = self.count(1)?;
                Value::ByteArray(self.bytes(count)?.to_vec())
            }
            ValueKind::ShortArray => Value::ShortArray(self.array(i16::from_be_bytes)?),
            ValueKind::IntArray => Value::IntArray(self.array(i32::from_be_bytes)?),
            ValueKind::LongArray => Value::LongArray(self.array(i64::from_be_bytes)?),
            ValueKind::FloatArray => Value::FloatArray(self.array(f32::from_be_bytes)?),
            ValueKind::DoubleArray => Value::DoubleArray(self.array(f64::from_be_bytes)?),
            ValueKind::Utf8StringArray => {
                // each element carries at least its 2-byte length
                let count = self.count(2)?;
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    out.push(self.str()?.to_owned());
                }
                Value::Utf8StringArray(out)
            }
            ValueKind::List => Value::List(self.list(at)?),
            ValueKind::Map => Value::Map(self.map(at)?),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> ValueMap {
        ValueMap::new()
            .with("name", "p1")
            .unwrap()
            .with("score", 42i32)
            .unwrap()
            .with("tags", vec!["a", "b"])
            .unwrap()
    }

    #[test]
    fn encodes_expected_bytes() {
        let map = ValueMap::new().with("n", 5i16).unwrap();
        let bytes = encode(&map.into());
        assert_eq!(
            bytes,
            vec![0x12, 0x00, 0x01, 0x00, 0x01, b'n', 0x03, 0x00, 0x05]
        );
    }

    #[test]
    fn roundtrip_sample() {
        let container: Container = sample_map().into();
        let bytes = encode(&container);
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, container);
    }

    #[test]
    fn roundtrip_empty_containers() {
        for container in [
            Container::from(ValueList::new()),
            Container::from(ValueMap::new()),
        ] {
            let bytes = encode(&container);
            assert_eq!(bytes.len(), 3);
            assert_eq!(decode_exact(&bytes).unwrap(), container);
        }
    }

    #[test]
    fn roundtrip_boundary_primitives() {
        let list = ValueList::new()
            .with(Value::Null)
            .unwrap()
            .with(u8::MIN)
            .unwrap()
            .with(u8::MAX)
            .unwrap()
            .with(i16::MIN)
            .unwrap()
            .with(i16::MAX)
            .unwrap()
            .with(i32::MIN)
            .unwrap()
            .with(i32::MAX)
            .unwrap()
            .with(i64::MIN)
            .unwrap()
            .with(i64::MAX)
            .unwrap()
            .with(f32::MIN)
            .unwrap()
            .with(f32::MAX)
            .unwrap()
            .with(f64::MIN_POSITIVE)
            .unwrap()
            .with(f64::MAX)
            .unwrap()
            .with("")
            .unwrap()
            .with(Vec::<i64>::new())
            .unwrap()
            .with(Vec::<String>::new())
            .unwrap();
        let container: Container = list.into();
        assert_eq!(decode_exact(&encode(&container)).unwrap(), container);
    }

    #[test]
    fn trailing_bytes_are_left_to_caller() {
        let mut bytes = encode(&sample_map().into());
        let len = bytes.len();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let (_, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, len);
        assert_eq!(
            decode_exact(&bytes).unwrap_err(),
            CodecError::new(len, CodecReason::TrailingBytes)
        );
    }

    #[test]
    fn unknown_tag_cites_offset() {
        // map with one entry "k" whose tag is 0x7F
        let bytes = [0x12, 0x00, 0x01, 0x00, 0x01, b'k', 0x7F];
        assert_eq!(
            decode(&bytes).unwrap_err(),
            CodecError::new(6, CodecReason::UnknownTag(0x7F))
        );
    }

    #[test]
    fn primitive_at_top_level_is_rejected() {
        let bytes = [0x04, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(
            decode(&bytes).unwrap_err(),
            CodecError::new(0, CodecReason::UnexpectedTag(0x04))
        );
    }

    #[test]
    fn string_length_beyond_buffer() {
        // list with one string claiming 500 bytes but carrying 2
        let bytes = [0x11, 0x00, 0x01, 0x08, 0x01, 0xF4, b'h', b'i'];
        assert_eq!(
            decode(&bytes).unwrap_err(),
            CodecError::new(4, CodecReason::LengthOverflow)
        );
    }

    #[test]
    fn array_count_beyond_buffer() {
        // int array claiming 0xFFFF elements
        let bytes = [0x11, 0x00, 0x01, 0x0C, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(
            decode(&bytes).unwrap_err(),
            CodecError::new(4, CodecReason::LengthOverflow)
        );
    }

    #[test]
    fn duplicate_key_rejected() {
        let bytes = [
            0x12, 0x00, 0x02, //
            0x00, 0x01, b'k', 0x00, //
            0x00, 0x01, b'k', 0x00,
        ];
        assert_eq!(
            decode(&bytes).unwrap_err(),
            CodecError::new(7, CodecReason::DuplicateKey)
        );
    }

    #[test]
    fn invalid_bool_and_utf8() {
        let bad_bool = [0x11, 0x00, 0x01, 0x01, 0x02];
        assert_eq!(
            decode(&bad_bool).unwrap_err().reason,
            CodecReason::InvalidBool(2)
        );

        let bad_utf8 = [0x11, 0x00, 0x01, 0x08, 0x00, 0x02, 0xC3, 0x28];
        assert_eq!(
            decode(&bad_utf8).unwrap_err(),
            CodecError::new(6, CodecReason::InvalidUtf8)
        );
    }

    #[test]
    fn nesting_beyond_max_depth_rejected() {
        // MAX_DEPTH + 1 nested single-element lists
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DEPTH {
            bytes.extend_from_slice(&[0x11, 0x00, 0x01]);
        }
        bytes.push(0x00);
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.reason, CodecReason::DepthExceeded);
        assert_eq!(err.offset, MAX_DEPTH * 3);
    }

    #[test]
    fn every_truncation_fails() {
        let bytes = encode(&sample_map().into());
        for cut in 0..bytes.len() {
            assert!(decode(&bytes[..cut]).is_err(), "prefix of {cut} bytes decoded");
        }
    }
}
