//! Protobuf wire primitives.
//!
//! Tiles are read and written field by field instead of through generated
//! message types, because the field numbers depend on the [`super::Dialect`].
//! Varints and keys go through `prost::encoding`; every read is bounds checked
//! and reports truncation as an error.

use std::ops::Range;

use bytes::{Buf, BufMut};
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, encoded_len_varint, WireType};

use super::proto::{
    VALUE_BOOL, VALUE_DOUBLE, VALUE_FLOAT, VALUE_INT, VALUE_SINT, VALUE_STRING, VALUE_UINT,
};
use super::PropertyValue;
use crate::{Error, Result};

/// Sequential reader over one encoded message.
pub(crate) struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_key(&mut self) -> Result<(u32, WireType)> {
        let mut buf = self.rest();
        let key = decode_key(&mut buf)?;
        self.pos = self.data.len() - buf.len();
        Ok(key)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut buf = self.rest();
        let value = decode_varint(&mut buf)?;
        self.pos = self.data.len() - buf.len();
        Ok(value)
    }

    /// Read a length-delimited payload, returning its byte range in the message.
    pub fn read_bytes(&mut self) -> Result<Range<usize>> {
        let len = self.read_varint()? as usize;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::Decode(format!(
                    "length-delimited field of {} bytes at offset {} overruns buffer of {}",
                    len,
                    start,
                    self.data.len()
                ))
            })?;
        self.pos = end;
        Ok(start..end)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let range = self.read_bytes()?;
        String::from_utf8(self.data[range].to_vec())
            .map_err(|e| Error::Decode(format!("invalid UTF-8 string: {}", e)))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(Error::Decode(format!(
                "truncated fixed-width field at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut slice = self.take(4)?;
        Ok(slice.get_u32_le())
    }

    pub fn read_fixed64(&mut self) -> Result<u64> {
        let mut slice = self.take(8)?;
        Ok(slice.get_u64_le())
    }

    /// Skip a field of unknown number. Groups are not part of the tile schema.
    pub fn skip(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => self.read_varint().map(|_| ()),
            WireType::SixtyFourBit => self.take(8).map(|_| ()),
            WireType::ThirtyTwoBit => self.take(4).map(|_| ()),
            WireType::LengthDelimited => self.read_bytes().map(|_| ()),
            WireType::StartGroup | WireType::EndGroup => Err(Error::Decode(
                "group wire type is not supported".to_string(),
            )),
        }
    }

    /// Read a packed repeated uint32 field.
    pub fn read_packed_u32(&mut self) -> Result<Vec<u32>> {
        let range = self.read_bytes()?;
        decode_packed_u32(&self.data[range])
    }
}

/// Decode the payload of a packed repeated uint32 field.
pub(crate) fn decode_packed_u32(mut buf: &[u8]) -> Result<Vec<u32>> {
    let mut values = Vec::with_capacity(buf.len());
    while buf.has_remaining() {
        let value = decode_varint(&mut buf)?;
        let value = u32::try_from(value)
            .map_err(|_| Error::Decode(format!("packed value {} exceeds u32", value)))?;
        values.push(value);
    }
    Ok(values)
}

/// Check a field's wire type, so that a field read with the wrong dialect fails
/// instead of being misinterpreted.
pub(crate) fn expect_wire_type(field: u32, actual: WireType, expected: WireType) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Decode(format!(
            "field {} has wire type {:?}, expected {:?}",
            field, actual, expected
        )))
    }
}

// ----------------------------------------------------------------------------
// Writing
// ----------------------------------------------------------------------------

pub(crate) fn write_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    encode_key(field, WireType::Varint, buf);
    encode_varint(value, buf);
}

pub(crate) fn write_len_delimited(buf: &mut Vec<u8>, field: u32, payload: &[u8]) {
    encode_key(field, WireType::LengthDelimited, buf);
    encode_varint(payload.len() as u64, buf);
    buf.put_slice(payload);
}

pub(crate) fn write_packed_u32(buf: &mut Vec<u8>, field: u32, values: &[u32]) {
    let len: usize = values.iter().map(|v| encoded_len_varint(*v as u64)).sum();
    encode_key(field, WireType::LengthDelimited, buf);
    encode_varint(len as u64, buf);
    for v in values {
        encode_varint(*v as u64, buf);
    }
}

#[inline]
fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Write one entry of a layer's value table as a nested message under `field`.
pub(crate) fn write_value(buf: &mut Vec<u8>, field: u32, value: &PropertyValue) {
    let mut msg = Vec::with_capacity(16);
    match value {
        PropertyValue::String(s) => write_len_delimited(&mut msg, VALUE_STRING, s.as_bytes()),
        PropertyValue::Float(f) => {
            encode_key(VALUE_FLOAT, WireType::ThirtyTwoBit, &mut msg);
            msg.put_f32_le(*f);
        }
        PropertyValue::Double(d) => {
            encode_key(VALUE_DOUBLE, WireType::SixtyFourBit, &mut msg);
            msg.put_f64_le(*d);
        }
        PropertyValue::Int(i) => write_varint_field(&mut msg, VALUE_INT, *i as u64),
        PropertyValue::UInt(u) => write_varint_field(&mut msg, VALUE_UINT, *u),
        PropertyValue::SInt(i) => write_varint_field(&mut msg, VALUE_SINT, zigzag_encode64(*i)),
        PropertyValue::Bool(b) => write_varint_field(&mut msg, VALUE_BOOL, *b as u64),
    }
    write_len_delimited(buf, field, &msg);
}

/// Parse a value message. The last recognised field wins.
pub(crate) fn read_value(data: &[u8]) -> Result<PropertyValue> {
    let mut reader = WireReader::new(data);
    let mut value = None;
    while reader.has_remaining() {
        let (field, wire_type) = reader.read_key()?;
        value = Some(match (field, wire_type) {
            (VALUE_STRING, WireType::LengthDelimited) => {
                PropertyValue::String(reader.read_string()?)
            }
            (VALUE_FLOAT, WireType::ThirtyTwoBit) => {
                PropertyValue::Float(f32::from_bits(reader.read_fixed32()?))
            }
            (VALUE_DOUBLE, WireType::SixtyFourBit) => {
                PropertyValue::Double(f64::from_bits(reader.read_fixed64()?))
            }
            (VALUE_INT, WireType::Varint) => PropertyValue::Int(reader.read_varint()? as i64),
            (VALUE_UINT, WireType::Varint) => PropertyValue::UInt(reader.read_varint()?),
            (VALUE_SINT, WireType::Varint) => {
                PropertyValue::SInt(zigzag_decode64(reader.read_varint()?))
            }
            (VALUE_BOOL, WireType::Varint) => PropertyValue::Bool(reader.read_varint()? != 0),
            (_, wire_type) => {
                reader.skip(wire_type)?;
                continue;
            }
        });
    }
    value.ok_or_else(|| Error::Decode("value message has no recognised field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_value(value: PropertyValue) -> Vec<u8> {
        let mut buf = Vec::new();
        write_value(&mut buf, 4, &value);
        buf
    }

    // ------------------------------------------------------------------------
    // Value encoding
    // ------------------------------------------------------------------------

    #[test]
    fn test_write_string_value() {
        assert_eq!(
            encoded_value(PropertyValue::from("string")),
            vec![0x22, 0x08, 0x0a, 0x06, 0x73, 0x74, 0x72, 0x69, 0x6e, 0x67]
        );
    }

    #[test]
    fn test_write_float_value() {
        assert_eq!(
            encoded_value(PropertyValue::Float(100.23)),
            vec![0x22, 0x05, 0x15, 0xc3, 0x75, 0xc8, 0x42]
        );
    }

    #[test]
    fn test_write_double_value() {
        assert_eq!(
            encoded_value(PropertyValue::Double(100.23)),
            vec![0x22, 0x09, 0x19, 0x1f, 0x85, 0xeb, 0x51, 0xb8, 0x0e, 0x59, 0x40]
        );
    }

    #[test]
    fn test_write_int_value() {
        assert_eq!(
            encoded_value(PropertyValue::Int(10201203912)),
            vec![0x22, 0x06, 0x20, 0xc8, 0x89, 0xa8, 0x80, 0x26]
        );
    }

    #[test]
    fn test_write_bool_value() {
        assert_eq!(
            encoded_value(PropertyValue::Bool(true)),
            vec![0x22, 0x02, 0x38, 0x01]
        );
    }

    #[test]
    fn test_read_value_back() {
        for value in [
            PropertyValue::from("string"),
            PropertyValue::Float(100.23),
            PropertyValue::Double(-0.5),
            PropertyValue::Int(-7),
            PropertyValue::UInt(u64::MAX),
            PropertyValue::SInt(-123456),
            PropertyValue::Bool(false),
        ] {
            let buf = encoded_value(value.clone());
            // Skip the key and the one-byte length prefix.
            assert_eq!(read_value(&buf[2..]).unwrap(), value);
        }
    }

    #[test]
    fn test_read_empty_value_fails() {
        assert!(matches!(read_value(&[]), Err(Error::Decode(_))));
    }

    // ------------------------------------------------------------------------
    // Varint and packed fields
    // ------------------------------------------------------------------------

    #[test]
    fn test_varint_232() {
        let mut buf = Vec::new();
        encode_varint(232, &mut buf);
        assert_eq!(buf, vec![0xe8, 0x01]);
        assert_eq!(WireReader::new(&buf).read_varint().unwrap(), 232);
    }

    #[test]
    fn test_packed_u32() {
        let mut buf = Vec::new();
        write_packed_u32(&mut buf, 2, &[10, 400, 500, 600, 700]);
        assert_eq!(
            &buf[1..],
            &[0x09, 0x0a, 0x90, 0x03, 0xf4, 0x03, 0xd8, 0x04, 0xbc, 0x05]
        );

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_key().unwrap(), (2, WireType::LengthDelimited));
        assert_eq!(reader.read_packed_u32().unwrap(), vec![10, 400, 500, 600, 700]);
        assert!(!reader.has_remaining());
    }

    // ------------------------------------------------------------------------
    // Malformed input
    // ------------------------------------------------------------------------

    #[test]
    fn test_truncated_length_delimited() {
        let data = [0x0a, 0x10, 0x61];
        let mut reader = WireReader::new(&data);
        reader.read_key().unwrap();
        assert!(matches!(reader.read_bytes(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = WireReader::new(&[0x80, 0x80]);
        assert!(matches!(reader.read_varint(), Err(Error::Protobuf(_))));
    }

    #[test]
    fn test_packed_value_above_u32_is_an_error() {
        let mut payload = Vec::new();
        encode_varint((1u64 << 32) + 9, &mut payload);
        let mut buf = Vec::new();
        write_len_delimited(&mut buf, 2, &payload);

        let mut reader = WireReader::new(&buf);
        assert_eq!(reader.read_key().unwrap(), (2, WireType::LengthDelimited));
        assert!(matches!(reader.read_packed_u32(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_skip_unknown_fields() {
        let mut buf = Vec::new();
        write_varint_field(&mut buf, 9, 300);
        write_len_delimited(&mut buf, 10, b"abc");
        encode_key(11, WireType::ThirtyTwoBit, &mut buf);
        buf.put_u32_le(1);
        encode_key(12, WireType::SixtyFourBit, &mut buf);
        buf.put_u64_le(1);

        let mut reader = WireReader::new(&buf);
        while reader.has_remaining() {
            let (_, wire_type) = reader.read_key().unwrap();
            reader.skip(wire_type).unwrap();
        }
        assert_eq!(reader.position(), buf.len());
    }

    #[test]
    fn test_truncated_fixed() {
        let mut reader = WireReader::new(&[0x01, 0x02]);
        assert!(reader.read_fixed32().is_err());
        assert!(reader.skip(WireType::SixtyFourBit).is_err());
    }
}
