//! Protobuf wire format, kept at the record level.
//!
//! A message is split into its top-level records without interpreting them,
//! so any record that is not touched can be written back byte for byte.

use crate::error::{ApexError, Result};

const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    fn from_tag(tag: u64, offset: usize) -> Result<WireType> {
        match tag & 0x7 {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            3 | 4 => Err(parse_error(offset, "groups are not supported")),
            other => Err(parse_error(offset, &format!("invalid wire type {}", other))),
        }
    }
}

fn parse_error(offset: usize, reason: &str) -> ApexError {
    ApexError::ManifestParse(format!("{} at offset {}", reason, offset))
}

/// One encoded record: tag, optional length prefix and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub number: u32,
    pub wire_type: WireType,
    raw: &'a [u8],
    value_start: usize,
}

impl<'a> Field<'a> {
    /// The whole record as it appeared in the input.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Value bytes; for length-delimited records the length prefix is skipped.
    pub fn value(&self) -> &'a [u8] {
        &self.raw[self.value_start..]
    }

    pub fn as_varint(&self) -> Option<u64> {
        if self.wire_type != WireType::Varint {
            return None;
        }
        let mut pos = 0;
        read_varint(self.value(), &mut pos).ok()
    }

    pub fn as_fixed64(&self) -> Option<u64> {
        match self.wire_type {
            WireType::Fixed64 => Some(u64::from_le_bytes(self.value().try_into().ok()?)),
            _ => None,
        }
    }

    pub fn as_fixed32(&self) -> Option<u32> {
        match self.wire_type {
            WireType::Fixed32 => Some(u32::from_le_bytes(self.value().try_into().ok()?)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message<'a> {
    fields: Vec<Field<'a>>,
}

impl<'a> Message<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Message<'a>> {
        let mut fields = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let start = pos;
            let tag = read_varint(data, &mut pos)?;
            let number = tag >> 3;
            if number == 0 || number > MAX_FIELD_NUMBER {
                return Err(parse_error(start, "invalid field number"));
            }
            let wire_type = WireType::from_tag(tag, start)?;
            let value_len = match wire_type {
                WireType::Varint => {
                    let mut probe = pos;
                    read_varint(data, &mut probe)?;
                    probe - pos
                }
                WireType::Fixed64 => 8,
                WireType::Fixed32 => 4,
                WireType::LengthDelimited => {
                    let len = read_varint(data, &mut pos)?;
                    usize::try_from(len).map_err(|_| parse_error(start, "length overflow"))?
                }
            };
            let value_start = pos;
            let end = value_start.checked_add(value_len)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| parse_error(start, "field runs past end of message"))?;
            fields.push(Field {
                number: number as u32,
                wire_type,
                raw: &data[start..end],
                value_start: value_start - start,
            });
            pos = end;
        }
        Ok(Message { fields })
    }

    pub fn fields(&self) -> &[Field<'a>] {
        &self.fields
    }

    pub fn get_all(&self, number: u32) -> impl Iterator<Item = &Field<'a>> {
        self.fields.iter().filter(move |f| f.number == number)
    }

    /// Last occurrence wins, as for protobuf scalar fields.
    pub fn get(&self, number: u32) -> Option<&Field<'a>> {
        self.get_all(number).last()
    }

    pub fn contains(&self, number: u32) -> bool {
        self.fields.iter().any(|f| f.number == number)
    }

    /// Re-emits the message without any `number` records. Other records keep
    /// their exact encoding and order.
    pub fn without(&self, number: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for field in self.fields.iter().filter(|f| f.number != number) {
            out.extend_from_slice(field.raw);
        }
        out
    }

    /// Replaces every `number` record with the single encoded `record`, placed
    /// where a canonical serializer would put it: before the first record with
    /// a higher field number.
    pub fn with_replaced(&self, number: u32, record: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut inserted = false;
        for field in &self.fields {
            if field.number == number {
                continue;
            }
            if !inserted && field.number > number {
                out.extend_from_slice(record);
                inserted = true;
            }
            out.extend_from_slice(field.raw);
        }
        if !inserted {
            out.extend_from_slice(record);
        }
        out
    }
}

pub fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let start = *pos;
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        let byte = *data.get(*pos).ok_or_else(|| parse_error(start, "truncated varint"))?;
        *pos += 1;
        if shift == 63 && byte > 1 {
            return Err(parse_error(start, "varint overflow"));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(parse_error(start, "varint too long"))
}

pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn encode_len_field(number: u32, payload: &[u8], out: &mut Vec<u8>) {
    encode_varint(((number as u64) << 3) | WireType::LengthDelimited as u64, out);
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint() {
        let mut buf = Vec::new();
        encode_varint(300, &mut buf);
        assert_eq!(buf, [0xac, 0x02]);
        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);

        let mut pos = 0;
        assert!(read_varint(&[0x80, 0x80], &mut pos).is_err());
        let mut pos = 0;
        let too_big = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert!(read_varint(&too_big, &mut pos).is_err());
    }

    #[test]
    fn test_parse_keeps_raw_records() {
        // 1: "ab", 2: 150, 3: fixed32 7
        let data = [0x0a, 0x02, b'a', b'b', 0x10, 0x96, 0x01, 0x1d, 7, 0, 0, 0];
        let msg = Message::parse(&data).unwrap();
        assert_eq!(msg.fields().len(), 3);
        assert_eq!(msg.get(1).unwrap().value(), b"ab");
        assert_eq!(msg.get(2).unwrap().as_varint(), Some(150));
        assert_eq!(msg.get(3).unwrap().as_fixed32(), Some(7));
        assert_eq!(msg.get(2).unwrap().raw(), &[0x10, 0x96, 0x01]);
        assert_eq!(msg.without(99), data);
    }

    #[test]
    fn test_replace_inserts_in_field_order() {
        let data = [0x08, 0x01, 0x18, 0x03];
        let msg = Message::parse(&data).unwrap();
        let mut record = Vec::new();
        encode_len_field(2, b"x", &mut record);
        assert_eq!(msg.with_replaced(2, &record), [0x08, 0x01, 0x12, 0x01, b'x', 0x18, 0x03]);
        assert_eq!(msg.with_replaced(9, &[0x48, 0x00]), [0x08, 0x01, 0x18, 0x03, 0x48, 0x00]);
    }

    #[test]
    fn test_rejects_malformed() {
        // length past end
        assert!(Message::parse(&[0x0a, 0x05, b'a']).is_err());
        // field number zero
        assert!(Message::parse(&[0x00, 0x01]).is_err());
        // start group
        assert!(Message::parse(&[0x0b]).is_err());
        // wire type 7
        assert!(Message::parse(&[0x0f]).is_err());
        assert!(matches!(Message::parse(&[0x0a]), Err(ApexError::ManifestParse(_))));
    }
}
