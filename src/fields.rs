//! Typed codecs for APDU positional fields and bitmap payloads.
//!
//! Every codec parses from the front of a byte slice, returning the decoded
//! [`Value`] and the unconsumed rest, and serializes a [`Value`] back to the
//! exact wire form. Packet schemas and the TLV dictionaries are built from
//! these.

use byteorder::ByteOrder;

use crate::charset::{self, CharacterSet};
use crate::context;
use crate::errors::{Error, Result};
use crate::tlv::Tlv;

/// A decoded field value.
///
/// BCD fields keep their digit string (`"0978"`), because pseudo-tetrades
/// (`"ffff"` receipt sentinels, masked `"e"` digits) are not representable
/// as integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Str(String),
    Int(u64),
    Bcd(String),
    Tlv(Box<Tlv>),
}

impl Value {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bcd(&self) -> Option<&str> {
        match self {
            Value::Bcd(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tlv(&self) -> Option<&Tlv> {
        match self {
            Value::Tlv(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn as_tlv_mut(&mut self) -> Option<&mut Tlv> {
        match self {
            Value::Tlv(t) => Some(t.as_mut()),
            _ => None,
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(v.into())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Tlv> for Value {
    fn from(v: Tlv) -> Self {
        Value::Tlv(Box::new(v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Which variable-length header a `Var` field carries: 1, 2 or 3 BCD nibble
/// bytes of the form `0xFy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarLen {
    L,
    LL,
    LLL,
}

impl VarLen {
    fn digits(self) -> usize {
        match self {
            VarLen::L => 1,
            VarLen::LL => 2,
            VarLen::LLL => 3,
        }
    }

    fn max(self) -> usize {
        10usize.pow(self.digits() as u32)
    }
}

/// Which character table a text codec uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTable {
    /// Whatever character set the enclosing [`context`] has active.
    Context,
    /// Pinned to a specific announceable character set.
    Fixed(CharacterSet),
    /// The fixed 7-bit "ASCII with umlauts" table.
    Zvt7Bit,
}

impl TextTable {
    fn decode(self, data: &[u8]) -> Result<String> {
        match self {
            TextTable::Context => charset::decode(data, context::character_set()),
            TextTable::Fixed(set) => charset::decode(data, set),
            TextTable::Zvt7Bit => Ok(charset::decode_zvt7(data)),
        }
    }

    fn encode(self, value: &str) -> Result<Vec<u8>> {
        match self {
            TextTable::Context => charset::encode(value, context::character_set()),
            TextTable::Fixed(set) => charset::encode(value, set),
            TextTable::Zvt7Bit => charset::encode_zvt7(value),
        }
    }
}

/// Payload interpretation of a `Var` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarPayload {
    Bytes,
    Text(TextTable),
}

/// A positional or bitmap field codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCodec {
    /// Exactly `N` raw bytes.
    Fixed(usize),
    /// One binary byte; also used for flag bytes.
    Byte,
    /// Fixed-width binary integer.
    Int { length: usize, endian: Endianness },
    /// `N` bytes of packed decimal digits, kept as a digit string.
    /// Pseudo-tetrades (A-F) are tolerated in both directions.
    Bcd(usize),
    /// Variable-length packed BCD, consuming the rest of its input. Only
    /// used as a TLV data type.
    BcdVar,
    /// `N` bytes of packed decimal digits holding an integer.
    BcdInt(usize),
    /// Raw bytes consuming the rest of the input.
    Raw,
    /// Text consuming the rest of its input.
    Text(TextTable),
    /// L/LL/LLLVAR: nibble length header followed by that many bytes.
    Var(VarLen, VarPayload),
    /// A BER length followed by a TLV tree (bitmap 0x06).
    Tlv,
}

fn take(data: &[u8], n: usize, what: &str) -> Result<(Vec<u8>, usize)> {
    if data.len() < n {
        return Err(Error::parse(format!("truncated {}", what), data));
    }
    Ok((data[..n].to_vec(), n))
}

fn int_from_bytes(data: &[u8], endian: Endianness) -> u64 {
    match endian {
        Endianness::Big => byteorder::BigEndian::read_uint(data, data.len()),
        Endianness::Little => byteorder::LittleEndian::read_uint(data, data.len()),
    }
}

fn int_to_bytes(value: u64, length: usize, endian: Endianness) -> Result<Vec<u8>> {
    if length < 8 && value >> (8 * length) != 0 {
        return Err(Error::Schema(format!(
            "value {} too large to serialize in {} bytes",
            value, length
        )));
    }
    let mut buf = vec![0u8; length];
    match endian {
        Endianness::Big => byteorder::BigEndian::write_uint(&mut buf, value, length),
        Endianness::Little => byteorder::LittleEndian::write_uint(&mut buf, value, length),
    }
    Ok(buf)
}

fn expect_hexdigits(value: &str) -> Result<()> {
    if value.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "BCD field contents can only be hex digits, got {:?}",
            value
        )))
    }
}

impl FieldCodec {
    /// Parses one field from the front of `data`, returning the value and
    /// the unconsumed rest.
    pub fn parse<'a>(&self, data: &'a [u8]) -> Result<(Value, &'a [u8])> {
        match *self {
            FieldCodec::Fixed(n) => {
                let (v, used) = take(data, n, "fixed-length field")?;
                Ok((Value::Bytes(v), &data[used..]))
            }
            FieldCodec::Byte => {
                let (v, used) = take(data, 1, "byte field")?;
                Ok((Value::Int(v[0].into()), &data[used..]))
            }
            FieldCodec::Int { length, endian } => {
                let (v, used) = take(data, length, "integer field")?;
                Ok((Value::Int(int_from_bytes(&v, endian)), &data[used..]))
            }
            FieldCodec::Bcd(n) => {
                let (v, used) = take(data, n, "BCD field")?;
                Ok((Value::Bcd(hex::encode(v)), &data[used..]))
            }
            FieldCodec::BcdVar => Ok((Value::Bcd(hex::encode(data)), &data[data.len()..])),
            FieldCodec::BcdInt(n) => {
                let (v, used) = take(data, n, "BCD integer field")?;
                let digits = hex::encode(v);
                let value = digits.parse::<u64>().map_err(|_| {
                    Error::parse(format!("non-decimal BCD integer {:?}", digits), data)
                })?;
                Ok((Value::Int(value), &data[used..]))
            }
            FieldCodec::Raw => Ok((Value::Bytes(data.to_vec()), &data[data.len()..])),
            FieldCodec::Text(table) => {
                Ok((Value::Str(table.decode(data)?), &data[data.len()..]))
            }
            FieldCodec::Var(var, payload) => {
                let digits = var.digits();
                if data.len() < digits {
                    return Err(Error::parse("L*VAR length header invalid", data));
                }
                let mut len = 0usize;
                for &b in &data[..digits] {
                    if b & 0xF0 != 0xF0 || b & 0x0F > 9 {
                        return Err(Error::parse("L*VAR length header invalid", data));
                    }
                    len = len * 10 + (b & 0x0F) as usize;
                }
                let rest = &data[digits..];
                if rest.len() < len {
                    return Err(Error::parse("truncated L*VAR field", data));
                }
                let (value, rest) = rest.split_at(len);
                let value = match payload {
                    VarPayload::Bytes => Value::Bytes(value.to_vec()),
                    VarPayload::Text(table) => Value::Str(table.decode(value)?),
                };
                Ok((value, rest))
            }
            FieldCodec::Tlv => {
                let (tlv, rest) = Tlv::parse_container(data)?;
                Ok((Value::Tlv(Box::new(tlv)), rest))
            }
        }
    }

    /// Serializes `value` to its exact wire form.
    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        match *self {
            FieldCodec::Fixed(n) => {
                let bytes = value
                    .as_bytes()
                    .ok_or_else(|| type_error("bytes", value))?;
                if bytes.len() != n {
                    return Err(Error::Schema(format!(
                        "field must be exactly {} bytes long (got {})",
                        n,
                        bytes.len()
                    )));
                }
                Ok(bytes.to_vec())
            }
            FieldCodec::Byte => {
                let v = value.as_int().ok_or_else(|| type_error("integer", value))?;
                int_to_bytes(v, 1, Endianness::Big)
            }
            FieldCodec::Int { length, endian } => {
                let v = value.as_int().ok_or_else(|| type_error("integer", value))?;
                int_to_bytes(v, length, endian)
            }
            FieldCodec::Bcd(n) => {
                let digits = value.as_bcd().ok_or_else(|| type_error("BCD", value))?;
                expect_hexdigits(digits)?;
                if digits.len() != 2 * n {
                    return Err(Error::Schema(format!(
                        "BCD value length {} doesn't match field length {}",
                        digits.len(),
                        2 * n
                    )));
                }
                hex::decode(digits).map_err(|e| Error::Schema(e.to_string()))
            }
            FieldCodec::BcdVar => {
                let digits = value.as_bcd().ok_or_else(|| type_error("BCD", value))?;
                expect_hexdigits(digits)?;
                let padded = if digits.len() % 2 != 0 {
                    format!("0{}", digits)
                } else {
                    digits.to_owned()
                };
                hex::decode(padded).map_err(|e| Error::Schema(e.to_string()))
            }
            FieldCodec::BcdInt(n) => {
                let v = value.as_int().ok_or_else(|| type_error("integer", value))?;
                let digits = v.to_string();
                if digits.len() > 2 * n {
                    return Err(Error::Schema(format!(
                        "value {} doesn't fit a {}-byte BCD field",
                        v, n
                    )));
                }
                hex::decode(format!("{:0>width$}", digits, width = 2 * n))
                    .map_err(|e| Error::Schema(e.to_string()))
            }
            FieldCodec::Raw => {
                let bytes = value
                    .as_bytes()
                    .ok_or_else(|| type_error("bytes", value))?;
                Ok(bytes.to_vec())
            }
            FieldCodec::Text(table) => {
                let s = value.as_str().ok_or_else(|| type_error("string", value))?;
                table.encode(s)
            }
            FieldCodec::Var(var, payload) => {
                let bytes = match (payload, value) {
                    (VarPayload::Bytes, Value::Bytes(b)) => b.clone(),
                    (VarPayload::Text(table), Value::Str(s)) => table.encode(s)?,
                    _ => return Err(type_error("L*VAR payload", value)),
                };
                if bytes.len() >= var.max() {
                    return Err(Error::Schema(format!(
                        "data too long for L*VAR field ({} >= {})",
                        bytes.len(),
                        var.max()
                    )));
                }
                let mut out = Vec::with_capacity(var.digits() + bytes.len());
                for i in (0..var.digits()).rev() {
                    out.push(0xF0 | ((bytes.len() / 10usize.pow(i as u32)) % 10) as u8);
                }
                out.extend_from_slice(&bytes);
                Ok(out)
            }
            FieldCodec::Tlv => {
                let tlv = value.as_tlv().ok_or_else(|| type_error("TLV", value))?;
                tlv.serialize()
            }
        }
    }

    /// Decodes a complete TLV primitive value under this codec. Unlike
    /// [`parse`](Self::parse), this interprets the whole slice; the length
    /// came from the TLV header.
    pub(crate) fn from_bytes(&self, data: &[u8]) -> Result<Value> {
        match *self {
            FieldCodec::Byte | FieldCodec::Int { .. } => {
                if data.len() > 8 {
                    return Err(Error::parse("integer value too wide", data));
                }
                let endian = match *self {
                    FieldCodec::Int { endian, .. } => endian,
                    _ => Endianness::Big,
                };
                let v = if data.is_empty() {
                    0
                } else {
                    int_from_bytes(data, endian)
                };
                Ok(Value::Int(v))
            }
            FieldCodec::Bcd(_) | FieldCodec::BcdVar => Ok(Value::Bcd(hex::encode(data))),
            FieldCodec::BcdInt(_) => {
                let digits = hex::encode(data);
                digits
                    .parse::<u64>()
                    .map(Value::Int)
                    .map_err(|_| Error::parse(format!("non-decimal BCD integer {:?}", digits), data))
            }
            FieldCodec::Text(table) => Ok(Value::Str(table.decode(data)?)),
            _ => Ok(Value::Bytes(data.to_vec())),
        }
    }

    /// Coerces an assigned value into this codec's natural shape. Happens on
    /// assignment, not on read.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (*self, value) {
            (FieldCodec::Byte, v @ Value::Int(_)) => Ok(v),
            (FieldCodec::Int { .. }, v @ Value::Int(_)) => Ok(v),
            (FieldCodec::Byte | FieldCodec::Int { .. }, Value::Str(s)) => s
                .parse::<u64>()
                .map(Value::Int)
                .map_err(|_| Error::Schema(format!("not an integer: {:?}", s))),
            (FieldCodec::BcdInt(_), v @ Value::Int(_)) => Ok(v),
            (FieldCodec::BcdInt(_), Value::Str(s) | Value::Bcd(s)) => {
                let trimmed = s.trim_start_matches('0');
                if trimmed.is_empty() && !s.is_empty() {
                    Ok(Value::Int(0))
                } else {
                    trimmed
                        .parse::<u64>()
                        .map(Value::Int)
                        .map_err(|_| Error::Schema(format!("not a decimal number: {:?}", s)))
                }
            }
            (FieldCodec::Bcd(_) | FieldCodec::BcdVar, Value::Str(s) | Value::Bcd(s)) => {
                expect_hexdigits(&s)?;
                Ok(Value::Bcd(s.to_ascii_lowercase()))
            }
            (FieldCodec::Bcd(_) | FieldCodec::BcdVar, Value::Int(v)) => {
                Ok(Value::Bcd(v.to_string()))
            }
            (FieldCodec::Text(_), v @ Value::Str(_)) => Ok(v),
            (FieldCodec::Fixed(_) | FieldCodec::Raw, v @ Value::Bytes(_)) => Ok(v),
            (FieldCodec::Var(_, VarPayload::Bytes), v @ Value::Bytes(_)) => Ok(v),
            (FieldCodec::Var(_, VarPayload::Text(_)), v @ Value::Str(_)) => Ok(v),
            (FieldCodec::Tlv, v @ Value::Tlv(_)) => Ok(v),
            (codec, value) => Err(Error::Schema(format!(
                "cannot assign {:?} to a {:?} field",
                value, codec
            ))),
        }
    }
}

fn type_error(wanted: &str, got: &Value) -> Error {
    Error::Schema(format!("expected a {} value, got {:?}", wanted, got))
}

/// Shorthands matching the vocabulary of the ZVT specification.
pub const BYTE: FieldCodec = FieldCodec::Byte;
pub const PASSWORD: FieldCodec = FieldCodec::Bcd(3);
pub const LVAR: FieldCodec = FieldCodec::Var(VarLen::L, VarPayload::Bytes);
pub const LLVAR: FieldCodec = FieldCodec::Var(VarLen::LL, VarPayload::Bytes);
pub const LLLVAR: FieldCodec = FieldCodec::Var(VarLen::LLL, VarPayload::Bytes);
pub const LLSTRING: FieldCodec = FieldCodec::Var(VarLen::LL, VarPayload::Text(TextTable::Context));
pub const LLLSTRING: FieldCodec =
    FieldCodec::Var(VarLen::LLL, VarPayload::Text(TextTable::Context));
