//! ZVT flavoured BER-TLV (Tag-Length-Value) implementation.
//!
//! ZVT embeds a BER-style TLV container in bitmap 0x06 (and nowhere else).
//! The dialect is close to the ISO 7816 one, but the ecosystem refers to
//! tags by their hex value (0x1F42 rather than "private 0x42"), tags are at
//! most four bytes, and at least one vendor (FEIG cVEND) ignores the
//! constructed bit for its private 0xFFxx tags. It's less work to parse
//! this ourselves than to coax a general ASN.1 crate into accepting what
//! real terminals send.
//!
//! Primitive values are typed through a [`Dictionary`]: a per-tag mapping to
//! a field codec and a human name. Unknown tags keep their raw bytes, so an
//! unknown packet still round-trips byte for byte.

use byteorder::{BigEndian, ByteOrder};
use nom::bytes::complete::take;
use nom::number::complete::be_u8;

use crate::charset::CharacterSet;
use crate::context;
use crate::errors::{Error, Result};
use crate::fields::{FieldCodec, TextTable, Value};
use crate::types::VendorQuirks;

pub type Tag = u32;

type IResult<'a, T> = nom::IResult<&'a [u8], T>;

/// The class bits (7-8) of the leading tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvClass {
    Universal,
    Application,
    Context,
    Private,
}

impl TlvClass {
    fn from_tag(tag: Tag) -> TlvClass {
        match top_byte(tag) >> 6 {
            0 => TlvClass::Universal,
            1 => TlvClass::Application,
            2 => TlvClass::Context,
            _ => TlvClass::Private,
        }
    }
}

fn top_byte(tag: Tag) -> u8 {
    let mut t = tag;
    while t > 0xFF {
        t >>= 8;
    }
    t as u8
}

/// Does this tag denote a constructed value (one containing further TLV
/// tuples)? Bit 6 of the leading byte, except that the FEIG quirk forces
/// the private 0xFF00..0xFFFF range primitive.
fn is_constructed(tag: Tag, quirks: VendorQuirks) -> bool {
    if quirks.contains(VendorQuirks::FEIG_CVEND) && (0xFF00..=0xFFFF).contains(&tag) {
        return false;
    }
    top_byte(tag) & (1 << 5) != 0
}

/// Parses a tag. If bits 1-5 of the first byte are all set, continuation
/// bytes follow until and including the first one without bit 8 set. The
/// decoded tag is the big-endian concatenation of all consumed bytes.
fn take_tag(data: &[u8]) -> IResult<Tag> {
    let (rest, first) = be_u8(data)?;
    if first & 0b0001_1111 != 0b0001_1111 {
        return Ok((rest, first.into()));
    }
    let mut tag_len = 2usize;
    for b in rest {
        if b & (1 << 7) != 0 {
            tag_len += 1;
        } else {
            break;
        }
    }
    if tag_len > 4 {
        return Err(nom::Err::Error(nom::error::Error::new(
            data,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (rest, raw) = take(tag_len)(data)?;
    Ok((rest, raw.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)))
}

/// Parses a length field: the byte itself below 0x80, otherwise the low
/// seven bits give the number of following big-endian length bytes.
fn take_len(data_: &[u8]) -> IResult<usize> {
    let (data, first) = be_u8(data_)?;
    if first & 0x80 == 0 {
        return Ok((data, first as usize));
    }
    let lensize = (first & 0b0111_1111) as usize;
    if lensize == 0 {
        // Indeterminate lengths are valid BER but do not occur in ZVT;
        // terminals have been seen emitting 0x80 for "empty" though.
        return Ok((data, 0));
    }
    if lensize > 4 || data.len() < lensize {
        return Err(nom::Err::Error(nom::error::Error::new(
            data_,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    Ok((
        &data[lensize..],
        BigEndian::read_uint(data, lensize) as usize,
    ))
}

fn make_tag(tag: Tag) -> Vec<u8> {
    // Tag 0x00 is not valid BER, but terminals send it; keep it one byte so
    // such packets round-trip.
    if tag == 0 {
        return vec![0];
    }
    let mut out = Vec::new();
    let mut t = tag;
    while t > 0 {
        out.insert(0, (t & 0xFF) as u8);
        t >>= 8;
    }
    out
}

fn make_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let mut out = Vec::new();
    let mut l = len;
    while l > 0 {
        out.insert(0, (l & 0xFF) as u8);
        l >>= 8;
    }
    out.insert(0, 0x80 | out.len() as u8);
    out
}

/// What a dictionary says about a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A primitive value with a typed codec.
    Data(FieldCodec),
    /// A known container; informational only, structure comes from the tag.
    Container,
}

#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub tag: Tag,
    pub name: &'static str,
    pub kind: EntryKind,
}

const fn data(tag: Tag, name: &'static str, codec: FieldCodec) -> Entry {
    Entry {
        tag,
        name,
        kind: EntryKind::Data(codec),
    }
}

const fn container(tag: Tag, name: &'static str) -> Entry {
    Entry {
        tag,
        name,
        kind: EntryKind::Container,
    }
}

/// A named tag-to-type mapping. A child dictionary overlays its parent.
#[derive(Debug)]
pub struct Dictionary {
    pub name: &'static str,
    pub parent: Option<&'static Dictionary>,
    pub entries: &'static [Entry],
}

impl Dictionary {
    pub fn lookup(&self, tag: Tag) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .or_else(|| self.parent.and_then(|p| p.lookup(tag)))
    }

    fn codec(&self, tag: Tag) -> Option<FieldCodec> {
        match self.lookup(tag)?.kind {
            EntryKind::Data(codec) => Some(codec),
            EntryKind::Container => None,
        }
    }
}

/// Untyped fallback: every primitive value is raw bytes.
pub static DEFAULT: Dictionary = Dictionary {
    name: "default",
    parent: None,
    entries: &[],
};

/// Tag types from the ZVT specification.
pub static ZVT: Dictionary = Dictionary {
    name: "zvt",
    parent: None,
    entries: &[
        data(0x07, "text_line", FieldCodec::Text(TextTable::Context)),
        data(0x08, "receipt", FieldCodec::Bcd(2)),
        data(0x14, "character_set", FieldCodec::Byte),
        data(
            0x15,
            "language_code",
            FieldCodec::Text(TextTable::Fixed(CharacterSet::Ascii7Bit)),
        ),
        data(0x1C, "file_content", FieldCodec::Raw),
        data(
            0x1D,
            "file_id",
            FieldCodec::Int {
                length: 1,
                endian: crate::fields::Endianness::Big,
            },
        ),
        data(
            0x1E,
            "start_position",
            FieldCodec::Int {
                length: 4,
                endian: crate::fields::Endianness::Big,
            },
        ),
        container(0x23, "receipt_numbers"),
        container(0x2D, "file"),
        container(0x2F, "payment_type"),
        data(0x40, "emv_config", FieldCodec::Raw),
        container(0xE4, "device_information"),
        data(
            0x1F00,
            "file_size",
            FieldCodec::Int {
                length: 4,
                endian: crate::fields::Endianness::Big,
            },
        ),
        data(0x1F10, "cardholder_identification", FieldCodec::Byte),
        data(0x1F11, "online_tag", FieldCodec::Byte),
        data(0x1F16, "extended_error_code", FieldCodec::BcdVar),
        data(
            0x1F17,
            "extended_error_text",
            FieldCodec::Text(TextTable::Fixed(CharacterSet::Cp437)),
        ),
        data(
            0x1F40,
            "device_name",
            FieldCodec::Text(TextTable::Fixed(CharacterSet::Ascii7Bit)),
        ),
        data(
            0x1F41,
            "software_version",
            FieldCodec::Text(TextTable::Fixed(CharacterSet::Ascii7Bit)),
        ),
        data(0x1F42, "serial_number", FieldCodec::BcdVar),
        data(0x1F43, "device_state", FieldCodec::Byte),
        data(0x1F44, "terminal_identifier", FieldCodec::Bcd(4)),
        data(0x1F0E, "date", FieldCodec::Bcd(4)),
        data(0x1F0F, "time", FieldCodec::Bcd(3)),
    ],
};

/// FEIG cVEND overlay over [`ZVT`].
pub static FEIG_ZVT: Dictionary = Dictionary {
    name: "feig_zvt",
    parent: Some(&ZVT),
    entries: &[
        data(
            0x1F17,
            "extended_error_text",
            FieldCodec::Text(TextTable::Fixed(CharacterSet::Utf8)),
        ),
        data(0xFF40, "service_password", FieldCodec::Bcd(3)),
        // First byte: screensaver timeout in minutes, second: type.
        data(0xFF48, "screensaver_timeout_and_type", FieldCodec::Bcd(2)),
    ],
};

pub fn dictionary_by_name(name: &str) -> Option<&'static Dictionary> {
    [&DEFAULT, &ZVT, &FEIG_ZVT]
        .into_iter()
        .find(|d| d.name == name)
}

/// The dictionary a TLV bitmap is typed with: an explicit context override
/// if set, otherwise [`FEIG_ZVT`] under the FEIG quirk, otherwise [`ZVT`].
pub fn active_dictionary() -> &'static Dictionary {
    context::tlv_dictionary().unwrap_or_else(|| {
        if context::vendor_quirks().contains(VendorQuirks::FEIG_CVEND) {
            &FEIG_ZVT
        } else {
            &ZVT
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Primitive(Value),
    Children(Vec<Tlv>),
}

/// One node of a TLV tree.
///
/// The node with `tag == None` is the anonymous outer container that bitmap
/// 0x06 serializes as (a bare length followed by the child tuples).
///
/// A node can be *pending*: auto-created by [`entry`](Tlv::entry) but never
/// assigned. Pending nodes whose payload serializes to nothing contribute
/// zero bytes, so merely walking a path does not change the wire form.
#[derive(Debug, Clone)]
pub struct Tlv {
    tag: Option<Tag>,
    constructed: bool,
    pending: bool,
    codec: Option<FieldCodec>,
    payload: Payload,
}

// Equality is structural; whether a node is still pending or how it was
// typed doesn't matter for comparing trees.
impl PartialEq for Tlv {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.constructed == other.constructed
            && self.payload == other.payload
    }
}

impl Tlv {
    /// The anonymous outer container.
    pub fn container() -> Tlv {
        Tlv {
            tag: None,
            constructed: true,
            pending: false,
            codec: None,
            payload: Payload::Children(Vec::new()),
        }
    }

    /// A fresh node for `tag`, typed by the active dictionary and the
    /// active vendor quirks.
    pub fn new(tag: Tag) -> Tlv {
        Self::with_dictionary(
            tag,
            context::tlv_dictionary().unwrap_or(&DEFAULT),
            context::vendor_quirks(),
        )
    }

    fn with_dictionary(tag: Tag, dict: &Dictionary, quirks: VendorQuirks) -> Tlv {
        let constructed = is_constructed(tag, quirks);
        Tlv {
            tag: Some(tag),
            constructed,
            pending: false,
            codec: if constructed { None } else { dict.codec(tag) },
            payload: if constructed {
                Payload::Children(Vec::new())
            } else {
                Payload::Primitive(Value::Bytes(Vec::new()))
            },
        }
    }

    fn new_pending(tag: Tag) -> Tlv {
        let mut node = Tlv::new(tag);
        node.pending = true;
        node
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    pub fn class(&self) -> Option<TlvClass> {
        self.tag.map(TlvClass::from_tag)
    }

    pub fn constructed(&self) -> bool {
        self.constructed
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The dictionary name of this node, or `x<tag>` if it has none.
    pub fn name(&self) -> String {
        let tag = match self.tag {
            Some(tag) => tag,
            None => return "container".into(),
        };
        match active_dictionary().lookup(tag) {
            Some(entry) => entry.name.into(),
            None => format!("x{:X}", tag),
        }
    }

    /// The primitive value of this node, if it is primitive.
    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Primitive(v) => Some(v),
            Payload::Children(_) => None,
        }
    }

    /// The child nodes of this node, if it is constructed.
    pub fn children(&self) -> Option<&[Tlv]> {
        match &self.payload {
            Payload::Children(c) => Some(c),
            Payload::Primitive(_) => None,
        }
    }

    /// Walks `path` without creating anything.
    pub fn get(&self, path: &[Tag]) -> Option<&Tlv> {
        let mut node = self;
        for &tag in path {
            node = node.children()?.iter().find(|c| c.tag == Some(tag))?;
        }
        Some(node)
    }

    /// Walks `path`, appending pending children where a step is missing.
    /// The returned node is pending until a value is assigned.
    pub fn entry(&mut self, path: &[Tag]) -> &mut Tlv {
        let mut node = self;
        for &tag in path {
            if !node.constructed {
                // Accessing into a primitive turns it into a container;
                // matches assigning through a freshly created path.
                node.constructed = true;
                node.payload = Payload::Children(Vec::new());
            }
            let children = match &mut node.payload {
                Payload::Children(c) => c,
                Payload::Primitive(_) => unreachable!(),
            };
            let pos = children.iter().position(|c| c.tag == Some(tag));
            let pos = match pos {
                Some(pos) => pos,
                None => {
                    children.push(Tlv::new_pending(tag));
                    children.len() - 1
                }
            };
            node = &mut children[pos];
        }
        node
    }

    /// Assigns a primitive value at `path`, updating the first existing
    /// child or appending a new one. The target (but not intermediate
    /// nodes) becomes concrete.
    pub fn set(&mut self, path: &[Tag], value: impl Into<Value>) -> Result<()> {
        let node = self.entry(path);
        let value = value.into();
        let value = match node.codec {
            Some(codec) => codec.coerce(value)?,
            None => value,
        };
        node.constructed = false;
        node.pending = false;
        node.payload = Payload::Primitive(value);
        Ok(())
    }

    /// Makes the node at `path` a concrete constructed node with the given
    /// children (an empty vector gives an empty, but serialized, container).
    pub fn set_children(&mut self, path: &[Tag], children: Vec<Tlv>) {
        let node = self.entry(path);
        node.constructed = true;
        node.pending = false;
        node.payload = Payload::Children(children);
    }

    /// Appends `child` without looking for an existing node with its tag.
    pub fn push_child(&mut self, child: Tlv) {
        self.pending = false;
        match &mut self.payload {
            Payload::Children(c) => c.push(child),
            Payload::Primitive(_) => {
                self.constructed = true;
                self.payload = Payload::Children(vec![child]);
            }
        }
    }

    /// The decoded value at `path`.
    pub fn value_at(&self, path: &[Tag]) -> Option<&Value> {
        self.get(path)?.value()
    }

    pub fn bytes_at(&self, path: &[Tag]) -> Option<&[u8]> {
        self.value_at(path)?.as_bytes()
    }

    pub fn str_at(&self, path: &[Tag]) -> Option<&str> {
        self.value_at(path)?.as_str()
    }

    pub fn int_at(&self, path: &[Tag]) -> Option<u64> {
        self.value_at(path)?.as_int()
    }

    pub fn bcd_at(&self, path: &[Tag]) -> Option<&str> {
        self.value_at(path)?.as_bcd()
    }

    /// Parses a single tagged node.
    pub fn parse<'a>(data: &'a [u8], dict: &Dictionary) -> Result<(Tlv, &'a [u8])> {
        let quirks = context::vendor_quirks();
        Self::parse_node(data, dict, quirks)
    }

    /// Parses the anonymous outer container: a bare length followed by that
    /// many bytes of child tuples. This is the wire form of bitmap 0x06;
    /// the dictionary is chosen by [`active_dictionary`].
    pub fn parse_container(data: &[u8]) -> Result<(Tlv, &[u8])> {
        let dict = active_dictionary();
        let quirks = context::vendor_quirks();
        let (rest, len) =
            take_len(data).map_err(|_| Error::parse("invalid TLV container length", data))?;
        // Real terminals have been seen announcing a byte or two more than
        // they send; take what is actually there.
        let (content, rest) = rest.split_at(len.min(rest.len()));
        let children = Self::parse_children(content, dict, quirks)?;
        let mut container = Tlv::container();
        container.payload = Payload::Children(children);
        Ok((container, rest))
    }

    fn parse_children(mut data: &[u8], dict: &Dictionary, quirks: VendorQuirks) -> Result<Vec<Tlv>> {
        let mut children = Vec::new();
        while !data.is_empty() {
            let (node, rest) = Self::parse_node(data, dict, quirks)?;
            children.push(node);
            data = rest;
        }
        Ok(children)
    }

    fn parse_node<'a>(
        data: &'a [u8],
        dict: &Dictionary,
        quirks: VendorQuirks,
    ) -> Result<(Tlv, &'a [u8])> {
        let (rest, tag) = take_tag(data).map_err(|_| Error::parse("invalid TLV tag", data))?;
        let (rest, len) =
            take_len(rest).map_err(|_| Error::parse("invalid TLV length", data))?;
        let (value, rest) = rest.split_at(len.min(rest.len()));

        let mut node = Tlv::with_dictionary(tag, dict, quirks);
        if node.constructed {
            node.payload = Payload::Children(Self::parse_children(value, dict, quirks)?);
        } else {
            let decoded = match node.codec {
                Some(codec) => codec.from_bytes(value)?,
                None => Value::Bytes(value.to_vec()),
            };
            node.payload = Payload::Primitive(decoded);
        }
        Ok((node, rest))
    }

    fn serialize_payload(&self) -> Result<Vec<u8>> {
        match &self.payload {
            Payload::Primitive(value) => match self.codec {
                Some(codec) => codec.serialize(value),
                None => match value {
                    Value::Bytes(b) => Ok(b.clone()),
                    Value::Str(s) => crate::charset::encode(s, context::character_set()),
                    Value::Bcd(digits) => FieldCodec::BcdVar.serialize(&Value::Bcd(digits.clone())),
                    Value::Int(_) => FieldCodec::Byte.serialize(value),
                    Value::Tlv(t) => t.serialize(),
                },
            },
            Payload::Children(children) => {
                let mut out = Vec::new();
                for child in children {
                    out.extend(child.serialize()?);
                }
                Ok(out)
            }
        }
    }

    /// Serializes this node. Lengths are recomputed, never trusted from the
    /// parse; a pending node with an empty payload emits nothing at all.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = self.serialize_payload()?;
        if self.pending && payload.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        if let Some(tag) = self.tag {
            out.extend(make_tag(tag));
        }
        out.extend(make_len(payload.len()));
        out.extend(payload);
        Ok(out)
    }
}
