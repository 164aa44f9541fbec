//! Static packet schema tables.
//!
//! Each ZVT packet kind is described by one `'static` [`Schema`]: its
//! control field (possibly wildcarded), the ordered positional fields, and
//! which bitmaps may follow them. Parsing dispatches by iterating the
//! registered schemas; there is no inheritance, just tables.

use crate::errors::{Error, Result};
use crate::fields::FieldCodec;

/// One positional field of a packet.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub codec: FieldCodec,
    pub required: bool,
    /// A failure of this field restarts the field walk with the field
    /// blacklisted instead of failing the parse. See the Completion packet.
    pub ignore_parse_error: bool,
}

pub const fn field(name: &'static str, codec: FieldCodec) -> FieldDef {
    FieldDef {
        name,
        codec,
        required: true,
        ignore_parse_error: false,
    }
}

pub const fn optional(name: &'static str, codec: FieldCodec) -> FieldDef {
    FieldDef {
        name,
        codec,
        required: false,
        ignore_parse_error: false,
    }
}

pub const fn ignorable(name: &'static str, codec: FieldCodec) -> FieldDef {
    FieldDef {
        name,
        codec,
        required: false,
        ignore_parse_error: true,
    }
}

/// One entry of a bitmap dictionary: a single tag byte introducing a typed
/// payload in the unordered tail of a packet.
#[derive(Debug, Clone, Copy)]
pub struct BitmapDef {
    pub tag: u8,
    pub name: &'static str,
    pub codec: FieldCodec,
    pub description: &'static str,
}

pub const fn bitmap(
    tag: u8,
    name: &'static str,
    codec: FieldCodec,
    description: &'static str,
) -> BitmapDef {
    BitmapDef {
        tag,
        name,
        codec,
        description,
    }
}

/// A packet schema.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    /// Control field class byte; `None` matches anything.
    pub class: Option<u8>,
    /// Control field instruction byte; `None` matches anything.
    pub instr: Option<u8>,
    /// Whether the transmission engine keeps listening for responses after
    /// the transport acknowledgement.
    pub wait_for_completion: bool,
    pub fields: &'static [FieldDef],
    /// Bitmap names this packet accepts; `None` means all known bitmaps.
    pub allowed_bitmaps: Option<&'static [&'static str]>,
    pub required_bitmaps: &'static [&'static str],
    /// Per-schema bitmap definitions shadowing the global dictionary.
    pub override_bitmaps: &'static [BitmapDef],
    /// Whether `Packet::parse` may dispatch to this schema by control
    /// field. Schemas whose encoded form collides with another family
    /// (Write Files, the open-reservations enquiry) opt out.
    pub dispatch: bool,
}

impl Schema {
    /// Checks the construction-time invariants: required positional fields
    /// must precede optional ones, and fixed-width codecs need a length.
    pub fn validate(&self) -> Result<()> {
        let mut have_optional = false;
        for f in self.fields {
            if f.required {
                if have_optional {
                    return Err(Error::Schema(format!(
                        "{}: required field {} after optional fields",
                        self.name, f.name
                    )));
                }
            } else if !f.ignore_parse_error {
                have_optional = true;
            }
            let length = match f.codec {
                FieldCodec::Fixed(n) | FieldCodec::Bcd(n) | FieldCodec::BcdInt(n) => Some(n),
                FieldCodec::Int { length, .. } => Some(length),
                _ => None,
            };
            if length == Some(0) {
                return Err(Error::Schema(format!(
                    "{}: field {} needs a non-zero length",
                    self.name, f.name
                )));
            }
        }
        Ok(())
    }

    /// Does this schema's control field match the start of `data`?
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= 2
            && self.class.map_or(true, |c| c == data[0])
            && self.instr.map_or(true, |i| i == data[1])
    }

    /// The control field a fresh packet starts with; wildcard halves
    /// default to zero until assigned.
    pub fn control_field(&self) -> [u8; 2] {
        [self.class.unwrap_or(0), self.instr.unwrap_or(0)]
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Resolves a bitmap tag, schema overrides shadowing the global
    /// dictionary.
    pub fn bitmap_by_tag(&self, tag: u8) -> Option<&BitmapDef> {
        self.override_bitmaps
            .iter()
            .find(|b| b.tag == tag)
            .or_else(|| super::bitmaps::BITMAPS.iter().find(|b| b.tag == tag))
    }

    pub fn bitmap_by_name(&self, name: &str) -> Option<&BitmapDef> {
        self.override_bitmaps
            .iter()
            .find(|b| b.name == name)
            .or_else(|| super::bitmaps::BITMAPS.iter().find(|b| b.name == name))
    }

    /// Whether `name` may be registered on this packet.
    pub fn bitmap_allowed(&self, name: &str) -> bool {
        match self.allowed_bitmaps {
            None => true,
            Some(allowed) => allowed.contains(&name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldCodec, LLVAR};

    #[test]
    fn test_required_after_optional_rejected() {
        static BAD: Schema = Schema {
            name: "bad",
            class: Some(0xFF),
            instr: Some(0xAA),
            wait_for_completion: false,
            fields: &[
                optional("foo", FieldCodec::Byte),
                field("bar", FieldCodec::Byte),
            ],
            allowed_bitmaps: None,
            required_bitmaps: &[],
            override_bitmaps: &[],
            dispatch: false,
        };
        assert!(matches!(BAD.validate(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_ignorable_fields_do_not_count_as_optional() {
        // The Completion layout: ignorable fields may precede required
        // ones without violating the ordering rule.
        static OK: Schema = Schema {
            name: "ok",
            class: Some(0xFF),
            instr: Some(0xAA),
            wait_for_completion: false,
            fields: &[
                ignorable("maybe", LLVAR),
                field("always", FieldCodec::Byte),
            ],
            allowed_bitmaps: None,
            required_bitmaps: &[],
            override_bitmaps: &[],
            dispatch: false,
        };
        assert!(OK.validate().is_ok());
    }

    #[test]
    fn test_zero_length_rejected() {
        static BAD: Schema = Schema {
            name: "bad-length",
            class: Some(0xFF),
            instr: Some(0xAA),
            wait_for_completion: false,
            fields: &[field("foo", FieldCodec::BcdInt(0))],
            allowed_bitmaps: None,
            required_bitmaps: &[],
            override_bitmaps: &[],
            dispatch: false,
        };
        assert!(matches!(BAD.validate(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_control_field_matching() {
        static S: Schema = Schema {
            name: "s",
            class: Some(0x84),
            instr: None,
            wait_for_completion: false,
            fields: &[],
            allowed_bitmaps: None,
            required_bitmaps: &[],
            override_bitmaps: &[],
            dispatch: true,
        };
        assert!(S.matches(&[0x84, 0x9C, 0x00]));
        assert!(S.matches(&[0x84, 0x00]));
        assert!(!S.matches(&[0x80, 0x00]));
        assert!(!S.matches(&[0x84]));
    }
}
