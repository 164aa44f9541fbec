//! Character sets for ZVT text fields.
//!
//! The PT announces a character set as a one-byte code (TLV tag 0x14); text
//! fields are then decoded under whatever set is active in the current
//! [`context`](crate::context). The ZVT default is CP437 ("ZVT 8-bit").
//! A few fields additionally use a fixed 7-bit table ("ASCII with umlauts")
//! that is not announceable and is pinned per-field instead.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::errors::{Error, Result};

/// Character set codes from the ZVT specification, chapter 8 "Character set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CharacterSet {
    Ascii7Bit = 0,
    Latin1 = 1,
    Latin2 = 2,
    Latin3 = 3,
    Latin4 = 4,
    Latin5 = 5,
    Latin6 = 6,
    Latin7 = 7,
    Latin8 = 8,
    Latin9 = 9,
    Latin10 = 10,
    Latin11 = 11,
    // ISO 8859-12 was never assigned.
    Latin13 = 13,
    Latin14 = 14,
    Latin15 = 15,
    Latin16 = 16,
    Utf8 = 0xFE,
    /// "ZVT 8-bit", which is CP437. The protocol default.
    Cp437 = 0xFF,
}

impl CharacterSet {
    pub const DEFAULT: CharacterSet = CharacterSet::Cp437;
}

/// The fixed 7-bit table used by e.g. the software-version field: ASCII with
/// 0x5B..0x5D replaced by `Ä Ö Ü` and 0x7B..0x7F by `ä ö ü ß Δ`.
const ZVT_7BIT: [char; 8] = ['Ä', 'Ö', 'Ü', 'ä', 'ö', 'ü', 'ß', 'Δ'];

fn zvt7_char(b: u8) -> char {
    let b = b & 0x7F;
    match b {
        0x5B..=0x5D => ZVT_7BIT[(b - 0x5B) as usize],
        0x7B..=0x7F => ZVT_7BIT[(b - 0x7B + 3) as usize],
        b => b as char,
    }
}

pub fn decode_zvt7(data: &[u8]) -> String {
    data.iter().map(|&b| zvt7_char(b)).collect()
}

pub fn encode_zvt7(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| match c {
            'Ä' => Ok(0x5B),
            'Ö' => Ok(0x5C),
            'Ü' => Ok(0x5D),
            'ä' => Ok(0x7B),
            'ö' => Ok(0x7C),
            'ü' => Ok(0x7D),
            'ß' => Ok(0x7E),
            'Δ' => Ok(0x7F),
            c if (c as u32) < 0x5B || matches!(c as u32, 0x5E..=0x7A) => Ok(c as u8),
            c => Err(Error::Schema(format!(
                "character {:?} not encodable in the ZVT 7-bit set",
                c
            ))),
        })
        .collect()
}

/// CP437 upper half (0x80..0xFF). The lower half is plain ASCII.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

fn decode_cp437(data: &[u8]) -> String {
    data.iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

fn encode_cp437(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| {
            if (c as u32) < 0x80 {
                Ok(c as u8)
            } else {
                CP437_HIGH
                    .iter()
                    .position(|&t| t == c)
                    .map(|i| 0x80 + i as u8)
                    .ok_or_else(|| {
                        Error::Schema(format!("character {:?} not encodable in CP437", c))
                    })
            }
        })
        .collect()
}

fn iso8859(set: CharacterSet) -> &'static encoding_rs::Encoding {
    // The WHATWG label registry knows all assigned ISO 8859 parts (8859-11
    // under its windows-874 alias). Latin-1 is handled separately since the
    // web maps it to windows-1252.
    let label = format!("iso-8859-{}", u8::from(set));
    encoding_rs::Encoding::for_label(label.as_bytes())
        .unwrap_or(encoding_rs::WINDOWS_1252)
}

/// Decodes `data` under `set`. Undecodable input is a parse error.
pub fn decode(data: &[u8], set: CharacterSet) -> Result<String> {
    match set {
        CharacterSet::Ascii7Bit => {
            if let Some(&b) = data.iter().find(|&&b| b > 0x7F) {
                return Err(Error::parse(
                    format!("byte 0x{:02X} is not 7-bit ASCII", b),
                    data,
                ));
            }
            Ok(data.iter().map(|&b| b as char).collect())
        }
        CharacterSet::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
        CharacterSet::Utf8 => std::str::from_utf8(data)
            .map(str::to_owned)
            .map_err(|e| Error::parse(format!("invalid UTF-8: {}", e), data)),
        CharacterSet::Cp437 => Ok(decode_cp437(data)),
        set => {
            let (s, had_errors) = iso8859(set).decode_without_bom_handling(data);
            if had_errors {
                Err(Error::parse(format!("undecodable {:?} text", set), data))
            } else {
                Ok(s.into_owned())
            }
        }
    }
}

/// Encodes `value` under `set`. Unmappable characters are a schema error.
pub fn encode(value: &str, set: CharacterSet) -> Result<Vec<u8>> {
    match set {
        CharacterSet::Ascii7Bit => value
            .chars()
            .map(|c| {
                if (c as u32) < 0x80 {
                    Ok(c as u8)
                } else {
                    Err(Error::Schema(format!("character {:?} is not ASCII", c)))
                }
            })
            .collect(),
        CharacterSet::Latin1 => value
            .chars()
            .map(|c| {
                u8::try_from(c as u32)
                    .map_err(|_| Error::Schema(format!("character {:?} is not Latin-1", c)))
            })
            .collect(),
        CharacterSet::Utf8 => Ok(value.as_bytes().to_vec()),
        CharacterSet::Cp437 => encode_cp437(value),
        set => {
            let (bytes, _, had_errors) = iso8859(set).encode(value);
            if had_errors {
                Err(Error::Schema(format!(
                    "text not encodable as {:?}: {:?}",
                    set, value
                )))
            } else {
                Ok(bytes.into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp437_umlauts() {
        let wire = hex::decode("5465737420842094208120e1").unwrap();
        assert_eq!(decode(&wire, CharacterSet::Cp437).unwrap(), "Test ä ö ü ß");
        assert_eq!(encode("Test ä ö ü ß", CharacterSet::Cp437).unwrap(), wire);
    }

    #[test]
    fn test_utf8_umlauts() {
        let wire = hex::decode("5465737420c3a420c3b620c3bc20c39f").unwrap();
        assert_eq!(decode(&wire, CharacterSet::Utf8).unwrap(), "Test ä ö ü ß");
        assert_eq!(encode("Test ä ö ü ß", CharacterSet::Utf8).unwrap(), wire);
    }

    #[test]
    fn test_latin1_umlauts() {
        let wire = hex::decode("5465737420e420f620fc20df").unwrap();
        assert_eq!(decode(&wire, CharacterSet::Latin1).unwrap(), "Test ä ö ü ß");
        assert_eq!(encode("Test ä ö ü ß", CharacterSet::Latin1).unwrap(), wire);
    }

    #[test]
    fn test_zvt7_umlauts() {
        let wire = hex::decode("54657374207b207c207d207e").unwrap();
        assert_eq!(decode_zvt7(&wire), "Test ä ö ü ß");
        assert_eq!(encode_zvt7("Test ä ö ü ß").unwrap(), wire);
    }

    #[test]
    fn test_zvt7_uppercase_umlauts() {
        assert_eq!(decode_zvt7(&[0x5B, 0x5C, 0x5D]), "ÄÖÜ");
        assert_eq!(encode_zvt7("ÄÖÜ").unwrap(), vec![0x5B, 0x5C, 0x5D]);
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert!(decode(&[0x54, 0x84], CharacterSet::Ascii7Bit).is_err());
        assert!(encode("ä", CharacterSet::Ascii7Bit).is_err());
    }

    #[test]
    fn test_character_set_codes() {
        assert_eq!(CharacterSet::try_from(0xFF).unwrap(), CharacterSet::Cp437);
        assert_eq!(CharacterSet::try_from(0xFE).unwrap(), CharacterSet::Utf8);
        assert_eq!(CharacterSet::try_from(1).unwrap(), CharacterSet::Latin1);
        assert!(CharacterSet::try_from(12).is_err());
    }
}
