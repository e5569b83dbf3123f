// src/encoding.rs

//! Tag file character encodings and line terminator rules

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// Character encoding of tag files, declared in `bagit.txt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TagEncoding {
    #[default]
    Utf8,
    /// Big-endian with a leading byte-order mark
    Utf16,
}

const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

impl TagEncoding {
    /// IANA name written to `Tag-File-Character-Encoding`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16 => "UTF-16",
        }
    }

    /// Encode `text`, prefixing the byte-order mark when `first` is set
    pub fn encode(&self, text: &str, first: bool) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16 => {
                let mut out = Vec::with_capacity(text.len() * 2 + 2);
                if first {
                    out.extend_from_slice(&UTF16_BE_BOM);
                }
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                out
            }
        }
    }

    /// Decode tag file bytes
    ///
    /// A UTF-16 byte-order mark (either endianness) selects UTF-16 regardless
    /// of the declared encoding; anything else is read as UTF-8. Malformed
    /// sequences are replaced rather than rejected so a damaged tag file still
    /// yields its readable lines.
    pub fn decode(bytes: &[u8]) -> String {
        if let Some(rest) = bytes.strip_prefix(&UTF16_BE_BOM) {
            decode_utf16(rest, u16::from_be_bytes)
        } else if let Some(rest) = bytes.strip_prefix(&UTF16_LE_BOM) {
            decode_utf16(rest, u16::from_le_bytes)
        } else {
            let body = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

impl fmt::Display for TagEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TagEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "UTF-8" | "UTF8" => Ok(Self::Utf8),
            "UTF-16" | "UTF16" | "UTF-16BE" => Ok(Self::Utf16),
            _ => Err(Error::Configuration(format!("unsupported tag encoding: {}", s))),
        }
    }
}

/// Line terminator used by tag file writers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EolRule {
    /// Host default
    #[default]
    System,
    /// The opposite of the host default
    CounterSystem,
    Unix,
    Windows,
    /// Bare carriage return
    Classic,
}

impl EolRule {
    pub fn terminator(&self) -> &'static str {
        match self {
            Self::System => {
                if cfg!(windows) {
                    "\r\n"
                } else {
                    "\n"
                }
            }
            Self::CounterSystem => {
                if cfg!(windows) {
                    "\n"
                } else {
                    "\r\n"
                }
            }
            Self::Unix => "\n",
            Self::Windows => "\r\n",
            Self::Classic => "\r",
        }
    }
}

impl FromStr for EolRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "counter-system" | "countersystem" => Ok(Self::CounterSystem),
            "unix" | "lf" => Ok(Self::Unix),
            "windows" | "crlf" => Ok(Self::Windows),
            "classic" | "cr" => Ok(Self::Classic),
            _ => Err(Error::Configuration(format!("unknown line terminator rule: {}", s))),
        }
    }
}

/// Split decoded tag text into lines, accepting any of the three terminators
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find(['\r', '\n']) {
            Some(idx) => {
                lines.push(&rest[..idx]);
                let skip = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[idx + skip..];
            }
            None => {
                lines.push(rest);
                break;
            }
        }
    }
    lines
}
