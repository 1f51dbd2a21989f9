//! Media types, media ranges and charset transcoding.

use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use mime::Mime;

use crate::error::{Error, Result};

/// A parsed `type/subtype; param=value` media type.
///
/// Type, subtype, parameter names and the charset value are lowercased by
/// the parser; quoted parameter values are unquoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType(Mime);

impl MediaType {
    /// Parse a Content-Type value. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<Mime>().ok().map(Self)
    }

    pub fn kind(&self) -> &str {
        self.0.type_().as_str()
    }

    /// The full subtype, including any `+suffix`.
    pub fn subtype(&self) -> &str {
        let essence = self.0.essence_str();
        essence.split_once('/').map_or(essence, |(_, subtype)| subtype)
    }

    /// The structured-syntax suffix, `json` for `application/problem+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.0.suffix().map(|s| s.as_str())
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        self.0.essence_str().to_string()
    }

    /// Value of a parameter, matched case-insensitively.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.0.get_param(name).map(|v| v.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.0.get_param("charset").map(|v| v.as_str())
    }

    pub fn as_mime(&self) -> &Mime {
        &self.0
    }
}

impl From<Mime> for MediaType {
    fn from(mime: Mime) -> Self {
        Self(mime)
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MediaType::parse(s)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid media type '{s}'")))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A media range used for handler registration: `*/*`, `text/*`,
/// `application/json`, or a structured-syntax suffix such as `*/*+json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    kind: String,
    subtype: String,
}

impl MediaRange {
    /// Matches every media type, and responses without one.
    pub fn any() -> Self {
        Self {
            kind: "*".to_string(),
            subtype: "*".to_string(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let media = MediaType::parse(value)?;
        let (kind, subtype) = (media.kind(), media.subtype());
        if kind == "*" && subtype != "*" && !subtype.starts_with("*+") {
            return None;
        }
        Some(Self {
            kind: kind.to_string(),
            subtype: subtype.to_string(),
        })
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == "*" && self.subtype == "*"
    }

    pub fn matches(&self, media: &MediaType) -> bool {
        if self.is_wildcard() {
            return true;
        }
        if let Some(suffix) = self.subtype.strip_prefix("*+") {
            let kind_ok = self.kind == "*" || self.kind == media.kind();
            return kind_ok && media.suffix() == Some(suffix);
        }
        if self.kind != media.kind() {
            return false;
        }
        self.subtype == "*" || self.subtype == media.subtype()
    }

    /// Match an optional media type; only the full wildcard accepts `None`.
    pub fn matches_opt(&self, media: Option<&MediaType>) -> bool {
        match media {
            Some(media) => self.matches(media),
            None => self.is_wildcard(),
        }
    }
}

impl FromStr for MediaRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MediaRange::parse(s)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid media range '{s}'")))
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Look up a charset by its WHATWG label.
pub fn charset_encoding(charset: &str) -> Option<&'static Encoding> {
    Encoding::for_label(charset.trim().as_bytes())
}

fn require_encoding(charset: &str) -> Result<&'static Encoding> {
    charset_encoding(charset).ok_or_else(|| Error::processing(format!("unsupported charset '{charset}'")))
}

/// Decode body bytes with the named charset. Malformed input is an error,
/// and a byte order mark is treated as content.
pub(crate) fn decode_text(bytes: &[u8], charset: &str) -> Result<String> {
    let encoding = require_encoding(charset)?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| Error::processing(format!("body is not valid {}", encoding.name())))
}

/// Encode text with the named charset. Characters the charset cannot
/// represent are an error.
pub(crate) fn encode_text(text: &str, charset: &str) -> Result<Vec<u8>> {
    let encoding = require_encoding(charset)?;
    // encoding_rs only encodes to ASCII-compatible charsets.
    if encoding == UTF_16LE {
        return Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect());
    }
    if encoding == UTF_16BE {
        return Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect());
    }
    if encoding.output_encoding() != encoding {
        return Err(Error::processing(format!("cannot encode text as '{charset}'")));
    }
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(Error::processing(format!("text not representable in {}", encoding.name())));
    }
    Ok(bytes.into_owned())
}
