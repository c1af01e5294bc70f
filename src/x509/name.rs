// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, Result};
use const_oid::ObjectIdentifier;
use der::{Tag, Tagged};
use der::asn1::{Any, SetOfVec};
use std::fmt;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

/// OID for CommonName (2.5.4.3).
pub const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
/// OID for SerialNumber (2.5.4.5).
pub const OID_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
/// OID for CountryName (2.5.4.6).
pub const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
/// OID for LocalityName (2.5.4.7).
pub const OID_L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
/// OID for StateOrProvinceName (2.5.4.8).
pub const OID_ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
/// OID for StreetAddress (2.5.4.9).
pub const OID_STREET: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
/// OID for OrganizationName (2.5.4.10).
pub const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
/// OID for OrganizationalUnitName (2.5.4.11).
pub const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
/// OID for emailAddress (1.2.840.113549.1.9.1).
pub const OID_EMAIL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");
/// OID for domainComponent (0.9.2342.19200300.100.1.25).
pub const OID_DC: ObjectIdentifier = ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.25");

// Short names accepted when parsing and emitted when rendering, in lookup order
const SHORT_NAMES: &[(&str, ObjectIdentifier)] = &[
    ("CN", OID_CN),
    ("SERIALNUMBER", OID_SERIAL_NUMBER),
    ("C", OID_C),
    ("L", OID_L),
    ("ST", OID_ST),
    ("S", OID_ST),
    ("STREET", OID_STREET),
    ("O", OID_O),
    ("OU", OID_OU),
    ("E", OID_EMAIL),
    ("EMAILADDRESS", OID_EMAIL),
    ("DC", OID_DC),
];

/// A DN attribute value encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameValue {
    /// UTF8String value.
    Utf8(String),
    /// PrintableString value (restricted ASCII subset from RFC 5280).
    Printable(String),
    /// IA5String value (7-bit ASCII).
    Ia5(String),
    /// Raw bytes for non-text or undecodable values.
    Bytes(Vec<u8>),
}

impl NameValue {
    fn as_any(&self) -> Result<Any> {
        match self {
            NameValue::Utf8(value) => Ok(Any::new(Tag::Utf8String, value.as_bytes())?),
            NameValue::Printable(value) => {
                if !is_printable_string(value) {
                    return Err(Error::InvalidPrintableString);
                }
                Ok(Any::new(Tag::PrintableString, value.as_bytes())?)
            }
            NameValue::Ia5(value) => {
                if !value.is_ascii() {
                    return Err(Error::InvalidIa5String);
                }
                Ok(Any::new(Tag::Ia5String, value.as_bytes())?)
            }
            NameValue::Bytes(_) => Err(Error::RawNameValueNotAllowedForIssuance),
        }
    }

    fn from_any(any: &Any) -> Self {
        let text = || String::from_utf8(any.value().to_vec()).ok();
        match any.tag() {
            Tag::Utf8String => text().map(NameValue::Utf8),
            Tag::PrintableString => text().map(NameValue::Printable),
            Tag::Ia5String => text().map(NameValue::Ia5),
            _ => None,
        }
        .unwrap_or_else(|| NameValue::Bytes(any.value().to_vec()))
    }

    /// Returns the textual value, if the attribute holds text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NameValue::Utf8(v) | NameValue::Printable(v) | NameValue::Ia5(v) => Some(v),
            NameValue::Bytes(_) => None,
        }
    }
}

pub(super) fn is_printable_string(value: &str) -> bool {
    value.as_bytes().iter().all(|b| {
        b.is_ascii_alphanumeric()
            || matches!(
                *b,
                b' ' | b'\'' | b'(' | b')' | b'+' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?'
            )
    })
}

/// A single DN attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameAttribute {
    /// Attribute OID (for example `2.5.4.3` for CN).
    pub oid: ObjectIdentifier,
    /// Encoded attribute value.
    pub value: NameValue,
}

/// Distinguished Name represented as ordered attributes, in encoding order
/// (most general first).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    /// Ordered list of RDN attributes.
    pub attrs: Vec<NameAttribute>,
}

impl DistinguishedName {
    /// Creates an empty DN.
    pub fn new() -> Self {
        Self { attrs: Vec::new() }
    }

    /// Adds a UTF8String CN attribute.
    pub fn cn(mut self, value: impl Into<String>) -> Self {
        self.attrs.push(NameAttribute {
            oid: OID_CN,
            value: NameValue::Utf8(value.into()),
        });
        self
    }

    /// Adds an arbitrary attribute.
    pub fn push(mut self, oid: ObjectIdentifier, value: NameValue) -> Self {
        self.attrs.push(NameAttribute { oid, value });
        self
    }

    /// Returns the first CN value, if any.
    pub fn common_name(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.oid == OID_CN)
            .and_then(|attr| attr.value.as_str())
    }

    /// Parses an RFC 4514 style string such as `CN=leaf.example.com, O=Acme, C=CH`.
    ///
    /// Attributes are listed most specific first, as in RFC 4514, and stored
    /// in encoding order. Values may be quoted or use backslash escapes;
    /// attribute types are short names or dotted OIDs.
    pub fn parse(text: &str) -> Result<Self> {
        let mut attrs = Vec::new();
        for component in split_unescaped(text)? {
            let (key, value) = component
                .split_once('=')
                .ok_or_else(|| Error::InvalidDistinguishedName {
                    details: format!("missing '=' in {component:?}"),
                })?;
            let oid = attribute_oid(key.trim())?;
            let value = unescape_value(value.trim())?;
            if value.is_empty() {
                return Err(Error::InvalidDistinguishedName {
                    details: format!("empty value for {}", key.trim()),
                });
            }
            let value = if oid == OID_C || oid == OID_SERIAL_NUMBER {
                NameValue::Printable(value)
            } else if oid == OID_EMAIL || oid == OID_DC {
                NameValue::Ia5(value)
            } else {
                NameValue::Utf8(value)
            };
            attrs.push(NameAttribute { oid, value });
        }
        if attrs.is_empty() {
            return Err(Error::InvalidDistinguishedName {
                details: "no attributes".to_string(),
            });
        }
        attrs.reverse();
        Ok(Self { attrs })
    }

    /// Converts a decoded X.509 name, keeping every attribute (multi-valued
    /// RDNs are flattened in order).
    pub fn from_x509_name(name: &Name) -> Self {
        let attrs = name
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(|atv| NameAttribute {
                oid: atv.oid,
                value: NameValue::from_any(&atv.value),
            })
            .collect();
        Self { attrs }
    }

    /// Builds the X.509 encoding, one attribute per RDN.
    pub fn to_x509_name(&self) -> Result<Name> {
        let mut rdns = Vec::with_capacity(self.attrs.len());
        for attr in &self.attrs {
            let mut set = SetOfVec::new();
            set.insert(AttributeTypeAndValue {
                oid: attr.oid,
                value: attr.value.as_any()?,
            })?;
            rdns.push(RelativeDistinguishedName::from(set));
        }
        Ok(RdnSequence(rdns))
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.attrs.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match SHORT_NAMES.iter().find(|(_, oid)| *oid == attr.oid) {
                Some((short, _)) => f.write_str(short)?,
                None => write!(f, "{}", attr.oid)?,
            }
            f.write_str("=")?;
            match &attr.value {
                NameValue::Bytes(bytes) => write!(f, "#{}", hex::encode(bytes))?,
                other => f.write_str(&escape_value(other.as_str().unwrap_or_default()))?,
            }
        }
        Ok(())
    }
}

fn attribute_oid(key: &str) -> Result<ObjectIdentifier> {
    let upper = key.to_ascii_uppercase();
    if let Some((_, oid)) = SHORT_NAMES.iter().find(|(short, _)| *short == upper) {
        return Ok(*oid);
    }
    if key.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(ObjectIdentifier::new(key)?);
    }
    Err(Error::UnknownNameAttribute {
        name: key.to_string(),
    })
}

// Splits on ',' or ';' outside of quotes and escapes
fn split_unescaped(text: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                let next = chars.next().ok_or_else(|| Error::InvalidDistinguishedName {
                    details: "dangling escape".to_string(),
                })?;
                current.push(next);
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' | ';' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if quoted {
        return Err(Error::InvalidDistinguishedName {
            details: "unterminated quote".to_string(),
        });
    }
    parts.push(current);

    Ok(parts
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect())
}

fn unescape_value(raw: &str) -> Result<String> {
    let raw = match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => inner,
        None => raw,
    };
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let next = chars.next().ok_or_else(|| Error::InvalidDistinguishedName {
                details: "dangling escape".to_string(),
            })?;
            out.push(next);
        } else if c != '"' {
            out.push(c);
        }
    }
    Ok(out)
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let edge = i == 0 && (c == ' ' || c == '#') || i + 1 == value.chars().count() && c == ' ';
        if edge || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
