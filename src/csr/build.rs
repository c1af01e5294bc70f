// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, OID_EXTENSION_REQUEST, Result};
use crate::signer::OID_SHA256_WITH_RSA;
use crate::x509::{DistinguishedName, NameValue, OID_C, OID_L, OID_O, OID_OU, OID_ST};
use crate::{pem, rsa};
use der::asn1::{Any, BitString, SetOfVec};
use der::{Decode, Encode};
use serde::Deserialize;
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::{Attribute, Attributes};
use x509_cert::ext::Extension;
use x509_cert::request::{CertReq, CertReqInfo, Version};

/// Subject fields of a request to generate.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CsrSubject {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    /// Two letter ISO 3166 country code.
    pub country: Option<String>,
}

impl CsrSubject {
    /// Creates a subject with only a common name.
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    /// Validates the fields and builds the DN. Blank optional fields are left out.
    pub fn to_distinguished_name(&self) -> Result<DistinguishedName> {
        let common_name = self.common_name.trim();
        if common_name.is_empty() {
            return Err(Error::Validation {
                field: "common_name",
                details: "must not be empty".to_string(),
            });
        }
        let mut name = DistinguishedName::new();

        if let Some(country) = present(&self.country) {
            if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err(Error::Validation {
                    field: "country",
                    details: format!("{country:?} is not a two letter code"),
                });
            }
            name = name.push(OID_C, NameValue::Printable(country.to_ascii_uppercase()));
        }
        for (oid, value) in [
            (OID_ST, &self.state),
            (OID_L, &self.locality),
            (OID_O, &self.organization),
            (OID_OU, &self.organizational_unit),
        ] {
            if let Some(value) = present(value) {
                name = name.push(oid, NameValue::Utf8(value.to_string()));
            }
        }
        Ok(name.cn(common_name))
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Builds a DER request for `subject`, self-signed with `key` (RSA with
/// SHA-256). Non-empty `extensions` are placed in an extensionRequest attribute.
pub fn generate(
    subject: &DistinguishedName,
    key: &rsa::SecretKey,
    extensions: &[Extension],
) -> Result<Vec<u8>> {
    if subject.attrs.is_empty() {
        return Err(Error::Validation {
            field: "subject",
            details: "must not be empty".to_string(),
        });
    }
    let mut attributes = Attributes::new();
    if !extensions.is_empty() {
        let requested = Any::from_der(&extensions.to_vec().to_der()?)?;
        let mut values = SetOfVec::new();
        values.insert(requested)?;
        attributes.insert(Attribute {
            oid: OID_EXTENSION_REQUEST,
            values,
        })?;
    }
    let info = CertReqInfo {
        version: Version::V1,
        subject: subject.to_x509_name()?,
        public_key: key.public_key().to_spki()?,
        attributes,
    };
    let signature = key.sign(&info.to_der()?)?;

    let request = CertReq {
        info,
        algorithm: AlgorithmIdentifierOwned {
            oid: OID_SHA256_WITH_RSA,
            parameters: Some(Any::null()),
        },
        signature: BitString::from_bytes(&signature)?,
    };
    Ok(request.to_der()?)
}

/// Same as [`generate`], PEM encoded.
pub fn generate_pem(
    subject: &DistinguishedName,
    key: &rsa::SecretKey,
    extensions: &[Extension],
) -> Result<String> {
    Ok(pem::encode(
        "CERTIFICATE REQUEST",
        &generate(subject, key, extensions)?,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::csr::decode;

    /// Verifies that fields land in encoding order with the common name last.
    #[test]
    fn test_subject_fields() {
        let subject = CsrSubject {
            common_name: " leaf.example.com ".to_string(),
            organization: Some("Acme".to_string()),
            organizational_unit: Some("  ".to_string()),
            locality: Some("Zug".to_string()),
            state: None,
            country: Some("ch".to_string()),
        };
        let name = subject.to_distinguished_name().unwrap();
        assert_eq!(name.to_string(), "CN=leaf.example.com, O=Acme, L=Zug, C=CH");
    }

    #[test]
    fn test_subject_validation() {
        assert!(matches!(
            CsrSubject::new("   ").to_distinguished_name(),
            Err(Error::Validation {
                field: "common_name",
                ..
            })
        ));
        for country in ["CHE", "C1", "é"] {
            let subject = CsrSubject {
                country: Some(country.to_string()),
                ..CsrSubject::new("leaf")
            };
            assert!(matches!(
                subject.to_distinguished_name(),
                Err(Error::Validation {
                    field: "country",
                    ..
                })
            ));
        }
    }

    /// Verifies that a generated PEM request decodes back to the same subject.
    #[test]
    fn test_generate_pem() {
        let key = rsa::SecretKey::generate(2048).unwrap();
        let subject = CsrSubject::new("pem.example.com")
            .to_distinguished_name()
            .unwrap();

        let pem_text = generate_pem(&subject, &key, &[]).unwrap();
        assert!(pem_text.starts_with("-----BEGIN CERTIFICATE REQUEST-----\n"));

        let request = decode(pem_text.as_bytes()).unwrap();
        assert_eq!(request.subject_name(), subject);
    }

    #[test]
    fn test_generate_rejects_empty_subject() {
        let key = rsa::SecretKey::generate(2048).unwrap();
        assert!(matches!(
            generate(&DistinguishedName::new(), &key, &[]),
            Err(Error::Validation {
                field: "subject",
                ..
            })
        ));
    }
}
