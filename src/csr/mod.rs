// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! PKCS#10 certificate signing requests.
//!
//! https://datatracker.ietf.org/doc/html/rfc2986
//!
//! Requests are accepted as DER or PEM, and are only handed out after their
//! self-signature verified against the embedded public key. Extensions the
//! requester asked for are kept aside as untrusted data; whether any of them
//! reach a certificate is the issuer's decision.

mod build;
mod error;

pub use build::{CsrSubject, generate, generate_pem};
pub use error::{Error, Result};

use crate::pem;
use crate::signer::{KeyAlgorithm, OID_SHA256_WITH_RSA};
use crate::x509::DistinguishedName;
use ::rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use ::rsa::signature::Verifier;
use ::rsa::traits::PublicKeyParts;
use ::rsa::{BigUint, RsaPublicKey};
use const_oid::ObjectIdentifier;
use der::asn1::AnyRef;
use der::{Decode, Encode, Reader, SliceReader};
use serde::Serialize;
use sha2::{Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, DecodePublicKey, SubjectPublicKeyInfoOwned};
use x509_cert::ext::Extensions;
use x509_cert::name::Name;
use x509_cert::request::CertReq;

/// OID of the PKCS#9 extensionRequest attribute (1.2.840.113549.1.9.14).
pub const OID_EXTENSION_REQUEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");

const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// PEM labels accepted for requests.
pub const PEM_LABELS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

/// Smallest RSA modulus accepted in a request.
pub const MIN_RSA_BITS: usize = 2048;

/// Largest RSA modulus accepted in a request.
pub const MAX_RSA_BITS: usize = 16384;

/// An extension found in the request's extensionRequest attribute. Nothing
/// about it has been vetted beyond being well formed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestedExtension {
    /// Extension OID.
    pub oid: ObjectIdentifier,
    /// Criticality flag as requested.
    pub critical: bool,
    /// DER payload (contents of the extnValue OCTET STRING).
    pub value: Vec<u8>,
}

/// A decoded certificate request whose self-signature has been verified.
#[derive(Clone, Debug)]
pub struct CertificationRequest {
    subject: Name,
    public_key: SubjectPublicKeyInfoOwned,
    key_algorithm: KeyAlgorithm,
    key_bits: usize,
    requested_extensions: Vec<RequestedExtension>,
    signature_algorithm: AlgorithmIdentifierOwned,
    signature: Vec<u8>,
    info: Vec<u8>,
}

/// Human readable description of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CsrSummary {
    /// Subject DN, most specific attribute first.
    pub subject: String,
    /// Key family, `RSA` or `EC P-256`.
    pub key_algorithm: String,
    /// Key size in bits.
    pub key_size: usize,
    /// Signature algorithm name (or dotted OID when unknown).
    pub signature_algorithm: String,
    /// Dotted OIDs of the requested extensions.
    pub requested_extensions: Vec<String>,
}

impl CertificationRequest {
    /// Subject DN exactly as encoded in the request.
    pub fn subject(&self) -> &Name {
        &self.subject
    }

    /// Subject DN in attribute form.
    pub fn subject_name(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.subject)
    }

    /// Subject public key exactly as encoded in the request.
    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.public_key
    }

    /// Key family of the subject public key.
    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    /// Key size in bits.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Untrusted extensions requested by the subject.
    pub fn requested_extensions(&self) -> &[RequestedExtension] {
        &self.requested_extensions
    }

    /// Algorithm of the self-signature.
    pub fn signature_algorithm(&self) -> &AlgorithmIdentifierOwned {
        &self.signature_algorithm
    }

    /// Self-signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// DER of the signed CertificationRequestInfo.
    pub fn info_der(&self) -> &[u8] {
        &self.info
    }

    /// Describes the request for display.
    pub fn summary(&self) -> CsrSummary {
        let oid = self.signature_algorithm.oid;
        CsrSummary {
            subject: self.subject_name().to_string(),
            key_algorithm: self.key_algorithm.to_string(),
            key_size: self.key_bits,
            signature_algorithm: const_oid::db::DB
                .by_oid(&oid)
                .map_or_else(|| oid.to_string(), str::to_string),
            requested_extensions: self
                .requested_extensions
                .iter()
                .map(|ext| ext.oid.to_string())
                .collect(),
        }
    }
}

/// Decodes a PEM or DER request and verifies its self-signature.
///
/// Input containing a `CERTIFICATE REQUEST` (or `NEW CERTIFICATE REQUEST`)
/// PEM block is decoded as PEM, anything else is taken as DER.
pub fn decode(input: &[u8]) -> Result<CertificationRequest> {
    let der = if PEM_LABELS
        .iter()
        .any(|label| pem::contains_block(input, label))
    {
        pem::decode_kind(input, &PEM_LABELS).map_err(Error::malformed)?
    } else {
        input.to_vec()
    };
    if der.is_empty() {
        return Err(Error::malformed("empty input"));
    }
    decode_der(&der)
}

fn decode_der(der: &[u8]) -> Result<CertificationRequest> {
    let request = CertReq::from_der(der).map_err(Error::malformed)?;
    let info = signed_info(der).map_err(Error::malformed)?;

    let (key_algorithm, key_bits) = classify_key(&request.info.public_key)?;

    let signature = request
        .signature
        .as_bytes()
        .ok_or_else(|| Error::malformed("signature has unused bits"))?;
    verify_self_signature(
        key_algorithm,
        &request.info.public_key,
        &request.algorithm,
        info,
        signature,
    )?;

    let mut requested_extensions = Vec::new();
    for attr in request.info.attributes.iter() {
        if attr.oid != OID_EXTENSION_REQUEST {
            continue;
        }
        for value in attr.values.iter() {
            let extensions = Extensions::from_der(&value.to_der()?).map_err(Error::malformed)?;
            requested_extensions.extend(extensions.into_iter().map(|ext| RequestedExtension {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.into_bytes(),
            }));
        }
    }

    Ok(CertificationRequest {
        subject: request.info.subject,
        public_key: request.info.public_key,
        key_algorithm,
        key_bits,
        requested_extensions,
        signature_algorithm: request.algorithm,
        signature: signature.to_vec(),
        info: info.to_vec(),
    })
}

// Raw CertificationRequestInfo TLV, exactly as signed
fn signed_info(der: &[u8]) -> der::Result<&[u8]> {
    let outer = AnyRef::from_der(der)?;
    let mut reader = SliceReader::new(outer.value())?;
    reader.tlv_bytes()
}

fn classify_key(spki: &SubjectPublicKeyInfoOwned) -> Result<(KeyAlgorithm, usize)> {
    match KeyAlgorithm::from_spki(spki) {
        Some(KeyAlgorithm::Rsa) => {
            let key = rsa_public_key(spki)?;
            Ok((KeyAlgorithm::Rsa, modulus_bits(key.n())))
        }
        Some(KeyAlgorithm::EcP256) => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .map(|params| params.decode_as::<ObjectIdentifier>())
                .transpose()
                .map_err(Error::malformed)?;
            if curve != Some(OID_SECP256R1) {
                return Err(Error::UnsupportedKeyAlgorithm {
                    algorithm: format!(
                        "EC {}",
                        curve.map_or_else(|| "without curve".to_string(), |oid| oid.to_string())
                    ),
                });
            }
            Ok((KeyAlgorithm::EcP256, 256))
        }
        None => Err(Error::UnsupportedKeyAlgorithm {
            algorithm: spki.algorithm.oid.to_string(),
        }),
    }
}

// Size is checked on the exact modulus length, ahead of the rsa crate's own
// 4096-bit parse ceiling.
fn rsa_public_key(spki: &SubjectPublicKeyInfoOwned) -> Result<RsaPublicKey> {
    let raw = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| Error::malformed("public key has unused bits"))?;
    let parts = ::rsa::pkcs1::RsaPublicKey::from_der(raw).map_err(Error::malformed)?;

    let n = BigUint::from_bytes_be(parts.modulus.as_bytes());
    let bits = modulus_bits(&n);
    if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
        return Err(Error::UnsupportedKeyAlgorithm {
            algorithm: format!("RSA-{bits}"),
        });
    }
    let e = BigUint::from_bytes_be(parts.public_exponent.as_bytes());
    RsaPublicKey::new_with_max_size(n, e, MAX_RSA_BITS).map_err(Error::malformed)
}

fn modulus_bits(n: &BigUint) -> usize {
    n.bits() as usize
}

fn verify_self_signature(
    key_algorithm: KeyAlgorithm,
    spki: &SubjectPublicKeyInfoOwned,
    algorithm: &AlgorithmIdentifierOwned,
    info: &[u8],
    signature: &[u8],
) -> Result<()> {
    let unsupported = || Error::UnsupportedSignatureAlgorithm {
        oid: algorithm.oid.to_string(),
    };
    match key_algorithm {
        KeyAlgorithm::Rsa => {
            let key = rsa_public_key(spki)?;
            let signature =
                RsaSignature::try_from(signature).map_err(|_| Error::InvalidSelfSignature)?;
            let result = if algorithm.oid == OID_SHA256_WITH_RSA {
                RsaVerifyingKey::<Sha256>::new(key).verify(info, &signature)
            } else if algorithm.oid == OID_SHA384_WITH_RSA {
                RsaVerifyingKey::<Sha384>::new(key).verify(info, &signature)
            } else if algorithm.oid == OID_SHA512_WITH_RSA {
                RsaVerifyingKey::<Sha512>::new(key).verify(info, &signature)
            } else {
                return Err(unsupported());
            };
            result.map_err(|_| Error::InvalidSelfSignature)
        }
        KeyAlgorithm::EcP256 => {
            if algorithm.oid != OID_ECDSA_WITH_SHA256 {
                return Err(unsupported());
            }
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki.to_der()?)
                .map_err(Error::malformed)?;
            let signature = p256::ecdsa::DerSignature::try_from(signature)
                .map_err(|_| Error::InvalidSelfSignature)?;
            key.verify(info, &signature)
                .map_err(|_| Error::InvalidSelfSignature)
        }
    }
}
