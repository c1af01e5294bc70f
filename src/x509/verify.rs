// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{CertificateMetadata, DistinguishedName, Error, Result, ValidityWindow};
use crate::pem;
use crate::rsa;
use crate::signer::OID_SHA256_WITH_RSA;
use const_oid::ObjectIdentifier;
use der::Decode;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::ext::pkix::{KeyUsage, KeyUsages};
use x509_cert::name::Name;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;

/// Verifies that a DER certificate was signed by `issuer` (RSA with SHA-256)
/// and returns its metadata.
pub fn verify_signed_by(
    der: &[u8],
    issuer: &SubjectPublicKeyInfoOwned,
) -> Result<CertificateMetadata> {
    let cert = parse_certificate(der)?;
    if cert.tbs_certificate.version != x509_parser::x509::X509Version::V3 {
        return Err(Error::UnsupportedCertificateVersion);
    }
    // Signature algorithm must match both at certificate and TBSCertificate level
    let outer_sig_alg = cert.signature_algorithm.algorithm.to_id_string();
    let tbs_sig_alg = cert.tbs_certificate.signature.algorithm.to_id_string();
    let expected_sig_alg = OID_SHA256_WITH_RSA.to_string();
    if outer_sig_alg != expected_sig_alg {
        return Err(Error::SignatureAlgorithmMismatch { oid: outer_sig_alg });
    }
    if tbs_sig_alg != expected_sig_alg {
        return Err(Error::SignatureAlgorithmMismatch { oid: tbs_sig_alg });
    }

    let issuer = rsa::PublicKey::from_spki(issuer).map_err(|e| Error::InvalidIssuerKey {
        details: e.to_string(),
    })?;
    issuer
        .verify(cert.tbs_certificate.as_ref(), &cert.signature_value.data)
        .map_err(|_| Error::InvalidSignature)?;

    extract_meta(&cert)
}

/// Parses a DER certificate without checking its signature.
pub fn inspect_certificate(der: &[u8]) -> Result<CertificateMetadata> {
    extract_meta(&parse_certificate(der)?)
}

/// Extracts the DER payload of a single `CERTIFICATE` PEM block.
pub fn decode_certificate_pem(pem_data: &str) -> Result<Vec<u8>> {
    let (label, der) = pem::decode(pem_data.as_bytes())?;
    if label != "CERTIFICATE" {
        return Err(Error::InvalidPemLabel);
    }
    Ok(der)
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (rem, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| Error::X509Parse {
        details: e.to_string(),
    })?;
    if !rem.is_empty() {
        return Err(Error::TrailingDerData);
    }
    Ok(cert)
}

fn extract_meta(cert: &X509Certificate<'_>) -> Result<CertificateMetadata> {
    let serial = cert.tbs_certificate.raw_serial();
    validate_serial_encoding(serial)?;

    let (is_ca, path_len) = match cert.tbs_certificate.basic_constraints().map_err(|e| {
        Error::BasicConstraintsParse {
            details: e.to_string(),
        }
    })? {
        Some(ext) => (ext.value.ca, ext.value.path_len_constraint),
        None => (false, None),
    };
    let key_usage = cert
        .tbs_certificate
        .key_usage()
        .map_err(|e| Error::KeyUsageParse {
            details: e.to_string(),
        })?
        .map(|ku| parse_key_usage_flags(ku.value.flags))
        .transpose()?;

    let mut subject_key_id = None;
    let mut authority_key_id = None;
    let mut extensions = Vec::new();
    for ext in cert.tbs_certificate.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(keyid) => {
                subject_key_id = Some(keyid.0.to_vec());
            }
            ParsedExtension::AuthorityKeyIdentifier(akid) => {
                authority_key_id = akid.key_identifier.as_ref().map(|kid| kid.0.to_vec());
            }
            _ => {}
        }
        extensions.push(ObjectIdentifier::new(ext.oid.to_id_string().as_str())?);
    }

    Ok(CertificateMetadata {
        serial: serial.to_vec(),
        subject: parse_name(&cert.tbs_certificate.subject)?,
        issuer: parse_name(&cert.tbs_certificate.issuer)?,
        validity: ValidityWindow {
            not_before: unix_ts_to_u64(cert.tbs_certificate.validity.not_before.timestamp())?,
            not_after: unix_ts_to_u64(cert.tbs_certificate.validity.not_after.timestamp())?,
        },
        is_ca,
        path_len,
        key_usage,
        subject_key_id,
        authority_key_id,
        extensions,
        public_key: SubjectPublicKeyInfoOwned::from_der(cert.tbs_certificate.subject_pki.raw)?,
    })
}

// Decodes through x509-cert to keep the string types of every attribute
fn parse_name(name: &x509_parser::x509::X509Name<'_>) -> Result<DistinguishedName> {
    Ok(DistinguishedName::from_x509_name(&Name::from_der(
        name.as_raw(),
    )?))
}

/// Converts parsed timestamp to `u64`, rejecting pre-UNIX values.
fn unix_ts_to_u64(ts: i64) -> Result<u64> {
    u64::try_from(ts).map_err(|_| Error::PreUnixTimestamp)
}

/// Validates DER INTEGER canonicality constraints for serial numbers.
pub(crate) fn validate_serial_encoding(serial: &[u8]) -> Result<()> {
    if serial.is_empty() {
        return Err(Error::EmptySerial);
    }
    if serial[0] & 0x80 != 0 {
        return Err(Error::NegativeSerial);
    }
    if serial.len() > 1 && serial[0] == 0x00 && serial[1] & 0x80 == 0 {
        return Err(Error::NonCanonicalSerial);
    }
    if serial.iter().all(|b| *b == 0) {
        return Err(Error::ZeroSerial);
    }
    Ok(())
}

fn parse_key_usage_flags(flags: u16) -> Result<KeyUsage> {
    const ALL_KNOWN_BITS: u16 = (1 << 9) - 1;
    if flags & !ALL_KNOWN_BITS != 0 {
        return Err(Error::KeyUsageParse {
            details: "invalid keyUsage flags: unknown bits set".to_string(),
        });
    }
    const BITS: [KeyUsages; 9] = [
        KeyUsages::DigitalSignature,
        KeyUsages::NonRepudiation,
        KeyUsages::KeyEncipherment,
        KeyUsages::DataEncipherment,
        KeyUsages::KeyAgreement,
        KeyUsages::KeyCertSign,
        KeyUsages::CRLSign,
        KeyUsages::EncipherOnly,
        KeyUsages::DecipherOnly,
    ];
    let mut parsed = der::flagset::FlagSet::<KeyUsages>::default();
    for (bit, usage) in BITS.into_iter().enumerate() {
        if flags & (1 << bit) != 0 {
            parsed |= usage;
        }
    }
    Ok(KeyUsage(parsed))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate_serial_encoding() {
        assert!(matches!(validate_serial_encoding(&[]), Err(Error::EmptySerial)));
        assert!(matches!(
            validate_serial_encoding(&[0x80]),
            Err(Error::NegativeSerial)
        ));
        assert!(matches!(
            validate_serial_encoding(&[0x00, 0x7f]),
            Err(Error::NonCanonicalSerial)
        ));
        assert!(matches!(validate_serial_encoding(&[0x00]), Err(Error::ZeroSerial)));
        assert!(validate_serial_encoding(&[0x00, 0x80]).is_ok());
        assert!(validate_serial_encoding(&[0x01]).is_ok());
    }

    /// Verifies that keyUsage bit positions map onto the matching flags.
    #[test]
    fn test_parse_key_usage_flags() {
        let usage = parse_key_usage_flags((1 << 0) | (1 << 5) | (1 << 6)).unwrap();
        assert_eq!(
            usage.0,
            KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign
        );
        assert!(parse_key_usage_flags(1 << 9).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            inspect_certificate(b"not a certificate"),
            Err(Error::X509Parse { .. })
        ));
    }

    #[test]
    fn test_decode_certificate_pem_label() {
        let pem = pem::encode("CERTIFICATE REQUEST", &[0x30, 0x00]);
        assert!(matches!(
            decode_certificate_pem(&pem),
            Err(Error::InvalidPemLabel)
        ));
        let pem = pem::encode("CERTIFICATE", &[0x30, 0x00]);
        assert_eq!(decode_certificate_pem(&pem).unwrap(), vec![0x30, 0x00]);
    }
}
