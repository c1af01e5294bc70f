// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::utils::spki_key_identifier;
use super::{
    CertificateProfile, Error, ExtensionPolicy, IssuerIdentity, Result, SignedCertificate,
    ValidityWindow,
};
use crate::csr::{CertificationRequest, RequestedExtension};
use crate::rand;
use crate::signer::{HashAlg, KeyAlgorithm, KeyReference, RemoteKeySigner};
use const_oid::ObjectIdentifier;
use const_oid::db::rfc5280::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_BASIC_CONSTRAINTS, ID_CE_KEY_USAGE,
    ID_CE_SUBJECT_KEY_IDENTIFIER,
};
use der::asn1::{BitString, Int, OctetString};
use der::{Decode, Encode};
use std::collections::HashSet;
use tracing::debug;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier,
};
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

/// Number of random bytes drawn for every certificate serial.
pub const SERIAL_ENTROPY_BYTES: usize = 20;

// Extensions the issuer always writes itself
const ISSUER_CONTROLLED: [ObjectIdentifier; 4] = [
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_KEY_USAGE,
    ID_CE_SUBJECT_KEY_IDENTIFIER,
    ID_CE_AUTHORITY_KEY_IDENTIFIER,
];

/// Signer and subject halves of a certificate to assemble.
struct Parties<'a> {
    issuer_name: &'a Name,
    issuer_key: &'a KeyReference,
    issuer_public_key: &'a SubjectPublicKeyInfoOwned,
    authority_key_id: &'a [u8],
    subject: &'a Name,
    subject_public_key: &'a SubjectPublicKeyInfoOwned,
    requested: &'a [RequestedExtension],
}

/// Issues a certificate for a verified CSR, signed by a custody held issuer key.
///
/// Subject DN and public key are copied verbatim from the request; the issuer
/// DN is the issuer certificate's subject. Requested extensions are dropped
/// unless allowed by `policy`.
pub async fn issue(
    signer: &dyn RemoteKeySigner,
    issuer: &IssuerIdentity,
    request: &CertificationRequest,
    validity: ValidityWindow,
    policy: &ExtensionPolicy,
) -> Result<SignedCertificate> {
    let parties = Parties {
        issuer_name: &issuer.subject,
        issuer_key: &issuer.key,
        issuer_public_key: &issuer.public_key,
        authority_key_id: &issuer.key_identifier,
        subject: request.subject(),
        subject_public_key: request.public_key(),
        requested: request.requested_extensions(),
    };
    assemble(signer, parties, validity, policy).await
}

/// Issues a self-signed certificate for a custody held key.
pub async fn self_sign(
    signer: &dyn RemoteKeySigner,
    key: &KeyReference,
    subject: &Name,
    public_key: &SubjectPublicKeyInfoOwned,
    validity: ValidityWindow,
    policy: &ExtensionPolicy,
) -> Result<SignedCertificate> {
    let key_id = spki_key_identifier(public_key);
    let parties = Parties {
        issuer_name: subject,
        issuer_key: key,
        issuer_public_key: public_key,
        authority_key_id: &key_id,
        subject,
        subject_public_key: public_key,
        requested: &[],
    };
    assemble(signer, parties, validity, policy).await
}

async fn assemble(
    signer: &dyn RemoteKeySigner,
    parties: Parties<'_>,
    validity: ValidityWindow,
    policy: &ExtensionPolicy,
) -> Result<SignedCertificate> {
    // Sanity check some mandatory fields
    if parties.subject.0.is_empty() {
        return Err(Error::EmptyDistinguishedName { field: "subject" });
    }
    if parties.issuer_name.0.is_empty() {
        return Err(Error::EmptyDistinguishedName { field: "issuer" });
    }
    if validity.not_before >= validity.not_after {
        return Err(Error::InvalidValidity);
    }
    // Only RSA issuer keys are supported
    let algorithm = KeyAlgorithm::from_spki(parties.issuer_public_key);
    if algorithm != Some(KeyAlgorithm::Rsa) {
        return Err(Error::UnsupportedAlgorithm {
            algorithm: algorithm.map_or_else(
                || parties.issuer_public_key.algorithm.oid.to_string(),
                |alg| alg.to_string(),
            ),
        });
    }
    let signature_alg = AlgorithmIdentifierOwned::from_der(
        &signer.algorithm_identifier(KeyAlgorithm::Rsa, HashAlg::Sha256)?,
    )?;

    let serial_number = generate_serial()?;
    let extensions = build_extensions(&parties, policy)?;

    // Assemble the certificate content
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number,
        signature: signature_alg.clone(),
        issuer: parties.issuer_name.clone(),
        validity: validity.to_validity()?,
        subject: parties.subject.clone(),
        subject_public_key_info: parties.subject_public_key.clone(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    // Sign the canonical DER encoding of TBSCertificate remotely
    let tbs_der = tbs_certificate.to_der()?;
    let digest = HashAlg::Sha256.digest(&tbs_der);
    debug!(
        serial = %hex::encode(tbs_certificate.serial_number.as_bytes()),
        tbs_len = tbs_der.len(),
        backend = signer.backend(),
        "requesting remote signature"
    );
    let signature = signer
        .sign(parties.issuer_key, &digest, HashAlg::Sha256)
        .await?;

    let certificate = Certificate {
        tbs_certificate,
        signature_algorithm: signature_alg,
        signature: BitString::from_bytes(&signature)?,
    };
    let der = certificate.to_der()?;
    Ok(SignedCertificate { certificate, der })
}

/// Builds the issuer controlled extensions followed by allowed requested ones.
fn build_extensions(parties: &Parties<'_>, policy: &ExtensionPolicy) -> Result<Vec<Extension>> {
    let subject = parties.subject;
    let mut extensions = Vec::<Extension>::new();
    let mut extension_oids = HashSet::new();

    let (is_ca, path_len) = match &policy.profile {
        CertificateProfile::EndEntity => (false, None),
        CertificateProfile::CertificateAuthority { path_len } => (true, *path_len),
    };
    let bc = BasicConstraints {
        ca: is_ca,
        path_len_constraint: path_len,
    };
    let key_usage = policy
        .key_usage
        .unwrap_or_else(|| default_key_usage(&policy.profile, parties.subject_public_key));
    let ski = SubjectKeyIdentifier(OctetString::new(spki_key_identifier(
        parties.subject_public_key,
    ))?);
    let aki = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(parties.authority_key_id)?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };

    let ext = bc.to_extension(subject, &extensions)?;
    extensions.push(ext);
    let ext = key_usage.to_extension(subject, &extensions)?;
    extensions.push(ext);
    let ext = ski.to_extension(subject, &extensions)?;
    extensions.push(ext);
    let ext = aki.to_extension(subject, &extensions)?;
    extensions.push(ext);
    extension_oids.extend(ISSUER_CONTROLLED);

    // Copy requested extensions only when the policy allows them
    for requested in parties.requested {
        if !policy.allowed_requested.contains(&requested.oid) {
            debug!(oid = %requested.oid, "dropping requested extension");
            continue;
        }
        let oid = requested.oid.to_string();
        if ISSUER_CONTROLLED.contains(&requested.oid) {
            return Err(Error::ConflictingExtension { oid });
        }
        if !extension_oids.insert(requested.oid) {
            return Err(Error::DuplicateExtensionOid { oid });
        }
        extensions.push(Extension {
            extn_id: requested.oid,
            critical: requested.critical,
            extn_value: OctetString::new(requested.value.clone())?,
        });
    }
    Ok(extensions)
}

fn default_key_usage(profile: &CertificateProfile, subject: &SubjectPublicKeyInfoOwned) -> KeyUsage {
    match profile {
        CertificateProfile::CertificateAuthority { .. } => {
            KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign)
        }
        CertificateProfile::EndEntity => match KeyAlgorithm::from_spki(subject) {
            Some(KeyAlgorithm::Rsa) => {
                KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
            }
            _ => KeyUsage(KeyUsages::DigitalSignature.into()),
        },
    }
}

/// Draws a fresh random serial, redrawing the (astronomically unlikely) zero.
fn generate_serial() -> Result<SerialNumber> {
    loop {
        let raw = rand::generate(SERIAL_ENTROPY_BYTES).map_err(|e| {
            Error::SerialGenerationFailed {
                details: e.to_string(),
            }
        })?;
        if let Some(content) = positive_serial(&raw) {
            // SerialNumber::new caps encodings at 20 octets, decoding admits
            // the extra sign octet
            let encoded = Int::new(&content)?.to_der()?;
            return Ok(SerialNumber::from_der(&encoded)?);
        }
    }
}

/// Turns random bytes into the content octets of a positive, minimally
/// encoded DER INTEGER: leading zero bytes are stripped and a 0x00 is
/// prepended when the high bit is set. Returns `None` for an all-zero input.
pub fn positive_serial(raw: &[u8]) -> Option<Vec<u8>> {
    let start = raw.iter().position(|b| *b != 0)?;

    let mut content = Vec::with_capacity(raw.len() - start + 1);
    if raw[start] & 0x80 != 0 {
        content.push(0x00);
    }
    content.extend_from_slice(&raw[start..]);
    Some(content)
}
