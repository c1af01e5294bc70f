// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::signer;
use thiserror::Error;

/// Result type used by x509 APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by x509 APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid PrintableString characters")]
    InvalidPrintableString,
    #[error("invalid IA5String characters")]
    InvalidIa5String,
    #[error("raw DN attribute bytes are not allowed for certificate issuance")]
    RawNameValueNotAllowedForIssuance,
    #[error("invalid distinguished name: {details}")]
    InvalidDistinguishedName { details: String },
    #[error("unknown distinguished name attribute: {name}")]
    UnknownNameAttribute { name: String },
    #[error("certificate {field} DN must not be empty")]
    EmptyDistinguishedName { field: &'static str },
    #[error("invalid certificate validity window: not_before must be < not_after")]
    InvalidValidity,
    #[error("certificate validity of {months} months is out of range")]
    ValidityOutOfRange { months: u32 },
    #[error("requested extension {oid} collides with an issuer controlled extension")]
    ConflictingExtension { oid: String },
    #[error("duplicate extension OID in certificate: {oid}")]
    DuplicateExtensionOid { oid: String },
    #[error("unsupported issuer key algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
    #[error("failed to generate certificate serial: {details}")]
    SerialGenerationFailed { details: String },
    #[error("remote signing failed: {0}")]
    Signing(#[from] signer::Error),
    #[error("PEM block is not a CERTIFICATE")]
    InvalidPemLabel,
    #[error(transparent)]
    Pem(#[from] crate::pem::Error),
    #[error("X.509 parse error: {details}")]
    X509Parse { details: String },
    #[error("certificate version must be X.509 v3")]
    UnsupportedCertificateVersion,
    #[error("certificate signature algorithm {oid} is not sha256WithRSAEncryption")]
    SignatureAlgorithmMismatch { oid: String },
    #[error("certificate signature does not verify against the issuer key")]
    InvalidSignature,
    #[error("issuer public key is unusable: {details}")]
    InvalidIssuerKey { details: String },
    #[error("failed to parse basicConstraints extension: {details}")]
    BasicConstraintsParse { details: String },
    #[error("failed to parse keyUsage extension: {details}")]
    KeyUsageParse { details: String },
    #[error("trailing data after DER certificate")]
    TrailingDerData,
    #[error("certificate validity contains pre-UNIX timestamp")]
    PreUnixTimestamp,
    #[error("certificate serial must not be empty")]
    EmptySerial,
    #[error("certificate serial must be positive")]
    NegativeSerial,
    #[error("certificate serial must use canonical DER INTEGER encoding")]
    NonCanonicalSerial,
    #[error("certificate serial must be non-zero")]
    ZeroSerial,
    #[error(transparent)]
    Der(#[from] der::Error),
    #[error(transparent)]
    Oid(#[from] const_oid::Error),
}
