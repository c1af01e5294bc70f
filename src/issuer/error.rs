// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::signer::SigningFailureKind;
use crate::{config, csr, signer, x509};
use thiserror::Error;

/// Result type used by issuer APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by issuer APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Csr(#[from] csr::Error),
    #[error(transparent)]
    Certificate(#[from] x509::Error),
    #[error(transparent)]
    Custody(#[from] signer::Error),
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("issuer {name} not found")]
    NotFound { name: String },
    #[error("invalid {field}: {details}")]
    Validation {
        field: &'static str,
        details: String,
    },
    #[error("issuer name {name} is already in use")]
    NameInUse { name: String },
    #[error("invalid PKCS#12 container: {details}")]
    Pkcs12 { details: String },
    #[error("issuer store failure: {details}")]
    Store { details: String },
    #[error("entropy source failed: {0}")]
    Entropy(#[from] getrandom::Error),
}

/// Coarse error classes a caller renders or builds policy on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed PEM, DER or container input.
    Parse,
    /// A CSR failed its proof-of-possession check.
    InvalidSelfSignature,
    /// A key type or digest is not implemented.
    UnsupportedAlgorithm,
    /// A caller supplied value was refused.
    Validation,
    /// The custody service failed the call.
    SigningFailure(SigningFailureKind),
    /// No active issuer carries the name.
    NotFound,
    /// Anything else; not actionable by the caller.
    Internal,
}

impl Error {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Csr(err) => csr_kind(err),
            Error::Certificate(err) => certificate_kind(err),
            Error::Custody(err) => custody_kind(err),
            Error::Config(_) | Error::Validation { .. } | Error::NameInUse { .. } => {
                ErrorKind::Validation
            }
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Pkcs12 { .. } => ErrorKind::Parse,
            Error::Store { .. } | Error::Entropy(_) => ErrorKind::Internal,
        }
    }

    /// Reports whether the caller may retry with backoff. Nothing in this
    /// crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::SigningFailure(kind) => kind.is_retryable(),
            _ => false,
        }
    }
}

fn csr_kind(err: &csr::Error) -> ErrorKind {
    match err {
        csr::Error::MalformedEncoding { .. } | csr::Error::Der(_) => ErrorKind::Parse,
        csr::Error::UnsupportedKeyAlgorithm { .. }
        | csr::Error::UnsupportedSignatureAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
        csr::Error::InvalidSelfSignature => ErrorKind::InvalidSelfSignature,
        csr::Error::Validation { .. } | csr::Error::Name(_) => ErrorKind::Validation,
        csr::Error::Key(_) => ErrorKind::Internal,
    }
}

fn certificate_kind(err: &x509::Error) -> ErrorKind {
    use x509::Error as E;

    match err {
        E::Signing(err) => custody_kind(err),
        E::UnsupportedAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
        E::InvalidPrintableString
        | E::InvalidIa5String
        | E::RawNameValueNotAllowedForIssuance
        | E::InvalidDistinguishedName { .. }
        | E::UnknownNameAttribute { .. }
        | E::EmptyDistinguishedName { .. }
        | E::InvalidValidity
        | E::ValidityOutOfRange { .. }
        | E::ConflictingExtension { .. }
        | E::DuplicateExtensionOid { .. } => ErrorKind::Validation,
        E::InvalidPemLabel
        | E::Pem(_)
        | E::X509Parse { .. }
        | E::UnsupportedCertificateVersion
        | E::BasicConstraintsParse { .. }
        | E::KeyUsageParse { .. }
        | E::TrailingDerData
        | E::PreUnixTimestamp
        | E::EmptySerial
        | E::NegativeSerial
        | E::NonCanonicalSerial
        | E::ZeroSerial
        | E::Der(_) => ErrorKind::Parse,
        E::SerialGenerationFailed { .. }
        | E::SignatureAlgorithmMismatch { .. }
        | E::InvalidSignature
        | E::InvalidIssuerKey { .. }
        | E::Oid(_) => ErrorKind::Internal,
    }
}

fn custody_kind(err: &signer::Error) -> ErrorKind {
    if let Some(kind) = err.failure_kind() {
        return ErrorKind::SigningFailure(kind);
    }
    match err {
        signer::Error::UnsupportedAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
        signer::Error::InvalidKey { .. } => ErrorKind::Validation,
        signer::Error::Pkcs12 { .. } => ErrorKind::Parse,
        _ => ErrorKind::Internal,
    }
}
