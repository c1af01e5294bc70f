// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use thiserror::Error;

/// Result type used by CSR APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by CSR APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed certificate request: {details}")]
    MalformedEncoding { details: String },
    #[error("unsupported CSR key algorithm: {algorithm}")]
    UnsupportedKeyAlgorithm { algorithm: String },
    #[error("unsupported CSR signature algorithm: {oid}")]
    UnsupportedSignatureAlgorithm { oid: String },
    #[error("certificate request self-signature does not verify")]
    InvalidSelfSignature,
    #[error("invalid request {field}: {details}")]
    Validation {
        field: &'static str,
        details: String,
    },
    #[error("certificate request key: {0}")]
    Key(#[from] crate::rsa::Error),
    #[error(transparent)]
    Name(#[from] crate::x509::Error),
    #[error(transparent)]
    Der(#[from] der::Error),
}

impl Error {
    pub(super) fn malformed(details: impl ToString) -> Self {
        Error::MalformedEncoding {
            details: details.to_string(),
        }
    }
}
