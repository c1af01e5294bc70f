// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::time::Duration;
use thiserror::Error;

/// Result type used by custody back-ends.
pub type Result<T> = std::result::Result<T, Error>;

/// The custody failure kinds a caller can build retry policy on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningFailureKind {
    /// The key reference no longer exists.
    NotFound,
    /// The custody service refused the operation.
    PermissionDenied,
    /// The custody service could not be reached or is overloaded.
    Unavailable,
    /// The call did not complete before its deadline.
    Timeout,
}

impl SigningFailureKind {
    /// Reports whether a caller may retry the call with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout)
    }
}

/// Error type used by custody back-ends.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key {key} not found in custody")]
    NotFound { key: String },
    #[error("custody denied access to key {key}: {details}")]
    PermissionDenied { key: String, details: String },
    #[error("custody service unavailable: {details}")]
    Unavailable { details: String },
    #[error("custody call {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("unsupported signature algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
    #[error("invalid key material: {details}")]
    InvalidKey { details: String },
    #[error("digest must be {expected} bytes, got {actual}")]
    InvalidDigest { expected: usize, actual: usize },
    #[error("invalid PKCS#12 container: {details}")]
    Pkcs12 { details: String },
    #[error("unexpected custody response: {details}")]
    Protocol { details: String },
}

impl Error {
    /// Returns the custody failure kind, if this error is one.
    pub fn failure_kind(&self) -> Option<SigningFailureKind> {
        match self {
            Error::NotFound { .. } => Some(SigningFailureKind::NotFound),
            Error::PermissionDenied { .. } => Some(SigningFailureKind::PermissionDenied),
            Error::Unavailable { .. } => Some(SigningFailureKind::Unavailable),
            Error::Timeout { .. } => Some(SigningFailureKind::Timeout),
            _ => None,
        }
    }

    /// Reports whether the failed call may be retried. The custody layer never
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_some_and(SigningFailureKind::is_retryable)
    }
}

impl From<crate::rsa::Error> for Error {
    fn from(err: crate::rsa::Error) -> Self {
        match err {
            crate::rsa::Error::UnsupportedKeySize { bits } => Error::UnsupportedAlgorithm {
                algorithm: format!("RSA-{bits}"),
            },
            crate::rsa::Error::InvalidDigestLength { expected, actual } => {
                Error::InvalidDigest { expected, actual }
            }
            other => Error::InvalidKey {
                details: other.to_string(),
            },
        }
    }
}
