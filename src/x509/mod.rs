// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! X.509 certificate assembly with remotely held issuer keys.
//!
//! https://datatracker.ietf.org/doc/html/rfc5280
//!
//! Certificates are built from a verified CSR (or, for roots, from the
//! issuer's own public key), the TBSCertificate is hashed locally and only
//! the digest is sent to the key custody service for signing.

mod error;
mod issue;
mod name;
mod types;
mod utils;
mod verify;

pub use error::{Error, Result};
pub use issue::{SERIAL_ENTROPY_BYTES, issue, positive_serial, self_sign};
pub use name::{
    DistinguishedName, NameAttribute, NameValue, OID_C, OID_CN, OID_DC, OID_EMAIL, OID_L, OID_O,
    OID_OU, OID_SERIAL_NUMBER, OID_ST, OID_STREET,
};
pub use types::{
    CERTIFICATE_FILE_NAME, CERTIFICATE_MIME_TYPE, CertificateMetadata, CertificateProfile,
    ExtensionPolicy, IssuerIdentity, SignedCertificate, ValidityWindow,
};
pub use utils::spki_key_identifier;
pub use verify::{decode_certificate_pem, inspect_certificate, verify_signed_by};

#[cfg(test)]
use verify::validate_serial_encoding;
