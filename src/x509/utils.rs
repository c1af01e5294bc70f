// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use sha1::{Digest, Sha1};
use spki::SubjectPublicKeyInfoOwned;

/// Computes the SHA1 hash of a public key.
pub(super) fn key_identifier(public_key: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(public_key);
    hasher.finalize().to_vec()
}

/// Computes the RFC 5280 method (1) key identifier of a SubjectPublicKeyInfo:
/// SHA-1 over the subjectPublicKey bit string contents.
pub fn spki_key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    key_identifier(spki.subject_public_key.raw_bytes())
}
