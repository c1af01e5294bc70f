// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! X.509 certificate authority whose issuer keys never leave a remote
//! custody service.
//!
//! CSRs are decoded and checked by [`csr`], certificates are assembled and
//! hashed locally by [`x509`], and only the digest travels to the custody
//! back-end behind [`signer::RemoteKeySigner`]. [`issuer::IssuerManager`]
//! ties these together into root creation, import, signing and deletion.

pub mod config;
pub mod csr;
pub mod issuer;
pub mod pem;
pub mod rand;
pub mod rsa;
pub mod signer;
pub mod x509;
