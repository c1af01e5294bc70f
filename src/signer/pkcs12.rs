// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, KeyReference, Result};
use crate::rsa;
use der::Decode;
use p12_keystore::{KeyStore, KeyStoreEntry};
use x509_cert::Certificate;
use zeroize::Zeroizing;

/// A key registered from a PKCS#12 container, together with the certificate
/// the container shipped for it.
#[derive(Debug)]
pub struct ImportedKey {
    /// Reference of the newly registered custody key.
    pub key: KeyReference,
    /// DER certificate matching the key, kept exactly as supplied.
    pub certificate: Vec<u8>,
}

/// Opens a PKCS#12 container and returns its single private key (PKCS#8 DER,
/// wiped on drop) along with the certificate bound to that key.
///
/// Both PBES2 (AES with an HMAC-SHA-2 MAC) and legacy SHA-1 containers are
/// read. Unknown MAC or cipher algorithms fail as [`Error::Pkcs12`].
pub(super) fn decode(container: &[u8], password: &str) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    let store = KeyStore::from_pkcs12(container, password).map_err(|e| Error::Pkcs12 {
        details: format!("cannot open container (wrong password?): {e}"),
    })?;

    let mut keys = Vec::new();
    let mut certs: Vec<&[u8]> = Vec::new();
    for (_, entry) in store.entries() {
        match entry {
            KeyStoreEntry::PrivateKeyChain(chain) => {
                keys.push(Zeroizing::new(chain.key().to_vec()));
                certs.extend(chain.chain().iter().map(|cert| cert.as_der()));
            }
            KeyStoreEntry::Certificate(cert) => certs.push(cert.as_der()),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
    let pkcs8 = match keys.len() {
        0 => {
            return Err(Error::Pkcs12 {
                details: "container holds no private key".to_string(),
            });
        }
        1 => keys.remove(0),
        n => {
            return Err(Error::Pkcs12 {
                details: format!("container holds {n} private keys"),
            });
        }
    };
    let public = rsa::SecretKey::from_der(&pkcs8)?.public_key();

    let certificate = certs
        .into_iter()
        .find(|der| certificate_key_matches(der, &public))
        .ok_or_else(|| Error::Pkcs12 {
            details: "no certificate matches the private key".to_string(),
        })?;

    Ok((pkcs8, certificate.to_vec()))
}

fn certificate_key_matches(der: &[u8], public: &rsa::PublicKey) -> bool {
    Certificate::from_der(der)
        .ok()
        .and_then(|cert| {
            rsa::PublicKey::from_spki(&cert.tbs_certificate.subject_public_key_info).ok()
        })
        .is_some_and(|key| key == *public)
}

#[cfg(test)]
mod test {
    use super::*;
    use p12_keystore::PrivateKeyChain;

    // Exported by OpenSSL 3 with its defaults: PBES2/AES-256-CBC bags under
    // an HMAC-SHA-256 MAC. Same key and certificate in both.
    const MODERN_ROOT: &[u8] = include_bytes!("../../test-data/modern-root.p12");
    const EMPTY_PASSWORD_ROOT: &[u8] = include_bytes!("../../test-data/empty-password-root.p12");

    /// Verifies that garbage input is reported as a container error.
    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode(b"definitely not a pfx", ""),
            Err(Error::Pkcs12 { .. })
        ));
    }

    /// Verifies that AES-256/SHA-256 containers open, and that the
    /// certificate returned belongs to the returned key.
    #[test]
    fn test_decode_pbes2_container() {
        let (pkcs8, certificate) = decode(MODERN_ROOT, "hunter2").unwrap();
        let public = rsa::SecretKey::from_der(&pkcs8).unwrap().public_key();
        assert!(certificate_key_matches(&certificate, &public));

        let (_, empty) = decode(EMPTY_PASSWORD_ROOT, "").unwrap();
        assert_eq!(empty, certificate);
    }

    #[test]
    fn test_decode_wrong_password() {
        for password in ["", "hunter3"] {
            assert!(matches!(
                decode(MODERN_ROOT, password),
                Err(Error::Pkcs12 { .. })
            ));
        }
        assert!(matches!(
            decode(EMPTY_PASSWORD_ROOT, "hunter2"),
            Err(Error::Pkcs12 { .. })
        ));
    }

    /// Verifies that a container whose key has no matching certificate is
    /// rejected.
    #[test]
    fn test_decode_requires_matching_certificate() {
        let key = rsa::SecretKey::generate(2048).unwrap();
        let pkcs8 = key.to_der().unwrap();

        // Ship the modern root's certificate next to an unrelated key
        let (_, foreign) = decode(MODERN_ROOT, "hunter2").unwrap();
        let foreign = p12_keystore::Certificate::from_der(&foreign).unwrap();

        let mut store = KeyStore::new();
        store.add_entry(
            "root",
            KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(
                pkcs8.as_slice(),
                [0x01; 20],
                vec![foreign],
            )),
        );
        let pfx = store.writer("hunter2").write().unwrap();

        assert!(matches!(
            decode(&pfx, "hunter2"),
            Err(Error::Pkcs12 { details }) if details.contains("no certificate")
        ));
    }
}
