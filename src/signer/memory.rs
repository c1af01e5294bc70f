// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, HashAlg, KeyAlgorithm, KeyReference, KeySpec, RemoteKeySigner, Result};
use crate::{rand, rsa};
use async_trait::async_trait;
use spki::SubjectPublicKeyInfoOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::Zeroizing;

/// A failure the in-memory custody double can be told to produce for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Every call for the key is refused.
    PermissionDenied,
    /// Every call for the key reports the service as unavailable.
    Unavailable,
    /// Every call for the key stalls this long before being served.
    Latency(Duration),
}

struct Slot {
    key: Arc<rsa::SecretKey>,
    deleted: bool,
}

/// In-process custody double holding real RSA keys.
///
/// Behaves like a vault with soft delete: deleted keys stay in the table but
/// answer every call with `NotFound`. Faults can be injected per key to drive
/// the failure paths of callers.
#[derive(Default)]
pub struct MemorySigner {
    keys: RwLock<HashMap<KeyReference, Slot>>,
    faults: RwLock<HashMap<KeyReference, Fault>>,
}

impl MemorySigner {
    /// Creates an empty custody double.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already generated key under `name`, bypassing generation.
    pub async fn insert_key(&self, name: &str, key: rsa::SecretKey) -> Result<KeyReference> {
        let reference = mint_reference(name)?;
        self.keys.write().await.insert(
            reference.clone(),
            Slot {
                key: Arc::new(key),
                deleted: false,
            },
        );
        Ok(reference)
    }

    /// Makes every subsequent call for `key` fail (or stall) as described.
    pub async fn inject_fault(&self, key: &KeyReference, fault: Fault) {
        self.faults.write().await.insert(key.clone(), fault);
    }

    /// Removes an injected fault.
    pub async fn clear_fault(&self, key: &KeyReference) {
        self.faults.write().await.remove(key);
    }

    /// Number of keys not soft-deleted.
    pub async fn active_keys(&self) -> usize {
        self.keys.read().await.values().filter(|s| !s.deleted).count()
    }

    async fn check_fault(&self, key: &KeyReference) -> Result<()> {
        let fault = self.faults.read().await.get(key).copied();
        match fault {
            None => Ok(()),
            Some(Fault::PermissionDenied) => Err(Error::PermissionDenied {
                key: key.as_str().to_string(),
                details: "injected fault".to_string(),
            }),
            Some(Fault::Unavailable) => Err(Error::Unavailable {
                details: "injected fault".to_string(),
            }),
            Some(Fault::Latency(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn lookup(&self, key: &KeyReference) -> Result<Arc<rsa::SecretKey>> {
        self.check_fault(key).await?;

        let keys = self.keys.read().await;
        match keys.get(key) {
            Some(slot) if !slot.deleted => Ok(slot.key.clone()),
            _ => Err(Error::NotFound {
                key: key.as_str().to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteKeySigner for MemorySigner {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn generate_key(&self, name: &str, spec: KeySpec) -> Result<KeyReference> {
        if spec.algorithm != KeyAlgorithm::Rsa {
            return Err(Error::UnsupportedAlgorithm {
                algorithm: spec.algorithm.to_string(),
            });
        }
        // Prime search is CPU bound, keep it off the async workers
        let bits = spec.size;
        let key = tokio::task::spawn_blocking(move || rsa::SecretKey::generate(bits))
            .await
            .map_err(|e| Error::Unavailable {
                details: format!("key generation task failed: {e}"),
            })??;

        debug!(name, bits, "generated in-memory custody key");
        self.insert_key(name, key).await
    }

    async fn import_key(&self, name: &str, pkcs8: Zeroizing<Vec<u8>>) -> Result<KeyReference> {
        let key = rsa::SecretKey::from_der(&pkcs8)?;
        drop(pkcs8);

        debug!(name, bits = key.bits(), "imported in-memory custody key");
        self.insert_key(name, key).await
    }

    async fn delete_key(&self, key: &KeyReference) -> Result<()> {
        self.check_fault(key).await?;

        let mut keys = self.keys.write().await;
        match keys.get_mut(key) {
            Some(slot) if !slot.deleted => {
                slot.deleted = true;
                Ok(())
            }
            _ => Err(Error::NotFound {
                key: key.as_str().to_string(),
            }),
        }
    }

    async fn public_key(&self, key: &KeyReference) -> Result<SubjectPublicKeyInfoOwned> {
        let secret = self.lookup(key).await?;
        Ok(secret.public_key().to_spki()?)
    }

    async fn sign(&self, key: &KeyReference, digest: &[u8], hash: HashAlg) -> Result<Vec<u8>> {
        if hash != HashAlg::Sha256 {
            return Err(Error::UnsupportedAlgorithm {
                algorithm: format!("RSA with {hash}"),
            });
        }
        if digest.len() != hash.digest_len() {
            return Err(Error::InvalidDigest {
                expected: hash.digest_len(),
                actual: digest.len(),
            });
        }
        let secret = self.lookup(key).await?;
        Ok(secret.sign_prehash(digest)?)
    }
}

fn mint_reference(name: &str) -> Result<KeyReference> {
    let version = rand::hex_suffix(8).map_err(|e| Error::Unavailable {
        details: format!("entropy source failed: {e}"),
    })?;
    Ok(KeyReference::new(format!("memory://keys/{name}/{version}")))
}

#[cfg(test)]
mod test {
    use super::*;
    use sha2::{Digest, Sha256};
    use std::sync::LazyLock;

    static KEY: LazyLock<rsa::SecretKey> =
        LazyLock::new(|| rsa::SecretKey::generate(2048).unwrap());

    async fn signer_with_key() -> (MemorySigner, KeyReference) {
        let signer = MemorySigner::new();
        let key = signer.insert_key("root", KEY.clone()).await.unwrap();
        (signer, key)
    }

    /// Verifies that digests signed in custody verify against the published key.
    #[tokio::test]
    async fn test_sign_and_verify() {
        let (signer, key) = signer_with_key().await;

        let digest = Sha256::digest(b"tbs");
        let sig = signer.sign(&key, &digest, HashAlg::Sha256).await.unwrap();

        let spki = signer.public_key(&key).await.unwrap();
        rsa::PublicKey::from_spki(&spki)
            .unwrap()
            .verify_prehash(&digest, &sig)
            .unwrap();
    }

    /// Verifies that soft-deleted keys answer with NotFound, and that a second
    /// delete is reported rather than silently succeeding.
    #[tokio::test]
    async fn test_delete_is_soft() {
        let (signer, key) = signer_with_key().await;
        signer.delete_key(&key).await.unwrap();

        assert_eq!(signer.active_keys().await, 0);
        let digest = Sha256::digest(b"tbs");
        assert!(matches!(
            signer.sign(&key, &digest, HashAlg::Sha256).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            signer.delete_key(&key).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_rejects_unsupported_hash() {
        let (signer, key) = signer_with_key().await;
        assert!(matches!(
            signer.sign(&key, &[0u8; 48], HashAlg::Sha384).await,
            Err(Error::UnsupportedAlgorithm { .. })
        ));
        assert!(matches!(
            signer.sign(&key, &[0u8; 20], HashAlg::Sha256).await,
            Err(Error::InvalidDigest {
                expected: 32,
                actual: 20
            })
        ));
    }

    /// Verifies that injected faults surface with the right retry semantics.
    #[tokio::test]
    async fn test_injected_faults() {
        let (signer, key) = signer_with_key().await;

        signer.inject_fault(&key, Fault::PermissionDenied).await;
        let err = signer.public_key(&key).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert!(!err.is_retryable());

        signer.inject_fault(&key, Fault::Unavailable).await;
        let err = signer.public_key(&key).await.unwrap_err();
        assert!(err.is_retryable());

        signer.clear_fault(&key).await;
        signer.public_key(&key).await.unwrap();
    }

    /// Verifies that a stalled key trips a caller supplied deadline.
    #[tokio::test]
    async fn test_latency_fault_hits_deadline() {
        let (signer, key) = signer_with_key().await;
        signer
            .inject_fault(&key, Fault::Latency(Duration::from_secs(10)))
            .await;

        let err = super::super::with_deadline(
            "public_key",
            Some(Duration::from_millis(20)),
            signer.public_key(&key),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    /// Verifies that imported PKCS#8 keys are usable and that EC requests are refused.
    #[tokio::test]
    async fn test_import_and_generate_guards() {
        let signer = MemorySigner::new();
        let key = signer
            .import_key("imported", KEY.to_der().unwrap())
            .await
            .unwrap();
        let spki = signer.public_key(&key).await.unwrap();
        assert_eq!(rsa::PublicKey::from_spki(&spki).unwrap(), KEY.public_key());

        assert!(matches!(
            signer
                .generate_key(
                    "ec",
                    KeySpec {
                        algorithm: KeyAlgorithm::EcP256,
                        size: 256
                    }
                )
                .await,
            Err(Error::UnsupportedAlgorithm { .. })
        ));
        assert!(matches!(
            signer.generate_key("tiny", KeySpec::rsa(1024)).await,
            Err(Error::UnsupportedAlgorithm { .. })
        ));
    }

    #[tokio::test]
    async fn test_references_are_unique() {
        let signer = MemorySigner::new();
        let a = signer.insert_key("root", KEY.clone()).await.unwrap();
        let b = signer.insert_key("root", KEY.clone()).await.unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("memory://keys/root/"));
    }
}
