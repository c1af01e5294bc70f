// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Remote key custody.
//!
//! Issuer private keys never leave the custody service. Everything the rest
//! of the crate needs from a key goes through [`RemoteKeySigner`]: create or
//! import it, fetch its public half, sign a digest, and delete it. Back-ends
//! are picked when the process is wired up (see [`crate::config`]); callers
//! only ever hold an `Arc<dyn RemoteKeySigner>`.

mod cloud;
mod error;
mod memory;
mod pkcs12;

pub use cloud::CloudSigner;
pub use error::{Error, Result, SigningFailureKind};
pub use memory::{Fault, MemorySigner};
pub use pkcs12::ImportedKey;

use async_trait::async_trait;
use const_oid::ObjectIdentifier;
use der::{Any, Encode};
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

/// OID for rsaEncryption (1.2.840.113549.1.1.1).
pub const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// OID for sha256WithRSAEncryption (1.2.840.113549.1.1.11).
pub const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// OID for id-ecPublicKey (1.2.840.10045.2.1).
pub const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Opaque handle of a key held by a custody service.
///
/// The handle is only meaningful to the back-end that minted it. It is kept
/// out of every public issuer view and never rendered in full by `Debug`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyReference(String);

impl KeyReference {
    /// Wraps a back-end specific key URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Returns the back-end specific key URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key URIs embed vault hosts and versions, keep logs terse
        let tail = self.0.rsplit('/').next().unwrap_or_default();
        write!(f, "KeyReference(.../{tail})")
    }
}

/// Digest algorithm the caller hashed the signed content with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlg {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Returns the digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }

    /// Hashes a message with this algorithm.
    pub fn digest(self, message: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha256 => Sha256::digest(message).to_vec(),
            HashAlg::Sha384 => Sha384::digest(message).to_vec(),
            HashAlg::Sha512 => Sha512::digest(message).to_vec(),
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HashAlg::Sha256 => "SHA-256",
            HashAlg::Sha384 => "SHA-384",
            HashAlg::Sha512 => "SHA-512",
        })
    }
}

/// Key families a custody service can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    EcP256,
}

impl KeyAlgorithm {
    /// Classifies a SubjectPublicKeyInfo, returning `None` for key types this
    /// crate knows nothing about.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Option<Self> {
        let oid = spki.algorithm.oid;
        if oid == OID_RSA_ENCRYPTION {
            Some(KeyAlgorithm::Rsa)
        } else if oid == OID_EC_PUBLIC_KEY {
            Some(KeyAlgorithm::EcP256)
        } else {
            None
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::EcP256 => "EC P-256",
        })
    }
}

/// Parameters for a newly generated custody key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySpec {
    pub algorithm: KeyAlgorithm,
    pub size: usize,
}

impl KeySpec {
    /// An RSA key of the given modulus size.
    pub fn rsa(size: usize) -> Self {
        Self {
            algorithm: KeyAlgorithm::Rsa,
            size,
        }
    }
}

/// Capability interface of a key custody service.
///
/// Implementations perform exactly one remote call per method and keep no
/// key material beyond what the service itself holds.
#[async_trait]
pub trait RemoteKeySigner: Send + Sync {
    /// Short back-end identifier used in logs.
    fn backend(&self) -> &'static str;

    /// Creates a new key pair named `name` and returns its reference.
    async fn generate_key(&self, name: &str, spec: KeySpec) -> Result<KeyReference>;

    /// Registers externally supplied PKCS#8 key material under `name`.
    ///
    /// The buffer is wiped when dropped; implementations must not copy it
    /// into longer lived storage than the upload itself.
    async fn import_key(&self, name: &str, pkcs8: Zeroizing<Vec<u8>>) -> Result<KeyReference>;

    /// Deletes (or soft-deletes) a key.
    async fn delete_key(&self, key: &KeyReference) -> Result<()>;

    /// Retrieves the public half of a key.
    async fn public_key(&self, key: &KeyReference) -> Result<SubjectPublicKeyInfoOwned>;

    /// Signs an already computed digest with the referenced key.
    async fn sign(&self, key: &KeyReference, digest: &[u8], hash: HashAlg) -> Result<Vec<u8>>;

    /// Returns the DER encoded AlgorithmIdentifier of the signatures produced
    /// for a key family and digest.
    fn algorithm_identifier(&self, key: KeyAlgorithm, hash: HashAlg) -> Result<Vec<u8>> {
        algorithm_identifier(key, hash)?
            .to_der()
            .map_err(|e| Error::Protocol {
                details: e.to_string(),
            })
    }

    /// Decodes a PKCS#12 container and registers its private key under
    /// `name`, returning the key reference along with the container's
    /// certificate. An absent password is treated as the empty password.
    async fn import_pkcs12(
        &self,
        name: &str,
        container: &[u8],
        password: Option<&str>,
    ) -> Result<ImportedKey> {
        let (pkcs8, certificate) = pkcs12::decode(container, password.unwrap_or_default())?;
        let key = self.import_key(name, pkcs8).await?;
        Ok(ImportedKey { key, certificate })
    }
}

/// Builds the AlgorithmIdentifier for a key family and digest. Only RSA with
/// SHA-256 is supported; everything else is refused rather than guessed.
pub fn algorithm_identifier(key: KeyAlgorithm, hash: HashAlg) -> Result<AlgorithmIdentifierOwned> {
    match (key, hash) {
        (KeyAlgorithm::Rsa, HashAlg::Sha256) => Ok(AlgorithmIdentifierOwned {
            oid: OID_SHA256_WITH_RSA,
            parameters: Some(Any::null()),
        }),
        (key, hash) => Err(Error::UnsupportedAlgorithm {
            algorithm: format!("{key} with {hash}"),
        }),
    }
}

/// Runs a custody call under an optional deadline, surfacing expiry as the
/// retryable [`Error::Timeout`]. Dropping the future cancels the call.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    deadline: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        None => call.await,
        Some(after) => match tokio::time::timeout(after, call).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, ?after, "custody call deadline expired");
                Err(Error::Timeout { operation, after })
            }
        },
    }
}

/// Decorator that applies one deadline to every call of a wrapped back-end.
pub struct DeadlineSigner {
    inner: Arc<dyn RemoteKeySigner>,
    deadline: Duration,
}

impl DeadlineSigner {
    /// Wraps `inner` so that every custody call fails with a timeout after
    /// `deadline`.
    pub fn new(inner: Arc<dyn RemoteKeySigner>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl RemoteKeySigner for DeadlineSigner {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn generate_key(&self, name: &str, spec: KeySpec) -> Result<KeyReference> {
        with_deadline(
            "generate_key",
            Some(self.deadline),
            self.inner.generate_key(name, spec),
        )
        .await
    }

    async fn import_key(&self, name: &str, pkcs8: Zeroizing<Vec<u8>>) -> Result<KeyReference> {
        with_deadline(
            "import_key",
            Some(self.deadline),
            self.inner.import_key(name, pkcs8),
        )
        .await
    }

    async fn delete_key(&self, key: &KeyReference) -> Result<()> {
        with_deadline("delete_key", Some(self.deadline), self.inner.delete_key(key)).await
    }

    async fn public_key(&self, key: &KeyReference) -> Result<SubjectPublicKeyInfoOwned> {
        with_deadline("public_key", Some(self.deadline), self.inner.public_key(key)).await
    }

    async fn sign(&self, key: &KeyReference, digest: &[u8], hash: HashAlg) -> Result<Vec<u8>> {
        with_deadline(
            "sign",
            Some(self.deadline),
            self.inner.sign(key, digest, hash),
        )
        .await
    }

    fn algorithm_identifier(&self, key: KeyAlgorithm, hash: HashAlg) -> Result<Vec<u8>> {
        self.inner.algorithm_identifier(key, hash)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Verifies the exact DER of the RSA/SHA-256 AlgorithmIdentifier,
    /// including the explicit NULL parameters.
    #[test]
    fn test_rsa_sha256_algorithm_identifier() {
        let der = algorithm_identifier(KeyAlgorithm::Rsa, HashAlg::Sha256)
            .unwrap()
            .to_der()
            .unwrap();
        assert_eq!(
            der,
            [
                0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b,
                0x05, 0x00
            ]
        );
    }

    /// Verifies that unsupported key and digest combinations are refused.
    #[test]
    fn test_unsupported_algorithm_identifiers() {
        for (key, hash) in [
            (KeyAlgorithm::Rsa, HashAlg::Sha384),
            (KeyAlgorithm::Rsa, HashAlg::Sha512),
            (KeyAlgorithm::EcP256, HashAlg::Sha256),
        ] {
            assert!(matches!(
                algorithm_identifier(key, hash),
                Err(Error::UnsupportedAlgorithm { .. })
            ));
        }
    }

    /// Verifies the retryability split of the failure taxonomy.
    #[test]
    fn test_failure_kinds() {
        let cases = [
            (
                Error::NotFound { key: "k".into() },
                Some(SigningFailureKind::NotFound),
                false,
            ),
            (
                Error::PermissionDenied {
                    key: "k".into(),
                    details: "no".into(),
                },
                Some(SigningFailureKind::PermissionDenied),
                false,
            ),
            (
                Error::Unavailable {
                    details: "503".into(),
                },
                Some(SigningFailureKind::Unavailable),
                true,
            ),
            (
                Error::Timeout {
                    operation: "sign",
                    after: Duration::from_secs(1),
                },
                Some(SigningFailureKind::Timeout),
                true,
            ),
            (
                Error::UnsupportedAlgorithm {
                    algorithm: "x".into(),
                },
                None,
                false,
            ),
        ];
        for (err, kind, retryable) in cases {
            assert_eq!(err.failure_kind(), kind);
            assert_eq!(err.is_retryable(), retryable);
        }
    }

    /// Verifies that an expired deadline surfaces as a retryable timeout.
    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let err = with_deadline("sign", Some(Duration::from_millis(10)), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "sign", .. }));
        assert!(err.is_retryable());

        let fast = async { Ok(7) };
        assert_eq!(with_deadline("sign", None, fast).await.unwrap(), 7);
    }

    #[test]
    fn test_key_reference_debug_is_terse() {
        let key = KeyReference::new("https://vault.example/keys/root-1/0123abcd");
        assert_eq!(format!("{key:?}"), "KeyReference(.../0123abcd)");
    }

    #[test]
    fn test_hash_digest_lengths() {
        for hash in [HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512] {
            assert_eq!(hash.digest(b"abc").len(), hash.digest_len());
        }
    }
}
