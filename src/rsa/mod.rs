// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! RSA cryptography wrappers and parametrization.
//!
//! Keys sign with PKCS#1 v1.5 padding over SHA-256, the only scheme issuer
//! keys use. Secret keys only ever exist inside the in-memory custody double
//! and transiently while an imported key is handed over to a custody service.
//!
//! https://datatracker.ietf.org/doc/html/rfc8017

use crate::pem;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::sha2::{Digest, Sha256};
use rsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rsa::signature::{Keypair, SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use spki::SubjectPublicKeyInfoOwned;
use thiserror::Error;
use zeroize::Zeroizing;

/// Modulus sizes accepted for issuer keys.
pub const KEY_SIZES: [usize; 3] = [2048, 3072, 4096];

/// Size of a SHA-256 digest accepted by the prehash APIs.
pub const DIGEST_SIZE: usize = 32;

/// Size of an RSA key fingerprint (SHA256 hash).
pub const FINGERPRINT_SIZE: usize = 32;

/// Result type used by the RSA wrappers.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by the RSA wrappers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported RSA modulus size: {bits} bits")]
    UnsupportedKeySize { bits: usize },
    #[error("unsupported RSA public exponent")]
    UnsupportedExponent,
    #[error("malformed RSA key: {details}")]
    KeyMalformed { details: String },
    #[error("digest must be {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },
    #[error("RSA signature verification failed")]
    InvalidSignature,
    #[error(transparent)]
    Pem(#[from] pem::Error),
    #[error(transparent)]
    Rsa(#[from] rsa::Error),
}

/// SecretKey contains an RSA private key usable for signing, with SHA256 as
/// the underlying hash algorithm.
#[derive(Clone)]
pub struct SecretKey {
    inner: rsa::pkcs1v15::SigningKey<Sha256>,
}

impl SecretKey {
    /// generate creates a new, random private key of the given modulus size.
    pub fn generate(bits: usize) -> Result<SecretKey> {
        if !KEY_SIZES.contains(&bits) {
            return Err(Error::UnsupportedKeySize { bits });
        }
        let key = RsaPrivateKey::new(&mut OsRng, bits)?;
        Ok(Self {
            inner: rsa::pkcs1v15::SigningKey::<Sha256>::new(key),
        })
    }

    /// from_der parses a PKCS#8 DER buffer into a private key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = rsa::pkcs1v15::SigningKey::<Sha256>::from_pkcs8_der(der).map_err(|e| {
            Error::KeyMalformed {
                details: e.to_string(),
            }
        })?;
        let key: &RsaPrivateKey = inner.as_ref();
        check_public_parts(key.n(), key.e())?;

        // Catch inconsistent CRT or prime values before the key is used
        key.validate()?;
        Ok(Self { inner })
    }

    /// from_pem parses a PEM string into a private key.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = Zeroizing::new(pem::decode_kind(pem_str.as_bytes(), &["PRIVATE KEY"])?);
        Self::from_der(&der)
    }

    /// to_der serializes a private key into a PKCS#8 DER buffer that is wiped
    /// from memory once dropped.
    pub fn to_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self.inner.to_pkcs8_der().map_err(|e| Error::KeyMalformed {
            details: e.to_string(),
        })?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// bits returns the modulus size in bits.
    pub fn bits(&self) -> usize {
        let key: &RsaPrivateKey = self.inner.as_ref();
        key.n().bits()
    }

    /// public_key retrieves the public counterpart of the secret key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// sign creates a digital signature of the message.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let sig = self.inner.try_sign(message).map_err(|e| Error::KeyMalformed {
            details: e.to_string(),
        })?;
        Ok(sig.to_vec())
    }

    /// sign_prehash creates a digital signature over an already computed
    /// SHA-256 digest. This is the only signing shape a custody service exposes.
    pub fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>> {
        check_digest(digest)?;
        let sig = self
            .inner
            .sign_prehash(digest)
            .map_err(|e| Error::KeyMalformed {
                details: e.to_string(),
            })?;
        Ok(sig.to_vec())
    }

    pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
        self.inner.as_ref()
    }
}

/// PublicKey contains an RSA public key usable for verification, with SHA256
/// as the underlying hash algorithm.
#[derive(Debug, Clone)]
pub struct PublicKey {
    inner: rsa::pkcs1v15::VerifyingKey<Sha256>,
}

impl PublicKey {
    /// from_der parses a SubjectPublicKeyInfo DER buffer into a public key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = rsa::pkcs1v15::VerifyingKey::<Sha256>::from_public_key_der(der).map_err(
            |e| Error::KeyMalformed {
                details: e.to_string(),
            },
        )?;
        let key: &RsaPublicKey = inner.as_ref();
        check_public_parts(key.n(), key.e())?;
        Ok(Self { inner })
    }

    /// from_spki converts a decoded SubjectPublicKeyInfo into a public key.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = der::Encode::to_der(spki).map_err(|e| Error::KeyMalformed {
            details: e.to_string(),
        })?;
        Self::from_der(&der)
    }

    /// from_pem parses a PEM string into a public key.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = pem::decode_kind(pem_str.as_bytes(), &["PUBLIC KEY"])?;
        Self::from_der(&der)
    }

    /// from_components assembles a public key from its big-endian modulus and
    /// exponent, as published by custody services in JWK form.
    pub fn from_components(n: &[u8], e: &[u8]) -> Result<Self> {
        let n = BigUint::from_bytes_be(n);
        let e = BigUint::from_bytes_be(e);
        check_public_parts(&n, &e)?;

        let key = RsaPublicKey::new(n, e)?;
        Ok(Self {
            inner: rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key),
        })
    }

    /// to_der serializes a public key into a SubjectPublicKeyInfo DER buffer.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .inner
            .to_public_key_der()
            .map_err(|e| Error::KeyMalformed {
                details: e.to_string(),
            })?;
        Ok(doc.as_bytes().to_vec())
    }

    /// to_spki serializes a public key into a decoded SubjectPublicKeyInfo.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let der = self.to_der()?;
        der::Decode::from_der(&der).map_err(|e: der::Error| Error::KeyMalformed {
            details: e.to_string(),
        })
    }

    /// to_pem serializes a public key into a PEM string.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem::encode("PUBLIC KEY", &self.to_der()?))
    }

    /// bits returns the modulus size in bits.
    pub fn bits(&self) -> usize {
        let key: &RsaPublicKey = self.inner.as_ref();
        key.n().bits()
    }

    /// modulus returns the big-endian modulus bytes.
    pub fn modulus(&self) -> Vec<u8> {
        let key: &RsaPublicKey = self.inner.as_ref();
        key.n().to_bytes_be()
    }

    /// exponent returns the big-endian public exponent bytes.
    pub fn exponent(&self) -> Vec<u8> {
        let key: &RsaPublicKey = self.inner.as_ref();
        key.e().to_bytes_be()
    }

    /// fingerprint returns a 256bit unique identifier for this key: the SHA256
    /// hash of its SubjectPublicKeyInfo DER encoding.
    pub fn fingerprint(&self) -> Result<[u8; FINGERPRINT_SIZE]> {
        Ok(Sha256::digest(self.to_der()?).into())
    }

    /// verify verifies a digital signature.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig =
            rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| Error::InvalidSignature)?;
        self.inner
            .verify(message, &sig)
            .map_err(|_| Error::InvalidSignature)
    }

    /// verify_prehash verifies a digital signature on an already hashed message.
    pub fn verify_prehash(&self, digest: &[u8], signature: &[u8]) -> Result<()> {
        check_digest(digest)?;
        let sig =
            rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| Error::InvalidSignature)?;
        self.inner
            .verify_prehash(digest, &sig)
            .map_err(|_| Error::InvalidSignature)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        let a: &RsaPublicKey = self.inner.as_ref();
        let b: &RsaPublicKey = other.inner.as_ref();
        a == b
    }
}

impl Eq for PublicKey {}

// Whilst the RSA algorithm permits different exponents, every modern system
// only ever uses 65537 and most also enforce this. Might as well do the same.
fn check_public_parts(n: &BigUint, e: &BigUint) -> Result<()> {
    let bits = n.bits();
    if !KEY_SIZES.contains(&bits) {
        return Err(Error::UnsupportedKeySize { bits });
    }
    if *e != BigUint::from(65537u32) {
        return Err(Error::UnsupportedExponent);
    }
    Ok(())
}

fn check_digest(digest: &[u8]) -> Result<()> {
    if digest.len() != DIGEST_SIZE {
        return Err(Error::InvalidDigestLength {
            expected: DIGEST_SIZE,
            actual: digest.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::LazyLock;

    static KEY: LazyLock<SecretKey> = LazyLock::new(|| SecretKey::generate(2048).unwrap());

    /// Verifies that only the supported modulus sizes can be generated.
    #[test]
    fn test_generate_rejects_odd_sizes() {
        assert!(matches!(
            SecretKey::generate(1024),
            Err(Error::UnsupportedKeySize { bits: 1024 })
        ));
        assert!(matches!(
            SecretKey::generate(2047),
            Err(Error::UnsupportedKeySize { bits: 2047 })
        ));
    }

    /// Verifies that prehash signatures verify both as prehash and as full
    /// message signatures over the same content.
    #[test]
    fn test_sign_prehash() {
        let message = b"tbs certificate bytes";
        let digest = Sha256::digest(message);

        let sig = KEY.sign_prehash(&digest).unwrap();
        assert_eq!(sig.len(), 256);

        let public = KEY.public_key();
        public.verify_prehash(&digest, &sig).unwrap();
        public.verify(message, &sig).unwrap();
        assert_eq!(KEY.sign(message).unwrap(), sig);
    }

    /// Verifies that a single flipped signature byte fails verification.
    #[test]
    fn test_verify_rejects_corruption() {
        let digest = Sha256::digest(b"message");
        let mut sig = KEY.sign_prehash(&digest).unwrap();
        sig[17] ^= 0x01;
        assert!(matches!(
            KEY.public_key().verify_prehash(&digest, &sig),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_sign_prehash_rejects_bad_digest() {
        assert!(matches!(
            KEY.sign_prehash(&[0u8; 20]),
            Err(Error::InvalidDigestLength {
                expected: 32,
                actual: 20
            })
        ));
    }

    /// Verifies that keys survive PKCS#8 and SPKI serialization.
    #[test]
    fn test_key_serialization() {
        let der = KEY.to_der().unwrap();
        let parsed = SecretKey::from_der(&der).unwrap();
        assert_eq!(parsed.public_key(), KEY.public_key());
        assert_eq!(parsed.bits(), 2048);

        let public = KEY.public_key();
        let pem = public.to_pem().unwrap();
        assert_eq!(PublicKey::from_pem(&pem).unwrap(), public);

        let spki = public.to_spki().unwrap();
        assert_eq!(PublicKey::from_spki(&spki).unwrap(), public);

        let rebuilt = PublicKey::from_components(&public.modulus(), &public.exponent()).unwrap();
        assert_eq!(rebuilt, public);
        assert_eq!(
            rebuilt.fingerprint().unwrap(),
            public.fingerprint().unwrap()
        );
    }

    #[test]
    fn test_from_der_rejects_garbage() {
        assert!(matches!(
            SecretKey::from_der(&[0x30, 0x03, 0x02, 0x01, 0x00]),
            Err(Error::KeyMalformed { .. })
        ));
        assert!(matches!(
            PublicKey::from_der(b"not a key"),
            Err(Error::KeyMalformed { .. })
        ));
    }
}
