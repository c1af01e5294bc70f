// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Client for a cloud key vault speaking the Azure Key Vault keys REST API.
//!
//! Endpoints used:
//! - `POST {vault}/keys/{name}/create` - generate a key pair
//! - `PUT {vault}/keys/{name}` - import a key from a JSON Web Key
//! - `GET {kid}` - fetch the public half of a key version
//! - `POST {kid}/sign` - sign a digest
//! - `DELETE {vault}/keys/{name}` - soft-delete a key

use super::{Error, HashAlg, KeyAlgorithm, KeyReference, KeySpec, RemoteKeySigner, Result};
use crate::rsa;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use reqwest::{Client, Method, StatusCode};
use ::rsa::traits::{PrivateKeyParts, PublicKeyParts};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use spki::SubjectPublicKeyInfoOwned;
use std::time::Duration;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Request body of the key creation endpoint.
#[derive(Debug, Serialize)]
struct CreateKeyRequest {
    kty: &'static str,
    key_size: usize,
    key_ops: [&'static str; 2],
}

/// Request body of the key import endpoint.
#[derive(Serialize)]
struct ImportKeyRequest<'a> {
    key: &'a PrivateJwk,
}

/// RSA private key in JSON Web Key form, wiped from memory on drop.
#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
struct PrivateJwk {
    kty: String,
    key_ops: Vec<String>,
    n: String,
    e: String,
    d: String,
    p: String,
    q: String,
    dp: String,
    dq: String,
    qi: String,
}

/// Key bundle returned by create, import and get.
#[derive(Debug, Deserialize)]
struct KeyBundle {
    key: PublicJwk,
}

#[derive(Debug, Deserialize)]
struct PublicJwk {
    kid: String,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignRequest {
    alg: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    value: String,
}

/// Custody back-end backed by a cloud key vault.
pub struct CloudSigner {
    vault_url: String,
    api_version: String,
    access_token: Zeroizing<String>,
    timeout: Duration,
    http_client: Client,
}

impl CloudSigner {
    /// Creates a client for the vault at `vault_url`, authenticating every
    /// request with the given bearer token.
    pub fn new(
        vault_url: &str,
        api_version: &str,
        access_token: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let vault_url = vault_url.trim_end_matches('/').to_string();
        if !vault_url.starts_with("https://") {
            return Err(Error::Protocol {
                details: format!("vault url must use https: {vault_url}"),
            });
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Protocol {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            vault_url,
            api_version: api_version.to_string(),
            access_token,
            timeout,
            http_client,
        })
    }

    /// Returns the base URL of the vault.
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    fn keys_url(&self, name: &str) -> String {
        format!("{}/keys/{}", self.vault_url, name)
    }

    /// Validates that a key reference points into this vault and returns its
    /// key name. Bearer tokens are never sent to hosts other than the vault.
    fn key_name<'a>(&self, key: &'a KeyReference) -> Result<&'a str> {
        let prefix = format!("{}/keys/", self.vault_url);
        let path = key
            .as_str()
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| Error::PermissionDenied {
                key: key.as_str().to_string(),
                details: "key reference is outside the configured vault".to_string(),
            })?;

        match path.split('/').collect::<Vec<_>>().as_slice() {
            [name, version] if !name.is_empty() && !version.is_empty() => Ok(*name),
            _ => Err(Error::Protocol {
                details: format!("malformed key reference: {}", key.as_str()),
            }),
        }
    }

    async fn call<B, R>(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        key: Option<&str>,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(operation, %method, "calling cloud custody");

        let mut request = self
            .http_client
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())])
            .bearer_auth(self.access_token.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(classify_status(status, key.unwrap_or(url), details));
        }
        response.json::<R>().await.map_err(|e| Error::Protocol {
            details: format!("invalid {operation} response: {e}"),
        })
    }

    fn transport_error(&self, operation: &'static str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                operation,
                after: self.timeout,
            }
        } else {
            Error::Unavailable {
                details: format!("{operation} request failed: {err}"),
            }
        }
    }
}

#[async_trait]
impl RemoteKeySigner for CloudSigner {
    fn backend(&self) -> &'static str {
        "cloud"
    }

    async fn generate_key(&self, name: &str, spec: KeySpec) -> Result<KeyReference> {
        if spec.algorithm != KeyAlgorithm::Rsa || !rsa::KEY_SIZES.contains(&spec.size) {
            return Err(Error::UnsupportedAlgorithm {
                algorithm: format!("{}-{}", spec.algorithm, spec.size),
            });
        }
        let body = CreateKeyRequest {
            kty: "RSA",
            key_size: spec.size,
            key_ops: ["sign", "verify"],
        };
        let url = format!("{}/create", self.keys_url(name));
        let bundle: KeyBundle = self
            .call("generate_key", Method::POST, &url, Some(name), Some(&body))
            .await?;
        Ok(KeyReference::new(bundle.key.kid))
    }

    async fn import_key(&self, name: &str, pkcs8: Zeroizing<Vec<u8>>) -> Result<KeyReference> {
        let jwk = private_jwk(&rsa::SecretKey::from_der(&pkcs8)?)?;
        drop(pkcs8);

        let url = self.keys_url(name);
        let bundle: KeyBundle = self
            .call(
                "import_key",
                Method::PUT,
                &url,
                Some(name),
                Some(&ImportKeyRequest { key: &jwk }),
            )
            .await?;
        Ok(KeyReference::new(bundle.key.kid))
    }

    async fn delete_key(&self, key: &KeyReference) -> Result<()> {
        let url = self.keys_url(self.key_name(key)?);
        let _: serde_json::Value = self
            .call::<(), _>("delete_key", Method::DELETE, &url, Some(key.as_str()), None)
            .await?;
        Ok(())
    }

    async fn public_key(&self, key: &KeyReference) -> Result<SubjectPublicKeyInfoOwned> {
        self.key_name(key)?;
        let bundle: KeyBundle = self
            .call::<(), _>(
                "public_key",
                Method::GET,
                key.as_str(),
                Some(key.as_str()),
                None,
            )
            .await?;
        public_spki(&bundle.key)
    }

    async fn sign(&self, key: &KeyReference, digest: &[u8], hash: HashAlg) -> Result<Vec<u8>> {
        self.key_name(key)?;
        let alg = match hash {
            HashAlg::Sha256 => "RS256",
            other => {
                return Err(Error::UnsupportedAlgorithm {
                    algorithm: format!("RSA with {other}"),
                });
            }
        };
        if digest.len() != hash.digest_len() {
            return Err(Error::InvalidDigest {
                expected: hash.digest_len(),
                actual: digest.len(),
            });
        }
        let body = SignRequest {
            alg,
            value: BASE64URL.encode(digest),
        };
        let url = format!("{}/sign", key.as_str());
        let response: SignResponse = self
            .call("sign", Method::POST, &url, Some(key.as_str()), Some(&body))
            .await?;

        BASE64URL
            .decode(response.value.trim_end_matches('='))
            .map_err(|e| Error::Protocol {
                details: format!("invalid signature encoding: {e}"),
            })
    }
}

/// Maps an HTTP failure status onto the custody failure taxonomy.
fn classify_status(status: StatusCode, key: &str, details: String) -> Error {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Error::NotFound {
            key: key.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::PermissionDenied {
            key: key.to_string(),
            details,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Error::Unavailable {
            details: format!("{status}: {details}"),
        },
        s if s.is_server_error() => Error::Unavailable {
            details: format!("{status}: {details}"),
        },
        _ => Error::Protocol {
            details: format!("{status}: {details}"),
        },
    }
}

fn private_jwk(key: &rsa::SecretKey) -> Result<PrivateJwk> {
    let inner = key.as_rsa();
    let primes = inner.primes();
    if primes.len() != 2 {
        return Err(Error::InvalidKey {
            details: "multi-prime RSA keys cannot be imported".to_string(),
        });
    }
    let crt_missing = || Error::InvalidKey {
        details: "RSA key lacks CRT parameters".to_string(),
    };
    let dp = inner.dp().ok_or_else(crt_missing)?;
    let dq = inner.dq().ok_or_else(crt_missing)?;
    let qi = inner.crt_coefficient().ok_or_else(crt_missing)?;

    let b64 = |bytes: Vec<u8>| BASE64URL.encode(Zeroizing::new(bytes));
    Ok(PrivateJwk {
        kty: "RSA".to_string(),
        key_ops: vec!["sign".to_string(), "verify".to_string()],
        n: b64(inner.n().to_bytes_be()),
        e: b64(inner.e().to_bytes_be()),
        d: b64(inner.d().to_bytes_be()),
        p: b64(primes[0].to_bytes_be()),
        q: b64(primes[1].to_bytes_be()),
        dp: b64(dp.to_bytes_be()),
        dq: b64(dq.to_bytes_be()),
        qi: b64(qi.to_bytes_be()),
    })
}

fn public_spki(jwk: &PublicJwk) -> Result<SubjectPublicKeyInfoOwned> {
    if jwk.kty != "RSA" && jwk.kty != "RSA-HSM" {
        return Err(Error::UnsupportedAlgorithm {
            algorithm: jwk.kty.clone(),
        });
    }
    let field = |value: &Option<String>, name: &str| -> Result<Vec<u8>> {
        let text = value.as_deref().ok_or_else(|| Error::Protocol {
            details: format!("key bundle lacks {name}"),
        })?;
        BASE64URL
            .decode(text.trim_end_matches('='))
            .map_err(|e| Error::Protocol {
                details: format!("invalid {name} encoding: {e}"),
            })
    };
    let n = field(&jwk.n, "n")?;
    let e = field(&jwk.e, "e")?;
    Ok(rsa::PublicKey::from_components(&n, &e)?.to_spki()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::LazyLock;

    static KEY: LazyLock<rsa::SecretKey> =
        LazyLock::new(|| rsa::SecretKey::generate(2048).unwrap());

    fn signer() -> CloudSigner {
        CloudSigner::new(
            "https://ca-test.vault.azure.net/",
            "7.4",
            Zeroizing::new("token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_https() {
        assert!(matches!(
            CloudSigner::new(
                "http://vault.local",
                "7.4",
                Zeroizing::new(String::new()),
                Duration::from_secs(1)
            ),
            Err(Error::Protocol { .. })
        ));
    }

    /// Verifies that key references are only accepted for the configured vault.
    #[test]
    fn test_key_name_parsing() {
        let signer = signer();
        assert_eq!(signer.vault_url(), "https://ca-test.vault.azure.net");

        let key = KeyReference::new("https://ca-test.vault.azure.net/keys/root-1a2b3c4d/0f0e0d");
        assert_eq!(signer.key_name(&key).unwrap(), "root-1a2b3c4d");

        let foreign = KeyReference::new("https://evil.example/keys/root/1");
        assert!(matches!(
            signer.key_name(&foreign),
            Err(Error::PermissionDenied { .. })
        ));
        let unversioned = KeyReference::new("https://ca-test.vault.azure.net/keys/root");
        assert!(matches!(
            signer.key_name(&unversioned),
            Err(Error::Protocol { .. })
        ));
    }

    /// Verifies the mapping of HTTP statuses onto custody failure kinds.
    #[test]
    fn test_classify_status() {
        let kind = |status| {
            classify_status(status, "k", String::new())
                .failure_kind()
                .map(|k| format!("{k:?}"))
        };
        assert_eq!(kind(StatusCode::NOT_FOUND).as_deref(), Some("NotFound"));
        assert_eq!(kind(StatusCode::FORBIDDEN).as_deref(), Some("PermissionDenied"));
        assert_eq!(kind(StatusCode::UNAUTHORIZED).as_deref(), Some("PermissionDenied"));
        assert_eq!(kind(StatusCode::TOO_MANY_REQUESTS).as_deref(), Some("Unavailable"));
        assert_eq!(kind(StatusCode::SERVICE_UNAVAILABLE).as_deref(), Some("Unavailable"));
        assert_eq!(kind(StatusCode::BAD_REQUEST), None);
    }

    /// Verifies that exported JWK components reassemble into the same key.
    #[test]
    fn test_private_jwk_components() {
        let jwk = private_jwk(&KEY).unwrap();
        let public = PublicJwk {
            kid: "https://ca-test.vault.azure.net/keys/root/1".to_string(),
            kty: "RSA".to_string(),
            n: Some(jwk.n.clone()),
            e: Some(jwk.e.clone()),
        };
        let spki = public_spki(&public).unwrap();
        assert_eq!(
            rsa::PublicKey::from_spki(&spki).unwrap(),
            KEY.public_key()
        );
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn test_public_spki_rejects_ec() {
        let jwk = PublicJwk {
            kid: "kid".to_string(),
            kty: "EC".to_string(),
            n: None,
            e: None,
        };
        assert!(matches!(
            public_spki(&jwk),
            Err(Error::UnsupportedAlgorithm { .. })
        ));
    }

    /// Verifies that requests for foreign vaults fail before any network I/O.
    #[tokio::test]
    async fn test_sign_refuses_foreign_reference() {
        let signer = signer();
        let foreign = KeyReference::new("https://evil.example/keys/root/1");
        assert!(matches!(
            signer.sign(&foreign, &[0u8; 32], HashAlg::Sha256).await,
            Err(Error::PermissionDenied { .. })
        ));
    }
}
