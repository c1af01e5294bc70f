// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Configuration handling.

use crate::signer::{self, CloudSigner, DeadlineSigner, MemorySigner, RemoteKeySigner};
use crate::x509::DistinguishedName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

/// Result type used by configuration APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type used by configuration APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value {field}: {details}")]
    Invalid {
        field: &'static str,
        details: String,
    },
    #[error("custody access token variable {var} is not set")]
    MissingAccessToken { var: String },
    #[error(transparent)]
    Custody(#[from] signer::Error),
}

/// Main configuration file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Key custody settings
    #[serde(default)]
    pub custody: CustodyConfig,

    /// Issuance defaults
    #[serde(default)]
    pub issuance: IssuanceConfig,
}

/// Custody back-ends selectable at wiring time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process double, keys are lost on exit
    #[default]
    Memory,
    /// Cloud key vault
    Cloud,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Back-end holding the issuer keys
    #[serde(default)]
    pub backend: Backend,

    /// Deadline applied to every custody call, 0 disables it
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// In-memory back-end settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Cloud back-end settings
    #[serde(default)]
    pub cloud: CloudConfig,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            call_timeout_ms: default_call_timeout_ms(),
            memory: MemoryConfig::default(),
            cloud: CloudConfig::default(),
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Seed a `mock-root-ca` issuer on start
    #[serde(default = "default_true")]
    pub seed_mock_root: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            seed_mock_root: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Vault base URL, for example `https://example.vault.azure.net`
    #[serde(default)]
    pub vault_url: Option<String>,

    /// REST API version sent with every call
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            vault_url: None,
            api_version: default_api_version(),
            access_token_env: default_access_token_env(),
        }
    }
}

fn default_api_version() -> String {
    "7.4".to_string()
}
fn default_access_token_env() -> String {
    "CUSTODY_ACCESS_TOKEN".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuanceConfig {
    /// Validity offered for signed CSRs, in months
    #[serde(default = "default_validity_months")]
    pub default_validity_months: u32,

    /// Subject of roots created without explicit parameters
    #[serde(default = "default_root_subject")]
    pub root_subject: String,

    /// Validity of created roots, in months
    #[serde(default = "default_root_validity_months")]
    pub root_validity_months: u32,

    /// RSA modulus size of created roots
    #[serde(default = "default_root_key_size")]
    pub root_key_size: usize,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            default_validity_months: default_validity_months(),
            root_subject: default_root_subject(),
            root_validity_months: default_root_validity_months(),
            root_key_size: default_root_key_size(),
        }
    }
}

fn default_validity_months() -> u32 {
    12
}
fn default_root_subject() -> String {
    "CN=MyRootCA".to_string()
}
fn default_root_validity_months() -> u32 {
    60
}
fn default_root_key_size() -> usize {
    4096
}

impl Config {
    /// Loads config from a file path, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates config text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<()> {
        let issuance = &self.issuance;
        if issuance.default_validity_months == 0 {
            return Err(Error::Invalid {
                field: "issuance.default_validity_months",
                details: "must be positive".to_string(),
            });
        }
        if issuance.root_validity_months == 0 {
            return Err(Error::Invalid {
                field: "issuance.root_validity_months",
                details: "must be positive".to_string(),
            });
        }
        if !crate::rsa::KEY_SIZES.contains(&issuance.root_key_size) {
            return Err(Error::Invalid {
                field: "issuance.root_key_size",
                details: format!("{} is not one of {:?}", issuance.root_key_size, crate::rsa::KEY_SIZES),
            });
        }
        DistinguishedName::parse(&issuance.root_subject).map_err(|e| Error::Invalid {
            field: "issuance.root_subject",
            details: e.to_string(),
        })?;

        if self.custody.backend == Backend::Cloud {
            match &self.custody.cloud.vault_url {
                Some(url) if url.starts_with("https://") => {}
                Some(url) => {
                    return Err(Error::Invalid {
                        field: "custody.cloud.vault_url",
                        details: format!("{url} is not an https URL"),
                    });
                }
                None => {
                    return Err(Error::Invalid {
                        field: "custody.cloud.vault_url",
                        details: "required for the cloud backend".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Deadline applied to custody calls, if any.
    pub fn call_timeout(&self) -> Option<Duration> {
        match self.custody.call_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Builds the configured custody back-end.
    pub fn build_signer(&self) -> Result<Arc<dyn RemoteKeySigner>> {
        let signer: Arc<dyn RemoteKeySigner> = match self.custody.backend {
            Backend::Memory => Arc::new(MemorySigner::new()),
            Backend::Cloud => {
                let cloud = &self.custody.cloud;
                let vault_url = cloud.vault_url.as_deref().ok_or(Error::Invalid {
                    field: "custody.cloud.vault_url",
                    details: "required for the cloud backend".to_string(),
                })?;
                let token = std::env::var(&cloud.access_token_env).map_err(|_| {
                    Error::MissingAccessToken {
                        var: cloud.access_token_env.clone(),
                    }
                })?;
                Arc::new(CloudSigner::new(
                    vault_url,
                    &cloud.api_version,
                    Zeroizing::new(token),
                    self.call_timeout().unwrap_or(Duration::from_millis(
                        default_call_timeout_ms(),
                    )),
                )?)
            }
        };
        info!(
            backend = signer.backend(),
            call_timeout_ms = self.custody.call_timeout_ms,
            "custody backend configured"
        );
        Ok(match self.call_timeout() {
            Some(deadline) => Arc::new(DeadlineSigner::new(signer, deadline)),
            None => signer,
        })
    }
}
