// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Issuer lifecycle management.
//!
//! An issuer moves through `Requested → Active → Deleted`. Roots are either
//! generated in custody and self-signed here, or imported from a PKCS#12
//! container whose key is handed to custody and whose certificate is kept
//! as supplied. The inventory lives behind [`IssuerStore`]; no store lock is
//! ever held across a custody call.

mod error;
mod store;

pub use error::{Error, ErrorKind, Result};
pub use store::{
    Expected, IssuerOrigin, IssuerRecord, IssuerState, IssuerStore, MemoryIssuerStore, Reservation,
};

use crate::config::{Backend, Config, IssuanceConfig};
use crate::csr::{self, CsrSummary};
use crate::signer::{self, ImportedKey, KeyReference, KeySpec, RemoteKeySigner};
use crate::x509::{
    self, DistinguishedName, ExtensionPolicy, IssuerIdentity, SignedCertificate, ValidityWindow,
};
use crate::{rand, rsa};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the issuer seeded into the in-memory back-end.
pub const MOCK_ROOT_NAME: &str = "mock-root-ca";

/// Subject of the issuer seeded into the in-memory back-end.
pub const MOCK_ROOT_SUBJECT: &str = "CN=Mock Root CA";

/// Longest accepted issuer name.
pub const MAX_NAME_LEN: usize = 127;

const RESERVED: Expected<'static> = Expected {
    state: IssuerState::Requested,
    key: None,
};

/// A parsed CSR offered to an operator before signing.
#[derive(Clone, Debug, Serialize)]
pub struct CsrInspection {
    pub summary: CsrSummary,
    /// Validity proposed for the certificate, in months.
    pub default_validity_months: u32,
}

/// Listing entry of an active issuer.
#[derive(Clone, Debug)]
pub struct IssuerSummary {
    pub name: String,
    pub subject: DistinguishedName,
    pub origin: IssuerOrigin,
    pub validity: ValidityWindow,
    pub is_ca: bool,
    /// Hex encoded serial of the issuer certificate.
    pub serial: String,
    pub created_at: DateTime<Utc>,
}

/// An issuer left out of a listing, and why.
#[derive(Clone, Debug)]
pub struct SkippedIssuer {
    pub name: String,
    pub reason: String,
    pub retryable: bool,
}

/// Result of [`IssuerManager::list`].
#[derive(Clone, Debug, Default)]
pub struct IssuerListing {
    pub issuers: Vec<IssuerSummary>,
    pub skipped: Vec<SkippedIssuer>,
}

/// Creates, imports, deletes and signs with issuers.
pub struct IssuerManager {
    signer: Arc<dyn RemoteKeySigner>,
    store: Arc<dyn IssuerStore>,
    policy: ExtensionPolicy,
    defaults: IssuanceConfig,
}

impl IssuerManager {
    /// Creates a manager over a custody back-end and an inventory. Leaf
    /// certificates use [`ExtensionPolicy::end_entity`].
    pub fn new(signer: Arc<dyn RemoteKeySigner>, store: Arc<dyn IssuerStore>) -> Self {
        Self {
            signer,
            store,
            policy: ExtensionPolicy::end_entity(),
            defaults: IssuanceConfig::default(),
        }
    }

    /// Replaces the extension policy applied to signed CSRs.
    pub fn with_extension_policy(mut self, policy: ExtensionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the issuance defaults.
    pub fn with_defaults(mut self, defaults: IssuanceConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Wires a manager from configuration, seeding the mock root on the
    /// in-memory back-end when asked to.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let manager = Self::new(config.build_signer()?, Arc::new(MemoryIssuerStore::new()))
            .with_defaults(config.issuance.clone());

        if config.custody.backend == Backend::Memory && config.custody.memory.seed_mock_root {
            manager
                .provision_root(
                    MOCK_ROOT_NAME,
                    MOCK_ROOT_SUBJECT,
                    config.issuance.root_validity_months,
                    config.issuance.root_key_size,
                )
                .await?;
        }
        Ok(manager)
    }

    /// Generates a custody key and a self-signed CA certificate for it. The
    /// issuer is named `root-` followed by 8 random hex digits.
    pub async fn create_root(
        &self,
        subject: &str,
        validity_months: u32,
        key_size: usize,
    ) -> Result<IssuerIdentity> {
        let name = format!("root-{}", rand::hex_suffix(4)?);
        self.provision_root(&name, subject, validity_months, key_size)
            .await
    }

    /// Same as [`create_root`](Self::create_root) with the configured subject,
    /// validity and key size.
    pub async fn create_default_root(&self) -> Result<IssuerIdentity> {
        let defaults = &self.defaults;
        self.create_root(
            &defaults.root_subject,
            defaults.root_validity_months,
            defaults.root_key_size,
        )
        .await
    }

    /// Imports a root from a PKCS#12 container. The key goes to custody, the
    /// certificate is kept exactly as supplied.
    pub async fn import_root(
        &self,
        name: &str,
        pkcs12: &[u8],
        password: Option<&str>,
    ) -> Result<IssuerIdentity> {
        validate_name(name)?;
        let previous = self.reserve(name, IssuerOrigin::Imported).await?;

        let ImportedKey { key, certificate } = match self
            .signer
            .import_pkcs12(name, pkcs12, password)
            .await
        {
            Ok(imported) => imported,
            Err(err) => {
                self.release(name, None, previous).await;
                return Err(match err {
                    signer::Error::Pkcs12 { details } => Error::Pkcs12 { details },
                    other => other.into(),
                });
            }
        };
        let activated = async {
            let meta = x509::inspect_certificate(&certificate)?;
            if !meta.is_ca {
                warn!(issuer = name, subject = %meta.subject, "imported root lacks CA basic constraints");
            }
            let identity = IssuerIdentity::from_certificate(name, key.clone(), certificate)?;
            self.activate(name, IssuerOrigin::Imported, &identity).await?;
            Ok::<_, Error>((identity, meta.subject))
        }
        .await;

        match activated {
            Ok((identity, subject)) => {
                info!(issuer = name, %subject, "imported root issuer");
                Ok(identity)
            }
            Err(err) => {
                self.release(name, Some(&key), previous).await;
                Err(err)
            }
        }
    }

    /// Signs a CSR with an active issuer, valid from now for `validity_months`.
    pub async fn sign(
        &self,
        name: &str,
        csr_bytes: &[u8],
        validity_months: u32,
    ) -> Result<SignedCertificate> {
        let identity = self.issuer(name).await?;
        let request = csr::decode(csr_bytes)?;
        let validity = ValidityWindow::months_from_now(validity_months)?;

        let certificate =
            x509::issue(&*self.signer, &identity, &request, validity, &self.policy).await?;
        info!(
            issuer = name,
            subject = %certificate.subject(),
            serial = %hex::encode(certificate.serial()),
            "issued certificate"
        );
        Ok(certificate)
    }

    /// Decodes a CSR for operator review without signing anything.
    pub fn inspect(&self, csr_bytes: &[u8]) -> Result<CsrInspection> {
        let request = csr::decode(csr_bytes)?;
        Ok(CsrInspection {
            summary: request.summary(),
            default_validity_months: self.defaults.default_validity_months,
        })
    }

    /// Deletes an issuer and its custody key.
    ///
    /// Deleting an already deleted issuer succeeds; an unknown name fails with
    /// [`Error::NotFound`]. A custody key that is already gone is tolerated.
    /// The tombstone is only written while the record still holds the key
    /// that was deleted.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let record = self.store.get(name).await?.ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })?;
        match record.state {
            IssuerState::Deleted => {
                debug!(issuer = name, "issuer already deleted");
                return Ok(());
            }
            IssuerState::Requested => {
                return Err(Error::NotFound {
                    name: name.to_string(),
                });
            }
            IssuerState::Active => {}
        }
        if let Some(key) = &record.key {
            match self.signer.delete_key(key).await {
                Ok(()) => {}
                Err(signer::Error::NotFound { .. }) => {
                    warn!(issuer = name, "custody key already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }
        let expected = Expected {
            state: IssuerState::Active,
            key: record.key.as_ref(),
        };
        let mut tombstone = record.clone();
        tombstone.state = IssuerState::Deleted;
        tombstone.key = None;
        if !self.store.transition(name, expected, Some(tombstone)).await? {
            debug!(issuer = name, "issuer changed while deleting, leaving it in place");
            return Ok(());
        }
        info!(issuer = name, "deleted issuer");
        Ok(())
    }

    /// Lists active issuers. Entries whose certificate does not parse or whose
    /// custody key cannot be reached are reported in `skipped` instead of
    /// failing the listing.
    pub async fn list(&self) -> Result<IssuerListing> {
        let mut listing = IssuerListing::default();
        for record in self.store.list().await? {
            if record.state != IssuerState::Active {
                continue;
            }
            match self.summarize(&record).await {
                Ok(summary) => listing.issuers.push(summary),
                Err(err) => {
                    warn!(issuer = %record.name, error = %err, "skipping issuer in listing");
                    listing.skipped.push(SkippedIssuer {
                        name: record.name,
                        retryable: err.is_retryable(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(listing)
    }

    /// Returns an active issuer.
    pub async fn issuer(&self, name: &str) -> Result<IssuerIdentity> {
        let record = self.store.get(name).await?;
        let Some(record) = record.filter(|r| r.state == IssuerState::Active) else {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        };
        let (Some(key), Some(certificate)) = (record.key, record.certificate) else {
            return Err(Error::Store {
                details: format!("active issuer {name} has no key or certificate"),
            });
        };
        Ok(IssuerIdentity::from_certificate(name, key, certificate)?)
    }

    /// Returns the certificate of an active issuer, for chains and download.
    pub async fn certificate(&self, name: &str) -> Result<SignedCertificate> {
        let identity = self.issuer(name).await?;
        Ok(SignedCertificate::from_der(&identity.certificate)?)
    }

    async fn provision_root(
        &self,
        name: &str,
        subject: &str,
        validity_months: u32,
        key_size: usize,
    ) -> Result<IssuerIdentity> {
        if !rsa::KEY_SIZES.contains(&key_size) {
            return Err(Error::Validation {
                field: "key_size",
                details: format!("{key_size} is not one of {:?}", rsa::KEY_SIZES),
            });
        }
        let subject = DistinguishedName::parse(subject)?.to_x509_name()?;
        let validity = ValidityWindow::months_from_now(validity_months)?;

        let previous = self.reserve(name, IssuerOrigin::Generated).await?;
        let key = match self.signer.generate_key(name, KeySpec::rsa(key_size)).await {
            Ok(key) => key,
            Err(err) => {
                self.release(name, None, previous).await;
                return Err(err.into());
            }
        };
        let activated = async {
            let public_key = self.signer.public_key(&key).await?;
            let certificate = x509::self_sign(
                &*self.signer,
                &key,
                &subject,
                &public_key,
                validity,
                &ExtensionPolicy::root_authority(),
            )
            .await?;
            let identity = IssuerIdentity::from_certificate(name, key.clone(), certificate.into_der())?;
            self.activate(name, IssuerOrigin::Generated, &identity).await?;
            Ok::<_, Error>(identity)
        }
        .await;

        match activated {
            Ok(identity) => {
                info!(
                    issuer = name,
                    subject = %DistinguishedName::from_x509_name(&identity.subject),
                    key_size,
                    validity_months,
                    "created root issuer"
                );
                Ok(identity)
            }
            Err(err) => {
                self.release(name, Some(&key), previous).await;
                Err(err)
            }
        }
    }

    // Returns the tombstone the reservation displaced, for release to restore
    async fn reserve(&self, name: &str, origin: IssuerOrigin) -> Result<Option<IssuerRecord>> {
        match self
            .store
            .insert_if_vacant(IssuerRecord::requested(name, origin))
            .await?
        {
            Reservation::Reserved(previous) => Ok(previous),
            Reservation::Taken => Err(Error::NameInUse {
                name: name.to_string(),
            }),
        }
    }

    async fn activate(
        &self,
        name: &str,
        origin: IssuerOrigin,
        identity: &IssuerIdentity,
    ) -> Result<()> {
        let mut record = IssuerRecord::requested(name, origin);
        record.state = IssuerState::Active;
        record.key = Some(identity.key().clone());
        record.certificate = Some(identity.certificate.clone());
        if !self.store.transition(name, RESERVED, Some(record)).await? {
            return Err(Error::Store {
                details: format!("reservation of {name} vanished before activation"),
            });
        }
        Ok(())
    }

    // Undoes a failed create or import, best effort. The reservation gives
    // way to the tombstone it displaced, if there was one.
    async fn release(
        &self,
        name: &str,
        key: Option<&KeyReference>,
        previous: Option<IssuerRecord>,
    ) {
        if let Some(key) = key {
            if let Err(err) = self.signer.delete_key(key).await {
                warn!(issuer = name, error = %err, "failed to delete custody key of abandoned issuer");
            }
        }
        match self.store.transition(name, RESERVED, previous).await {
            Ok(true) => {}
            Ok(false) => warn!(issuer = name, "reservation changed before it could be released"),
            Err(err) => warn!(issuer = name, error = %err, "failed to release issuer name"),
        }
    }

    async fn summarize(&self, record: &IssuerRecord) -> Result<IssuerSummary> {
        let (Some(key), Some(certificate)) = (&record.key, &record.certificate) else {
            return Err(Error::Store {
                details: "active issuer has no key or certificate".to_string(),
            });
        };
        let meta = x509::inspect_certificate(certificate)?;
        let public_key = self.signer.public_key(key).await?;
        if public_key != meta.public_key {
            return Err(Error::Store {
                details: "custody key does not match the issuer certificate".to_string(),
            });
        }
        Ok(IssuerSummary {
            name: record.name.clone(),
            subject: meta.subject,
            origin: record.origin,
            validity: meta.validity,
            is_ca: meta.is_ca,
            serial: hex::encode(&meta.serial),
            created_at: record.created_at,
        })
    }
}

/// Checks an issuer name: 1 to 127 characters of `[A-Za-z0-9-]`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::Validation {
            field: "name",
            details: format!("must be 1 to {MAX_NAME_LEN} characters"),
        });
    }
    if let Some(c) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(Error::Validation {
            field: "name",
            details: format!("{c:?} is not allowed, use letters, digits and '-'"),
        });
    }
    Ok(())
}
