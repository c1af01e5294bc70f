// darkbio-ca: remote-key X.509 certificate authority
// Copyright 2026 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::utils::spki_key_identifier;
use super::{DistinguishedName, Error, Result};
use crate::pem;
use crate::signer::KeyReference;
use chrono::{DateTime, Months, Utc};
use const_oid::ObjectIdentifier;
use const_oid::db::rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER;
use der::Decode;
use der::asn1::{GeneralizedTime, UtcTime};
use spki::SubjectPublicKeyInfoOwned;
use std::time::Duration;
use x509_cert::Certificate;
use x509_cert::ext::pkix::{KeyUsage, KeyUsages, SubjectKeyIdentifier};
use x509_cert::name::Name;
use x509_cert::time::{Time, Validity};

/// File name offered when a signed certificate is downloaded.
pub const CERTIFICATE_FILE_NAME: &str = "signed-certificate.cer";

/// MIME type of a downloaded DER certificate.
pub const CERTIFICATE_MIME_TYPE: &str = "application/x-x509-ca-cert";

/// Validity window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidityWindow {
    /// NotBefore UNIX timestamp (seconds).
    pub not_before: u64,
    /// NotAfter UNIX timestamp (seconds).
    pub not_after: u64,
}

impl ValidityWindow {
    /// Creates a validity window from unix timestamps.
    pub fn from_unix(not_before: u64, not_after: u64) -> Result<Self> {
        if not_before >= not_after {
            return Err(Error::InvalidValidity);
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// Creates a window starting at `start` and ending `months` calendar
    /// months later (clamped to the last day of shorter months).
    pub fn months_from(start: DateTime<Utc>, months: u32) -> Result<Self> {
        if months == 0 {
            return Err(Error::InvalidValidity);
        }
        let end = start
            .checked_add_months(Months::new(months))
            .ok_or(Error::ValidityOutOfRange { months })?;

        let not_before = u64::try_from(start.timestamp()).map_err(|_| Error::PreUnixTimestamp)?;
        let not_after = u64::try_from(end.timestamp()).map_err(|_| Error::PreUnixTimestamp)?;
        Self::from_unix(not_before, not_after)
    }

    /// Creates a window starting now and lasting `months` calendar months.
    pub fn months_from_now(months: u32) -> Result<Self> {
        Self::months_from(Utc::now(), months)
    }

    /// Encodes the window, using UTCTime through 2049 and GeneralizedTime after.
    pub(super) fn to_validity(self) -> Result<Validity> {
        Ok(Validity {
            not_before: x509_time(self.not_before)?,
            not_after: x509_time(self.not_after)?,
        })
    }
}

fn x509_time(secs: u64) -> Result<Time> {
    let since_epoch = Duration::from_secs(secs);
    match UtcTime::from_unix_duration(since_epoch) {
        Ok(time) => Ok(Time::UtcTime(time)),
        Err(_) => Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(
            since_epoch,
        )?)),
    }
}

/// CA profile for certificate issuance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateProfile {
    /// End-entity certificate profile.
    EndEntity,
    /// CA certificate profile, with optional path length constraint.
    CertificateAuthority { path_len: Option<u8> },
}

/// Issuer controlled extension set for a certificate.
///
/// BasicConstraints, KeyUsage, SubjectKeyIdentifier and AuthorityKeyIdentifier
/// are always generated by the issuer. Extensions requested inside a CSR are
/// dropped unless their OID is explicitly allowed here.
#[derive(Clone, Debug)]
pub struct ExtensionPolicy {
    /// End-entity or CA profile.
    pub profile: CertificateProfile,
    /// Explicit keyUsage; when `None`, defaults depend on profile and subject key.
    pub key_usage: Option<KeyUsage>,
    /// Requested extension OIDs copied into issued certificates.
    pub allowed_requested: Vec<ObjectIdentifier>,
}

impl ExtensionPolicy {
    /// Profile for certificates signed on behalf of a CSR.
    pub fn end_entity() -> Self {
        Self {
            profile: CertificateProfile::EndEntity,
            key_usage: None,
            allowed_requested: Vec::new(),
        }
    }

    /// Profile for self-signed roots: CA without path constraint, allowed
    /// to sign certificates, CRLs and plain digital signatures.
    pub fn root_authority() -> Self {
        Self {
            profile: CertificateProfile::CertificateAuthority { path_len: None },
            key_usage: Some(KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign,
            )),
            allowed_requested: Vec::new(),
        }
    }

    /// Permits a CSR requested extension to be copied into the certificate.
    pub fn allow_requested(mut self, oid: ObjectIdentifier) -> Self {
        self.allowed_requested.push(oid);
        self
    }

    /// Overrides the derived keyUsage.
    pub fn with_key_usage(mut self, usage: KeyUsage) -> Self {
        self.key_usage = Some(usage);
        self
    }
}

/// Everything the assembler needs to sign with a custody held issuer key.
#[derive(Clone, Debug)]
pub struct IssuerIdentity {
    /// Issuer name in the store.
    pub name: String,
    /// Subject DN of the issuer certificate, used verbatim as the issuer DN.
    pub subject: Name,
    /// Issuer public key, as returned by custody.
    pub public_key: SubjectPublicKeyInfoOwned,
    /// Key identifier written into the AuthorityKeyIdentifier of children.
    pub key_identifier: Vec<u8>,
    /// DER of the issuer certificate.
    pub certificate: Vec<u8>,
    pub(crate) key: KeyReference,
}

impl IssuerIdentity {
    /// Builds an identity from an issuer certificate and the custody reference
    /// of its key. The key identifier is taken from the certificate's
    /// SubjectKeyIdentifier, falling back to the SHA-1 of its public key.
    pub fn from_certificate(
        name: impl Into<String>,
        key: KeyReference,
        certificate: Vec<u8>,
    ) -> Result<Self> {
        let parsed = Certificate::from_der(&certificate)?;
        let tbs = parsed.tbs_certificate;

        let mut key_identifier = None;
        for ext in tbs.extensions.iter().flatten() {
            if ext.extn_id == ID_CE_SUBJECT_KEY_IDENTIFIER {
                let ski = SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())?;
                key_identifier = Some(ski.0.as_bytes().to_vec());
            }
        }
        let key_identifier = key_identifier
            .unwrap_or_else(|| spki_key_identifier(&tbs.subject_public_key_info));

        Ok(Self {
            name: name.into(),
            subject: tbs.subject,
            public_key: tbs.subject_public_key_info,
            key_identifier,
            certificate,
            key,
        })
    }

    /// Custody reference of the issuer key.
    pub(crate) fn key(&self) -> &KeyReference {
        &self.key
    }
}

/// A certificate produced by the assembler, in both structured and encoded form.
#[derive(Clone, Debug)]
pub struct SignedCertificate {
    pub(super) certificate: Certificate,
    pub(super) der: Vec<u8>,
}

impl SignedCertificate {
    /// Wraps an existing DER certificate, checking only that it decodes.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            certificate: Certificate::from_der(der)?,
            der: der.to_vec(),
        })
    }

    /// Returns the DER encoding.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// Consumes the certificate and returns its DER encoding.
    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    /// Returns the PEM encoding.
    pub fn to_pem(&self) -> String {
        pem::encode("CERTIFICATE", &self.der)
    }

    /// Returns the structured certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Returns the serial number content octets.
    pub fn serial(&self) -> &[u8] {
        self.certificate.tbs_certificate.serial_number.as_bytes()
    }

    /// Returns the subject DN.
    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.certificate.tbs_certificate.subject)
    }

    /// Returns the issuer DN.
    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.certificate.tbs_certificate.issuer)
    }

    /// Returns the validity window.
    pub fn validity(&self) -> ValidityWindow {
        let validity = &self.certificate.tbs_certificate.validity;
        ValidityWindow {
            not_before: validity.not_before.to_unix_duration().as_secs(),
            not_after: validity.not_after.to_unix_duration().as_secs(),
        }
    }
}

/// Parsed certificate metadata.
#[derive(Clone, Debug)]
pub struct CertificateMetadata {
    /// Parsed serial bytes.
    pub serial: Vec<u8>,
    /// Parsed subject DN.
    pub subject: DistinguishedName,
    /// Parsed issuer DN.
    pub issuer: DistinguishedName,
    /// Parsed validity window.
    pub validity: ValidityWindow,
    /// Whether `basicConstraints.ca` is true.
    pub is_ca: bool,
    /// Parsed `pathLenConstraint` when present.
    pub path_len: Option<u32>,
    /// Parsed keyUsage extension.
    pub key_usage: Option<KeyUsage>,
    /// Parsed SKI bytes.
    pub subject_key_id: Option<Vec<u8>>,
    /// Parsed AKI bytes.
    pub authority_key_id: Option<Vec<u8>>,
    /// OIDs of every extension, in certificate order.
    pub extensions: Vec<ObjectIdentifier>,
    /// Subject public key.
    pub public_key: SubjectPublicKeyInfoOwned,
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    /// Verifies that month arithmetic lands on the same calendar day.
    #[test]
    fn test_months_from() {
        let start = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let window = ValidityWindow::months_from(start, 12).unwrap();

        let end = Utc.with_ymd_and_hms(2027, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(window.not_before, start.timestamp() as u64);
        assert_eq!(window.not_after, end.timestamp() as u64);
    }

    /// Verifies that adding months to a month end clamps instead of overflowing.
    #[test]
    fn test_months_from_clamps_month_end() {
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let window = ValidityWindow::months_from(start, 1).unwrap();

        let end = Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap();
        assert_eq!(window.not_after, end.timestamp() as u64);
    }

    #[test]
    fn test_rejects_empty_windows() {
        assert!(matches!(
            ValidityWindow::months_from_now(0),
            Err(Error::InvalidValidity)
        ));
        assert!(matches!(
            ValidityWindow::from_unix(10, 10),
            Err(Error::InvalidValidity)
        ));
        assert!(matches!(
            ValidityWindow::from_unix(11, 10),
            Err(Error::InvalidValidity)
        ));
    }

    /// Verifies the UTCTime/GeneralizedTime switch at 2050.
    #[test]
    fn test_time_encoding_switch() {
        let before = Utc.with_ymd_and_hms(2049, 12, 31, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2050, 1, 1, 0, 0, 0).unwrap();

        let validity = ValidityWindow::from_unix(before.timestamp() as u64, after.timestamp() as u64)
            .unwrap()
            .to_validity()
            .unwrap();
        assert!(matches!(validity.not_before, Time::UtcTime(_)));
        assert!(matches!(validity.not_after, Time::GeneralTime(_)));
    }
}
