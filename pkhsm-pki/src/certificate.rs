//! X.509 certificate issuance.

use log::debug;
use rcgen::{
    BasicConstraints,
    CertificateParams,
    CertificateSigningRequestParams,
    DistinguishedName,
    DnType,
    DnValue,
    ExtendedKeyUsagePurpose,
    IsCa,
    Issuer,
    KeyPair,
    KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::Error;

/// A permitted use of a certificate's key.
///
/// Uses map to the key usage or extended key usage extension of an issued certificate.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    strum::Display,
    strum::EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyUse {
    /// Verifying digital signatures.
    DigitalSignature,

    /// Non-repudiation.
    ContentCommitment,

    /// Encrypting keys.
    KeyEncipherment,

    /// Encrypting data.
    DataEncipherment,

    /// Key agreement.
    KeyAgreement,

    /// Signing certificates.
    CertSigning,

    /// Signing certificate revocation lists.
    CrlSigning,

    /// TLS server authentication.
    ServerAuth,

    /// TLS client authentication.
    ClientAuth,

    /// Signing code.
    CodeSigning,

    /// Protecting email.
    EmailProtection,

    /// Timestamping.
    Timestamping,

    /// Signing OCSP responses.
    OcspSigning,
}

impl KeyUse {
    fn key_usage(&self) -> Option<KeyUsagePurpose> {
        Some(match self {
            Self::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            Self::ContentCommitment => KeyUsagePurpose::ContentCommitment,
            Self::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            Self::DataEncipherment => KeyUsagePurpose::DataEncipherment,
            Self::KeyAgreement => KeyUsagePurpose::KeyAgreement,
            Self::CertSigning => KeyUsagePurpose::KeyCertSign,
            Self::CrlSigning => KeyUsagePurpose::CrlSign,
            _ => return None,
        })
    }

    fn extended_key_usage(&self) -> Option<ExtendedKeyUsagePurpose> {
        Some(match self {
            Self::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            Self::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            Self::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            Self::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            Self::Timestamping => ExtendedKeyUsagePurpose::TimeStamping,
            Self::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
            _ => return None,
        })
    }
}

/// The properties of an issued certificate.
///
/// # Examples
///
/// ```
/// use pkhsm_pki::{CertificateProfile, KeyUse};
///
/// let profile = CertificateProfile::new(3652 * 24)
///     .common_name("piers")
///     .ca(true)
///     .allowed_uses([KeyUse::CertSigning]);
///
/// assert_eq!(profile.validity_hours(), 87648);
/// assert!(profile.is_ca());
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateProfile {
    common_name: Option<String>,
    validity_hours: u32,
    is_ca: bool,
    allowed_uses: Vec<KeyUse>,
}

impl CertificateProfile {
    /// Creates a new [`CertificateProfile`] for certificates valid for `validity_hours`.
    ///
    /// Certificates are not CA certificates and carry no usage restrictions by default.
    pub fn new(validity_hours: u32) -> Self {
        Self {
            common_name: None,
            validity_hours,
            is_ca: false,
            allowed_uses: Vec::new(),
        }
    }

    /// Sets the subject common name.
    ///
    /// Required for self-signed certificates.
    /// For signed requests it replaces the subject of the request.
    pub fn common_name(mut self, common_name: &str) -> Self {
        self.common_name = Some(common_name.to_string());
        self
    }

    /// Sets whether issued certificates are CA certificates.
    pub fn ca(mut self, is_ca: bool) -> Self {
        self.is_ca = is_ca;
        self
    }

    /// Sets the permitted uses of issued certificates.
    ///
    /// An empty list adds no key usage extensions.
    pub fn allowed_uses(mut self, uses: impl IntoIterator<Item = KeyUse>) -> Self {
        self.allowed_uses = uses.into_iter().collect();
        self
    }

    /// Returns the validity period in hours.
    pub fn validity_hours(&self) -> u32 {
        self.validity_hours
    }

    /// Returns whether issued certificates are CA certificates.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Applies the profile to `params`, with the validity period starting now.
    fn apply(&self, params: &mut CertificateParams) -> Result<(), Error> {
        if self.validity_hours == 0 {
            return Err(Error::InvalidValidity);
        }
        let not_before = OffsetDateTime::now_utc();
        params.not_before = not_before;
        params.not_after = not_before + Duration::hours(i64::from(self.validity_hours));

        if let Some(common_name) = self.common_name.as_ref() {
            let mut distinguished_name = DistinguishedName::new();
            distinguished_name.push(
                DnType::CommonName,
                DnValue::Utf8String(common_name.to_string()),
            );
            params.distinguished_name = distinguished_name;
        }

        params.is_ca = if self.is_ca {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            IsCa::NoCa
        };
        params.key_usages = self
            .allowed_uses
            .iter()
            .filter_map(KeyUse::key_usage)
            .collect();
        params.extended_key_usages = self
            .allowed_uses
            .iter()
            .filter_map(KeyUse::extended_key_usage)
            .collect();
        Ok(())
    }
}

fn load_key_pair(private_key_pem: &str, context: &'static str) -> Result<KeyPair, Error> {
    KeyPair::from_pem(private_key_pem).map_err(|source| Error::X509 { context, source })
}

/// Issues a self-signed certificate for `private_key_pem`.
///
/// # Errors
///
/// Returns an error if
/// - `profile` has no common name or an empty validity period,
/// - `private_key_pem` is not a PKCS#8 PEM private key,
/// - or signing the certificate fails.
pub fn self_sign(private_key_pem: &str, profile: &CertificateProfile) -> Result<String, Error> {
    if profile.common_name.is_none() {
        return Err(Error::MissingCommonName);
    }
    let key_pair = load_key_pair(private_key_pem, "loading the private key")?;

    let mut params = CertificateParams::default();
    profile.apply(&mut params)?;
    debug!(
        is_ca = profile.is_ca,
        validity_hours = profile.validity_hours;
        "Issuing self-signed certificate"
    );
    let certificate = params
        .self_signed(&key_pair)
        .map_err(|source| Error::X509 {
            context: "self-signing a certificate",
            source,
        })?;
    Ok(certificate.pem())
}

/// Issues a certificate for the subject and public key of the request `csr_pem`, signed by the
/// CA described by `ca_private_key_pem` and `ca_cert_pem`.
///
/// The subject of the request is kept, unless `profile` sets a common name.
///
/// # Errors
///
/// Returns an error if
/// - `profile` has an empty validity period,
/// - `csr_pem` is not a valid PEM certificate signing request,
/// - the CA key or certificate can not be loaded,
/// - or signing the certificate fails.
pub fn sign_request(
    csr_pem: &str,
    ca_private_key_pem: &str,
    ca_cert_pem: &str,
    profile: &CertificateProfile,
) -> Result<String, Error> {
    let mut request =
        CertificateSigningRequestParams::from_pem(csr_pem).map_err(|source| Error::X509 {
            context: "parsing a certificate signing request",
            source,
        })?;
    profile.apply(&mut request.params)?;

    let ca_key = load_key_pair(ca_private_key_pem, "loading the CA private key")?;
    let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, &ca_key).map_err(|source| Error::X509 {
        context: "loading the CA certificate",
        source,
    })?;
    debug!(
        is_ca = profile.is_ca,
        validity_hours = profile.validity_hours;
        "Signing certificate request"
    );
    let certificate = request.signed_by(&issuer).map_err(|source| Error::X509 {
        context: "signing a certificate request",
        source,
    })?;
    Ok(certificate.pem())
}
