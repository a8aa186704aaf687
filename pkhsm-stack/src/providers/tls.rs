//! Private keys and certificates, generated in-process.

use log::debug;
use pkhsm_engine::{Properties, Provider, ProviderError, ResourceType, Urn};
use pkhsm_pki::{
    CertificateProfile,
    KeyUse,
    MIN_RSA_BIT_LENGTH,
    generate_rsa_key,
    self_sign,
    sign_request,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{optional, string};

/// The package of the [`TlsProvider`].
pub const PACKAGE: &str = "tls";

/// A private key.
pub const PRIVATE_KEY: &str = "tls:index/privateKey:PrivateKey";

/// A self-signed certificate.
pub const SELF_SIGNED_CERT: &str = "tls:index/selfSignedCert:SelfSignedCert";

/// A certificate over a signing request, signed by a local CA.
pub const LOCALLY_SIGNED_CERT: &str = "tls:index/locallySignedCert:LocallySignedCert";

/// The only supported key algorithm.
pub const RSA_ALGORITHM: &str = "RSA";

/// The subject of a self-signed certificate.
#[derive(Clone, Debug, Default, Deserialize)]
struct Subject {
    common_name: Option<String>,
}

/// Returns the identifier of generated PEM data.
fn pem_id(pem: &str) -> String {
    hex::encode(Sha256::digest(pem.as_bytes()))
}

/// Assembles the certificate profile from the inputs of a certificate resource.
fn profile(urn: &Urn, inputs: &Properties) -> Result<CertificateProfile, ProviderError> {
    let validity_hours: u32 = optional(urn, inputs, "validity_period_hours", 0)?;
    let is_ca: bool = optional(urn, inputs, "is_ca_certificate", false)?;
    let allowed_uses: Vec<KeyUse> = optional(urn, inputs, "allowed_uses", Vec::new())?;
    if validity_hours == 0 {
        return Err(ProviderError::invalid_input(
            urn.resource_type(),
            "validity_period_hours",
            "must be at least one hour",
        ));
    }
    Ok(CertificateProfile::new(validity_hours)
        .ca(is_ca)
        .allowed_uses(allowed_uses))
}

/// Generates keys and certificates.
///
/// Generated data only lives in the recorded state, which is why every change of an input
/// replaces a resource.
/// The private key of a [`PRIVATE_KEY`] resource is a secret output.
#[derive(Clone, Debug, Default)]
pub struct TlsProvider;

impl TlsProvider {
    fn private_key(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        let algorithm = string(urn, inputs, "algorithm")?;
        if algorithm != RSA_ALGORITHM {
            return Err(ProviderError::invalid_input(
                urn.resource_type(),
                "algorithm",
                &format!("only {RSA_ALGORITHM} is supported"),
            ));
        }
        let bits: usize = optional(urn, inputs, "rsa_bits", MIN_RSA_BIT_LENGTH)?;
        let key = generate_rsa_key(bits).map_err(ProviderError::api)?;

        let mut outputs = inputs.clone();
        outputs.insert("id".to_string(), json!(pem_id(key.public_key_pem())));
        outputs.insert(
            "private_key_pem".to_string(),
            json!(key.private_key_pem().expose_secret()),
        );
        outputs.insert("public_key_pem".to_string(), json!(key.public_key_pem()));
        Ok(outputs)
    }

    fn self_signed_cert(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        let private_key_pem = string(urn, inputs, "private_key_pem")?;
        let subject: Subject = optional(urn, inputs, "subject", Subject::default())?;
        let mut profile = profile(urn, inputs)?;
        if let Some(common_name) = subject.common_name.as_deref() {
            profile = profile.common_name(common_name);
        }
        let cert_pem = self_sign(private_key_pem, &profile).map_err(ProviderError::api)?;

        let mut outputs = inputs.clone();
        outputs.insert("id".to_string(), json!(pem_id(&cert_pem)));
        outputs.insert("cert_pem".to_string(), json!(cert_pem));
        Ok(outputs)
    }

    fn locally_signed_cert(
        &self,
        urn: &Urn,
        inputs: &Properties,
    ) -> Result<Properties, ProviderError> {
        let cert_request_pem = string(urn, inputs, "cert_request_pem")?;
        let ca_private_key_pem = string(urn, inputs, "ca_private_key_pem")?;
        let ca_cert_pem = string(urn, inputs, "ca_cert_pem")?;
        let profile = profile(urn, inputs)?;
        let cert_pem = sign_request(cert_request_pem, ca_private_key_pem, ca_cert_pem, &profile)
            .map_err(ProviderError::api)?;

        let mut outputs = inputs.clone();
        outputs.insert("id".to_string(), json!(pem_id(&cert_pem)));
        outputs.insert("cert_pem".to_string(), json!(cert_pem));
        Ok(outputs)
    }
}

impl Provider for TlsProvider {
    fn package(&self) -> &str {
        PACKAGE
    }

    fn create(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        debug!(urn:% = urn; "Generating {}", urn.resource_type());
        match urn.resource_type().as_str() {
            PRIVATE_KEY => self.private_key(urn, inputs),
            SELF_SIGNED_CERT => self.self_signed_cert(urn, inputs),
            LOCALLY_SIGNED_CERT => self.locally_signed_cert(urn, inputs),
            _ => Err(ProviderError::Unsupported {
                resource_type: urn.resource_type().clone(),
            }),
        }
    }

    fn update(
        &self,
        urn: &Urn,
        _outputs: &Properties,
        inputs: &Properties,
    ) -> Result<Properties, ProviderError> {
        self.create(urn, inputs)
    }

    fn delete(&self, urn: &Urn, _outputs: &Properties) -> Result<(), ProviderError> {
        debug!(urn:% = urn; "Discarding {}", urn.resource_type());
        Ok(())
    }

    fn read(&self, urn: &Urn, _args: &Properties) -> Result<Properties, ProviderError> {
        Err(ProviderError::Unsupported {
            resource_type: urn.resource_type().clone(),
        })
    }

    fn replace_on_change(&self, _resource_type: &ResourceType, _field: &str) -> bool {
        true
    }

    fn secret_outputs(&self, resource_type: &ResourceType) -> Vec<String> {
        match resource_type.as_str() {
            PRIVATE_KEY => vec!["private_key_pem".to_string()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use testresult::TestResult;
    use x509_parser::pem::parse_x509_pem;

    use super::*;

    fn urn(resource_type: &str, name: &str) -> TestResult<Urn> {
        Ok(format!("{resource_type}::{name}").parse()?)
    }

    #[fixture]
    fn ca() -> TestResult<(Properties, Properties)> {
        let key = TlsProvider.create(
            &urn(PRIVATE_KEY, "customerCAKey")?,
            &Properties::from([("algorithm".to_string(), json!("RSA"))]),
        )?;
        let cert = TlsProvider.create(
            &urn(SELF_SIGNED_CERT, "customerCACrt")?,
            &Properties::from([
                ("private_key_pem".to_string(), key["private_key_pem"].clone()),
                ("validity_period_hours".to_string(), json!(87648)),
                ("is_ca_certificate".to_string(), json!(true)),
                ("allowed_uses".to_string(), json!([])),
                ("subject".to_string(), json!({ "common_name": "piers" })),
            ]),
        )?;
        Ok((key, cert))
    }

    #[rstest]
    fn self_signed_cert_is_a_ca(ca: TestResult<(Properties, Properties)>) -> TestResult {
        let (key, cert) = ca?;
        let pem = cert["cert_pem"].as_str().ok_or("no certificate")?;
        let (_, pem) = parse_x509_pem(pem.as_bytes())?;
        let certificate = pem.parse_x509()?;

        assert!(certificate.is_ca());
        assert_eq!(
            certificate
                .subject()
                .iter_common_name()
                .next()
                .ok_or("no common name")?
                .as_str()?,
            "piers"
        );
        assert_eq!(
            key["id"],
            json!(pem_id(key["public_key_pem"].as_str().ok_or("no public key")?))
        );
        Ok(())
    }

    #[rstest]
    fn garbage_request_is_rejected(ca: TestResult<(Properties, Properties)>) -> TestResult {
        let (key, cert) = ca?;
        let result = TlsProvider.create(
            &urn(LOCALLY_SIGNED_CERT, "signedCrt")?,
            &Properties::from([
                ("cert_request_pem".to_string(), json!("not a request")),
                ("ca_private_key_pem".to_string(), key["private_key_pem"].clone()),
                ("ca_cert_pem".to_string(), cert["cert_pem"].clone()),
                ("validity_period_hours".to_string(), json!(87648)),
            ]),
        );

        assert!(matches!(result, Err(ProviderError::Api(_))));
        Ok(())
    }

    #[rstest]
    #[case::algorithm(PRIVATE_KEY, json!({ "algorithm": "ECDSA" }), "algorithm")]
    #[case::validity(SELF_SIGNED_CERT, json!({ "private_key_pem": "", "validity_period_hours": 0 }), "validity_period_hours")]
    #[case::allowed_uses(SELF_SIGNED_CERT, json!({ "private_key_pem": "", "validity_period_hours": 1, "allowed_uses": ["flying"] }), "allowed_uses")]
    #[case::request(LOCALLY_SIGNED_CERT, json!({}), "cert_request_pem")]
    fn invalid_inputs_fail(
        #[case] resource_type: &str,
        #[case] inputs: serde_json::Value,
        #[case] expected: &str,
    ) -> TestResult {
        let inputs: Properties = serde_json::from_value(inputs)?;

        match TlsProvider.create(&urn(resource_type, "invalid")?, &inputs) {
            Err(ProviderError::InvalidInput { field, .. }) => assert_eq!(field, expected),
            other => panic!("Expected an invalid input, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn only_the_private_key_is_secret() -> TestResult {
        assert_eq!(
            TlsProvider.secret_outputs(&PRIVATE_KEY.parse()?),
            ["private_key_pem"]
        );
        assert!(TlsProvider.secret_outputs(&SELF_SIGNED_CERT.parse()?).is_empty());
        Ok(())
    }
}
