//! The customer certificate authority and the signed certificate of the HSM cluster.
//!
//! The workflow moves through the following stages, each gated on the previous one by a
//! dependency edge:
//!
//! 1. The CA key is generated.
//! 2. The self-signed CA certificate is issued.
//! 3. The signing request of the cluster is read, once its first node exists.
//! 4. The cluster certificate is signed by the CA.
//!
//! Once signed, the cluster certificate ignores changes of the signing request.
//! It is only issued again if the CA changes or if its replacement is requested explicitly.

use pkhsm_engine::{Inputs, Output, Resource, ResourceOptions, Stack};
use serde_json::json;

use crate::{
    Error,
    config::PkiConfig,
    hsm::HsmCluster,
    providers::tls::{LOCALLY_SIGNED_CERT, PRIVATE_KEY, RSA_ALGORITHM, SELF_SIGNED_CERT},
};

/// The input of the cluster certificate holding the signing request.
pub const CERT_REQUEST_FIELD: &str = "cert_request_pem";

/// The declared certificate authority and cluster certificate.
#[derive(Clone, Debug)]
pub struct Pki {
    /// The private key of the CA.
    pub ca_key: Resource,

    /// The self-signed CA certificate.
    pub ca_cert: Resource,

    /// The cluster certificate signed by the CA.
    pub cluster_cert: Resource,
}

impl Pki {
    /// Returns the PEM encoded CA certificate.
    pub fn ca_cert_pem(&self) -> Output<String> {
        self.ca_cert.string("cert_pem")
    }

    /// Returns the PEM encoded cluster certificate.
    pub fn cluster_cert_pem(&self) -> Output<String> {
        self.cluster_cert.string("cert_pem")
    }
}

/// Declares the CA and the certificate of `hsm`.
///
/// # Errors
///
/// Returns an error if a resource can not be declared.
pub fn declare(stack: &mut Stack, config: &PkiConfig, hsm: &HsmCluster) -> Result<Pki, Error> {
    let allowed_uses = json!(config.allowed_uses);

    let ca_key = stack.resource(
        PRIVATE_KEY,
        "customerCAKey",
        Inputs::new()
            .with("algorithm", json!(RSA_ALGORITHM))
            .with("rsa_bits", json!(config.rsa_bits)),
        ResourceOptions::new(),
    )?;
    let ca_cert = stack.resource(
        SELF_SIGNED_CERT,
        "customerCACrt",
        Inputs::new()
            .output("private_key_pem", ca_key.string("private_key_pem"))
            .with("validity_period_hours", json!(config.validity_hours))
            .with("is_ca_certificate", json!(true))
            .with("allowed_uses", allowed_uses.clone())
            .with("subject", json!({ "common_name": config.common_name })),
        ResourceOptions::new(),
    )?;
    let cluster_cert = stack.resource(
        LOCALLY_SIGNED_CERT,
        "signedCrt",
        Inputs::new()
            .output(CERT_REQUEST_FIELD, hsm.csr())
            .output("ca_private_key_pem", ca_key.string("private_key_pem"))
            .output("ca_cert_pem", ca_cert.string("cert_pem"))
            .with("validity_period_hours", json!(config.validity_hours))
            .with("is_ca_certificate", json!(true))
            .with("allowed_uses", allowed_uses),
        ResourceOptions::new()
            .ignore_changes([CERT_REQUEST_FIELD])
            .depends_on(hsm.hsm.urn()),
    )?;

    Ok(Pki {
        ca_key,
        ca_cert,
        cluster_cert,
    })
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::config::{HsmConfig, NetworkConfig};

    #[test]
    fn signing_is_gated_on_ca_and_node() -> TestResult {
        let mut stack = Stack::new("test");
        let network = crate::network::declare(&mut stack, &NetworkConfig::default())?;
        let hsm = crate::hsm::declare(&mut stack, &HsmConfig::default(), &network)?;
        let pki = declare(&mut stack, &PkiConfig::default(), &hsm)?;

        let graph = stack.graph()?;
        for before in [
            pki.ca_key.urn(),
            pki.ca_cert.urn(),
            hsm.hsm.urn(),
            hsm.cluster_read.urn(),
        ] {
            assert!(graph.precedes(before, pki.cluster_cert.urn()), "{before}");
        }
        assert!(graph.explicit_dependencies(pki.cluster_cert.urn()).contains(hsm.hsm.urn()));

        let node = stack.node(pki.cluster_cert.urn()).ok_or("no cluster certificate")?;
        assert!(node.options().is_ignored(CERT_REQUEST_FIELD));
        assert!(!node.options().is_ignored("ca_cert_pem"));
        Ok(())
    }
}
