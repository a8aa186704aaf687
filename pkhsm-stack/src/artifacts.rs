//! Local copies of the cluster certificate and the CA certificate.

use pkhsm_common::artifacts::{
    ARTIFACT_FILE_PERMISSION,
    get_ca_certificate_path,
    get_cluster_certificate_path,
};
use pkhsm_engine::{Inputs, Resource, ResourceOptions, Stack};
use serde_json::json;

use crate::{Error, config::ArtifactsConfig, hsm::HsmCluster, pki::Pki, providers::local::FILE};

/// The declared certificate files.
#[derive(Clone, Debug)]
pub struct Artifacts {
    /// The signed cluster certificate.
    pub cluster_cert_file: Resource,

    /// The CA certificate.
    pub ca_cert_file: Resource,
}

/// Declares the certificate files in the artifacts directory.
///
/// The file name of the cluster certificate contains the cluster identifier.
/// Both files are only written once the cluster certificate is signed.
///
/// # Errors
///
/// Returns an error if a resource can not be declared.
pub fn declare(
    stack: &mut Stack,
    config: &ArtifactsConfig,
    hsm: &HsmCluster,
    pki: &Pki,
) -> Result<Artifacts, Error> {
    let directory = config.directory.clone();
    let cluster_cert_file = stack.resource(
        FILE,
        "clusterCrtFile",
        Inputs::new()
            .output(
                "filename",
                hsm.cluster_id().map(move |cluster_id| {
                    get_cluster_certificate_path(&directory, &cluster_id)
                        .to_string_lossy()
                        .to_string()
                }),
            )
            .output("content", pki.cluster_cert_pem())
            .with("file_permission", json!(ARTIFACT_FILE_PERMISSION)),
        ResourceOptions::new(),
    )?;
    let ca_cert_file = stack.resource(
        FILE,
        "customerCACrtFile",
        Inputs::new()
            .with(
                "filename",
                json!(get_ca_certificate_path(&config.directory).to_string_lossy()),
            )
            .output("content", pki.ca_cert_pem())
            .with("file_permission", json!(ARTIFACT_FILE_PERMISSION)),
        ResourceOptions::new().depends_on(pki.cluster_cert.urn()),
    )?;

    Ok(Artifacts {
        cluster_cert_file,
        ca_cert_file,
    })
}
