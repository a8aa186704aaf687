//! The HSM cluster and its first node.

use pkhsm_common::aws;
use pkhsm_engine::{Inputs, Output, Resource, ResourceOptions, Stack};
use serde_json::json;

use crate::{Error, config::HsmConfig, network::Network};

/// The JSON pointer of the signing request in the cluster read.
pub const CLUSTER_CSR_POINTER: &str = "/0/cluster_csr";

/// The declared HSM cluster.
#[derive(Clone, Debug)]
pub struct HsmCluster {
    /// The cluster.
    pub cluster: Resource,

    /// The first node of the cluster.
    pub hsm: Resource,

    /// The read of the cluster, which is ordered after the creation of the first node.
    pub cluster_read: Resource,
}

impl HsmCluster {
    /// Returns the identifier of the cluster.
    pub fn cluster_id(&self) -> Output<String> {
        self.cluster.string("cluster_id")
    }

    /// Returns the address of the first node.
    pub fn hsm_ip(&self) -> Output<String> {
        self.hsm.string("ip_address")
    }

    /// Returns the certificate signing request of the cluster.
    ///
    /// The request only exists once the first node is initialized, which is why it is taken
    /// from the cluster read.
    pub fn csr(&self) -> Output<String> {
        self.cluster_read
            .output("cluster_certificates")
            .pointer(CLUSTER_CSR_POINTER)
            .deserialize()
    }
}

/// Declares an HSM cluster spanning all subnets of `network` with one node in its first subnet.
///
/// # Errors
///
/// Returns an error if `network` has no subnet or if a resource can not be declared.
pub fn declare(stack: &mut Stack, config: &HsmConfig, network: &Network) -> Result<HsmCluster, Error> {
    let cluster = stack.resource(
        aws::HSM_CLUSTER,
        "hsmCluster",
        Inputs::new()
            .with("hsm_type", json!(config.hsm_type))
            .with("mode", json!(config.mode.to_string()))
            .output("subnet_ids", network.subnet_ids()),
        ResourceOptions::new(),
    )?;
    let hsm = stack.resource(
        aws::HSM,
        "hsm",
        Inputs::new()
            .output("subnet_id", network.subnet_id(0)?)
            .output("cluster_id", cluster.string("cluster_id")),
        ResourceOptions::new(),
    )?;
    // the data dependency only covers the cluster, not its first node
    let cluster_read = stack.read(
        aws::GET_HSM_CLUSTER,
        "clusterCsr",
        Inputs::new().output("cluster_id", cluster.string("cluster_id")),
        ResourceOptions::new().depends_on(hsm.urn()),
    )?;

    Ok(HsmCluster {
        cluster,
        hsm,
        cluster_read,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pkhsm_engine::EdgeKind;
    use testresult::TestResult;

    use super::*;
    use crate::config::NetworkConfig;

    #[test]
    fn csr_read_is_explicitly_ordered_after_node() -> TestResult {
        let mut stack = Stack::new("test");
        let network = crate::network::declare(&mut stack, &NetworkConfig::default())?;
        let hsm = declare(&mut stack, &HsmConfig::default(), &network)?;

        let graph = stack.graph()?;
        assert!(graph.precedes(hsm.hsm.urn(), hsm.cluster_read.urn()));
        assert!(graph.edges().iter().any(|edge| {
            &edge.from == hsm.hsm.urn()
                && &edge.to == hsm.cluster_read.urn()
                && edge.kind == EdgeKind::Explicit
        }));
        assert_eq!(
            hsm.csr().dependencies(),
            &BTreeSet::from([hsm.cluster_read.urn().clone()])
        );
        Ok(())
    }
}
