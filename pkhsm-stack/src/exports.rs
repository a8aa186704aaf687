//! Run outputs of the environment.

use pkhsm_common::aws::get_cluster_console_url;
use pkhsm_engine::Stack;

use crate::{bastion::Bastion, hsm::HsmCluster};

/// The address of the first HSM node.
pub const HSM_IP: &str = "hsm_ip";

/// The public address of the bastion host.
pub const EC2_IP: &str = "ec2_ip";

/// The console URL of the HSM cluster.
pub const CLUSTER_URL: &str = "cluster_url";

/// Exports the addresses of the HSM node and the bastion host and the console URL of the
/// cluster in `region`.
pub fn declare(stack: &mut Stack, region: &str, hsm: &HsmCluster, bastion: &Bastion) {
    let region = region.to_string();
    stack.export(HSM_IP, hsm.hsm_ip());
    stack.export(EC2_IP, bastion.public_ip());
    stack.export(
        CLUSTER_URL,
        hsm.cluster_id()
            .map(move |cluster_id| get_cluster_console_url(&region, &cluster_id)),
    );
}
