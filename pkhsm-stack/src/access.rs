//! Security perimeters of the bastion host and the HSM cluster.

use std::net::Ipv4Addr;

use pkhsm_common::aws::{
    self,
    HSM_PORT_FIRST,
    HSM_PORT_LAST,
    SSH_PORT,
    get_hsm_security_group_name,
};
use pkhsm_engine::{Inputs, Output, Resource, ResourceOptions, Stack};
use serde_json::json;

use crate::{Error, hsm::HsmCluster, network::Network};

/// The description of the ingress rule on the HSM perimeter.
pub const HSM_INGRESS_DESCRIPTION: &str = "sg to allow access from ec2 instance";

/// The declared security perimeters.
#[derive(Clone, Debug)]
pub struct Access {
    /// The perimeter of the bastion host.
    pub bastion_group: Resource,

    /// The read of the perimeter the HSM cluster creates for itself.
    pub hsm_group: Resource,

    /// The rule granting the bastion perimeter access to the HSM cluster.
    pub hsm_ingress_rule: Resource,
}

impl Access {
    /// Returns the identifier of the bastion perimeter.
    pub fn bastion_group_id(&self) -> Output<String> {
        self.bastion_group.string("id")
    }
}

/// Returns the single-address CIDR block of `ip`.
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
///
/// use pkhsm_stack::access::host_cidr;
///
/// assert_eq!(host_cidr(Ipv4Addr::new(203, 0, 113, 7)), "203.0.113.7/32");
/// ```
pub fn host_cidr(ip: Ipv4Addr) -> String {
    format!("{ip}/32")
}

/// Declares the bastion perimeter and grants it access to the HSM cluster.
///
/// The bastion perimeter allows SSH from `operator_ip` only and TCP egress to any destination.
/// The perimeter of the HSM cluster is looked up by its derived name, which only succeeds once
/// the first node of the cluster exists.
///
/// # Errors
///
/// Returns an error if a resource can not be declared.
pub fn declare(
    stack: &mut Stack,
    operator_ip: Ipv4Addr,
    network: &Network,
    hsm: &HsmCluster,
) -> Result<Access, Error> {
    let bastion_group = stack.resource(
        aws::SECURITY_GROUP,
        "pk-ssh-sg",
        Inputs::new()
            .output("vpc_id", network.vpc_id())
            .with(
                "ingress",
                json!([{
                    "from_port": SSH_PORT,
                    "to_port": SSH_PORT,
                    "protocol": "tcp",
                    "cidr_blocks": [host_cidr(operator_ip)],
                }]),
            )
            .with(
                "egress",
                json!([{
                    "from_port": 0,
                    "to_port": u16::MAX,
                    "protocol": "tcp",
                    "cidr_blocks": ["0.0.0.0/0"],
                }]),
            ),
        ResourceOptions::new(),
    )?;
    let hsm_group = stack.read(
        aws::GET_SECURITY_GROUP,
        "hsmSg",
        Inputs::new().output(
            "name",
            hsm.cluster_id()
                .map(|cluster_id| get_hsm_security_group_name(&cluster_id)),
        ),
        ResourceOptions::new().depends_on(hsm.hsm.urn()),
    )?;
    let hsm_ingress_rule = stack.resource(
        aws::SECURITY_GROUP_INGRESS_RULE,
        "hsmSgRule",
        Inputs::new()
            .output("security_group_id", hsm_group.string("id"))
            .with("ip_protocol", json!("tcp"))
            .with("from_port", json!(HSM_PORT_FIRST))
            .with("to_port", json!(HSM_PORT_LAST))
            .output("referenced_security_group_id", bastion_group.string("id"))
            .with("description", json!(HSM_INGRESS_DESCRIPTION)),
        ResourceOptions::new(),
    )?;

    Ok(Access {
        bastion_group,
        hsm_group,
        hsm_ingress_rule,
    })
}
