//! The network foundation: an isolated network with one public subnet per availability zone.

use pkhsm_common::aws;
use pkhsm_engine::{Inputs, Output, Resource, ResourceOptions, Stack};
use serde_json::json;

use crate::{Error, config::NetworkConfig};

/// The route matching all IPv4 destinations.
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// The declared network.
#[derive(Clone, Debug)]
pub struct Network {
    /// The read of the availability zones of the region.
    pub zones: Resource,

    /// The network.
    pub vpc: Resource,

    /// The gateway connecting the network to the internet.
    pub internet_gateway: Resource,

    /// The route table of all public subnets.
    pub route_table: Resource,

    /// The public subnets, one per availability zone.
    pub subnets: Vec<Resource>,

    /// The associations of the public subnets with the route table.
    pub associations: Vec<Resource>,
}

impl Network {
    /// Returns the identifier of the network.
    pub fn vpc_id(&self) -> Output<String> {
        self.vpc.string("id")
    }

    /// Returns the identifiers of all public subnets.
    pub fn subnet_ids(&self) -> Output<Vec<String>> {
        Output::all(self.subnets.iter().map(|subnet| subnet.string("id")).collect())
    }

    /// Returns the identifier of the public subnet `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the network has no subnet `index`.
    pub fn subnet_id(&self, index: usize) -> Result<Output<String>, Error> {
        self.subnets
            .get(index)
            .map(|subnet| subnet.string("id"))
            .ok_or(Error::MissingSubnet {
                index,
                available: self.subnets.len(),
            })
    }
}

/// Declares the network described by `config` on `stack`.
///
/// Subnets are placed in the first availability zones of the region, in the order returned by
/// the zone read.
/// No NAT gateway is declared: instances reach the internet through their public addresses.
///
/// # Errors
///
/// Returns an error if the network block can not be split into one subnet per availability
/// zone or if a resource can not be declared.
pub fn declare(stack: &mut Stack, config: &NetworkConfig) -> Result<Network, Error> {
    let tags = json!({ "Name": config.name });
    let cidr_blocks = config.cidr_block.subnets(config.availability_zones)?;

    let zones = stack.read(
        aws::GET_AVAILABILITY_ZONES,
        "availableZones",
        Inputs::new().with("state", json!("available")),
        ResourceOptions::new(),
    )?;
    let vpc = stack.resource(
        aws::VPC,
        "vpc",
        Inputs::new()
            .with("cidr_block", json!(config.cidr_block))
            .with("enable_dns_hostnames", json!(true))
            .with("enable_dns_support", json!(true))
            .with("tags", tags.clone()),
        ResourceOptions::new(),
    )?;
    let internet_gateway = stack.resource(
        aws::INTERNET_GATEWAY,
        "vpc",
        Inputs::new()
            .output("vpc_id", vpc.string("id"))
            .with("tags", tags.clone()),
        ResourceOptions::new(),
    )?;
    let route_table = stack.resource(
        aws::ROUTE_TABLE,
        "vpc-public",
        Inputs::new()
            .output("vpc_id", vpc.string("id"))
            .output(
                "routes",
                internet_gateway
                    .string("id")
                    .map(|gateway_id| json!([{ "cidr_block": DEFAULT_ROUTE, "gateway_id": gateway_id }])),
            )
            .with("tags", tags.clone()),
        ResourceOptions::new(),
    )?;

    let mut subnets = Vec::with_capacity(cidr_blocks.len());
    let mut associations = Vec::with_capacity(cidr_blocks.len());
    for (index, cidr_block) in cidr_blocks.into_iter().enumerate() {
        let name = format!("vpc-public-{}", index + 1);
        let subnet = stack.resource(
            aws::SUBNET,
            &name,
            Inputs::new()
                .output("vpc_id", vpc.string("id"))
                .output(
                    "availability_zone",
                    zones
                        .output("names")
                        .pointer(&format!("/{index}"))
                        .deserialize::<String>(),
                )
                .with("cidr_block", json!(cidr_block))
                .with("map_public_ip_on_launch", json!(true))
                .with("tags", tags.clone()),
            ResourceOptions::new(),
        )?;
        associations.push(stack.resource(
            aws::ROUTE_TABLE_ASSOCIATION,
            &name,
            Inputs::new()
                .output("route_table_id", route_table.string("id"))
                .output("subnet_id", subnet.string("id")),
            ResourceOptions::new(),
        )?);
        subnets.push(subnet);
    }

    Ok(Network {
        zones,
        vpc,
        internet_gateway,
        route_table,
        subnets,
        associations,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn one_public_subnet_per_zone(#[case] availability_zones: usize) -> TestResult {
        let config = NetworkConfig {
            availability_zones,
            ..Default::default()
        };
        let mut stack = Stack::new("test");
        let network = declare(&mut stack, &config)?;

        assert_eq!(network.subnets.len(), availability_zones);
        assert_eq!(network.associations.len(), availability_zones);
        assert!(network.subnet_id(availability_zones - 1).is_ok());
        assert!(matches!(
            network.subnet_id(availability_zones),
            Err(Error::MissingSubnet { .. })
        ));

        let graph = stack.graph()?;
        for subnet in network.subnets.iter() {
            assert!(graph.precedes(network.zones.urn(), subnet.urn()));
            assert!(graph.precedes(network.vpc.urn(), subnet.urn()));
        }
        Ok(())
    }

    #[test]
    fn no_nat_gateway_is_declared() -> TestResult {
        let mut stack = Stack::new("test");
        declare(&mut stack, &NetworkConfig::default())?;

        assert!(
            stack
                .nodes()
                .iter()
                .all(|node| !node.urn().resource_type().as_str().contains("natGateway"))
        );
        Ok(())
    }
}
