//! Resource types, reads and fixed values of the cloud provider package.
//!
//! Resource types follow the `<package>:<module>:<Type>` scheme.
//! Reads (data sources) use the same scheme with a lower-case function name.

/// The package name of the cloud provider.
pub const PACKAGE: &str = "aws";

/// An isolated network.
pub const VPC: &str = "aws:ec2/vpc:Vpc";

/// A subnet of a [`VPC`].
pub const SUBNET: &str = "aws:ec2/subnet:Subnet";

/// The gateway connecting a [`VPC`] to the internet.
pub const INTERNET_GATEWAY: &str = "aws:ec2/internetGateway:InternetGateway";

/// A route table of a [`VPC`].
pub const ROUTE_TABLE: &str = "aws:ec2/routeTable:RouteTable";

/// The association of a [`SUBNET`] with a [`ROUTE_TABLE`].
pub const ROUTE_TABLE_ASSOCIATION: &str = "aws:ec2/routeTableAssociation:RouteTableAssociation";

/// The availability zones of the current region.
pub const GET_AVAILABILITY_ZONES: &str = "aws:index/getAvailabilityZones:getAvailabilityZones";

/// An HSM cluster.
pub const HSM_CLUSTER: &str = "aws:cloudhsmv2/cluster:Cluster";

/// A node of an [`HSM_CLUSTER`].
pub const HSM: &str = "aws:cloudhsmv2/hsm:Hsm";

/// The details of an existing [`HSM_CLUSTER`], including its certificates.
pub const GET_HSM_CLUSTER: &str = "aws:cloudhsmv2/getCluster:getCluster";

/// An SSH key pair for compute instances.
pub const KEY_PAIR: &str = "aws:ec2/keyPair:KeyPair";

/// The lookup of a machine image.
pub const GET_AMI: &str = "aws:ec2/getAmi:getAmi";

/// A security group.
pub const SECURITY_GROUP: &str = "aws:ec2/securityGroup:SecurityGroup";

/// The lookup of an existing [`SECURITY_GROUP`].
pub const GET_SECURITY_GROUP: &str = "aws:ec2/getSecurityGroup:getSecurityGroup";

/// A single ingress rule of a [`SECURITY_GROUP`].
pub const SECURITY_GROUP_INGRESS_RULE: &str = "aws:vpc/securityGroupIngressRule:SecurityGroupIngressRule";

/// A compute instance.
pub const INSTANCE: &str = "aws:ec2/instance:Instance";

/// The first port of the HSM client port range.
pub const HSM_PORT_FIRST: u16 = 2223;

/// The last port of the HSM client port range.
pub const HSM_PORT_LAST: u16 = 2224;

/// The SSH port.
pub const SSH_PORT: u16 = 22;

/// Returns the name of the security group an HSM cluster creates for its nodes.
///
/// # Examples
///
/// ```
/// use pkhsm_common::aws::get_hsm_security_group_name;
///
/// assert_eq!(get_hsm_security_group_name("cluster-abc123"), "cloudhsm-cluster-abc123-sg");
/// ```
pub fn get_hsm_security_group_name(cluster_id: &str) -> String {
    format!("cloudhsm-{cluster_id}-sg")
}

/// Returns the console URL listing the nodes of the HSM cluster `cluster_id` in `region`.
///
/// # Examples
///
/// ```
/// use pkhsm_common::aws::get_cluster_console_url;
///
/// assert_eq!(
///     get_cluster_console_url("eu-central-1", "cluster-abc123"),
///     "https://eu-central-1.console.aws.amazon.com/cloudhsm/home?region=eu-central-1#/clusters/cluster-abc123/hsms"
/// );
/// ```
pub fn get_cluster_console_url(region: &str, cluster_id: &str) -> String {
    format!(
        "https://{region}.console.aws.amazon.com/cloudhsm/home?region={region}#/clusters/{cluster_id}/hsms"
    )
}
