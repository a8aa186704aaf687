//! The bastion host, from which operators reach the HSM cluster.

use pkhsm_common::aws;
use pkhsm_engine::{Inputs, Output, Resource, ResourceOptions, Stack};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::{
    Error,
    StackConfig,
    access::Access,
    boot::BootConfigRenderer,
    network::Network,
};

/// The architecture of Graviton instance types.
pub const ARM64: &str = "arm64";

/// The architecture of all other instance types.
pub const X86_64: &str = "x86_64";

/// Returns the architecture required by `instance_type`.
///
/// Graviton families carry a `g` right after their generation (e.g. `t4g`, `m7gd`), except for
/// the first generation `a1`.
///
/// # Examples
///
/// ```
/// use pkhsm_stack::bastion::instance_architecture;
///
/// assert_eq!(instance_architecture("t4g.small"), "arm64");
/// assert_eq!(instance_architecture("t3.small"), "x86_64");
/// ```
pub fn instance_architecture(instance_type: &str) -> &'static str {
    let family = instance_type.split('.').next().unwrap_or_default();
    let suffix = family.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = suffix.trim_start_matches(|c: char| c.is_ascii_digit());
    if family == "a1" || suffix.starts_with('g') {
        ARM64
    } else {
        X86_64
    }
}

/// Returns the identifier of `image`, if its `architecture` can run on `instance_type`.
fn matching_image(instance_type: &str, image: String, architecture: &str) -> Result<String, Error> {
    let required = instance_architecture(instance_type);
    if architecture == required {
        Ok(image)
    } else {
        Err(Error::ImageArchitecture {
            image,
            architecture: architecture.to_string(),
            instance_type: instance_type.to_string(),
            required,
        })
    }
}

/// The declared bastion host.
#[derive(Clone, Debug)]
pub struct Bastion {
    /// The key pair holding the SSH public key of the operator.
    pub key_pair: Resource,

    /// The read of the image of the host.
    pub image: Resource,

    /// The host.
    pub instance: Resource,
}

impl Bastion {
    /// Returns the public address of the host.
    pub fn public_ip(&self) -> Output<String> {
        self.instance.string("public_ip")
    }
}

/// Declares the bastion host in the first public subnet of `network`.
///
/// The image is the most recent one matching the configured name pattern.
/// It is resolved on every run, so a newer matching image replaces the host.
/// The host fails to be created if the image is not built for the architecture of the
/// configured instance type.
///
/// # Errors
///
/// Returns an error if
/// - the boot configuration can not be rendered,
/// - `network` has no subnet,
/// - or a resource can not be declared.
pub fn declare(
    stack: &mut Stack,
    config: &StackConfig,
    network: &Network,
    access: &Access,
    renderer: &dyn BootConfigRenderer,
) -> Result<Bastion, Error> {
    let bastion = config.bastion();
    let user_data = renderer.render(&bastion.user_data)?;

    let key_pair = stack.resource(
        aws::KEY_PAIR,
        "pk-keypair",
        Inputs::new()
            .with("key_name", json!(bastion.key_name))
            .output(
                "public_key",
                Output::secret(config.ssh_public_key().expose_secret().to_string()),
            ),
        ResourceOptions::new(),
    )?;
    let image = stack.read(
        aws::GET_AMI,
        "ami",
        Inputs::new()
            .with("most_recent", json!(true))
            .with(
                "filters",
                json!([{ "name": "name", "values": [bastion.image_name] }]),
            ),
        ResourceOptions::new(),
    )?;
    let instance_type = bastion.instance_type.clone();
    let ami = image
        .string("id")
        .zip(image.string("architecture"))
        .try_map(move |(id, architecture)| matching_image(&instance_type, id, &architecture));
    let instance = stack.resource(
        aws::INSTANCE,
        "sshbox-pk",
        Inputs::new()
            .output("ami", ami)
            .with("instance_type", json!(bastion.instance_type))
            .output("subnet_id", network.subnet_id(0)?)
            .output(
                "vpc_security_group_ids",
                access.bastion_group_id().map(|id| vec![id]),
            )
            .output("key_name", key_pair.string("key_name"))
            .with("associate_public_ip_address", json!(true))
            .with("user_data_base64", json!(user_data))
            .with("tags", json!({ "Name": bastion.name })),
        ResourceOptions::new(),
    )?;

    Ok(Bastion {
        key_pair,
        image,
        instance,
    })
}
