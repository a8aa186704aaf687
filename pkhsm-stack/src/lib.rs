#![doc = include_str!("../README.md")]

pub mod access;
pub mod artifacts;
pub mod bastion;
pub mod boot;
pub mod config;
mod error;
pub mod exports;
pub mod hsm;
pub mod network;
pub mod pki;
pub mod providers;

use log::debug;
use pkhsm_engine::Stack;

pub use crate::{
    boot::{BootConfigRenderer, CloudInitRenderer},
    config::StackConfig,
    error::Error,
    providers::providers,
};

/// The handles of all components of a declared environment.
#[derive(Clone, Debug)]
pub struct Environment {
    /// The network foundation.
    pub network: network::Network,

    /// The HSM cluster.
    pub hsm: hsm::HsmCluster,

    /// The certificate authority and the cluster certificate.
    pub pki: pki::Pki,

    /// The local certificate files.
    pub artifacts: artifacts::Artifacts,

    /// The security perimeters.
    pub access: access::Access,

    /// The bastion host.
    pub bastion: bastion::Bastion,
}

/// Declares the complete environment described by `config` on `stack`.
///
/// The boot configuration of the bastion host is rendered using `renderer`.
///
/// # Errors
///
/// Returns an error if
/// - the boot configuration can not be rendered,
/// - or a component can not be declared.
pub fn declare(
    stack: &mut Stack,
    config: &StackConfig,
    renderer: &dyn BootConfigRenderer,
) -> Result<Environment, Error> {
    debug!(stack = stack.name(), region = config.region(); "Declaring environment");

    let network = network::declare(stack, config.network())?;
    let hsm = hsm::declare(stack, config.hsm(), &network)?;
    let pki = pki::declare(stack, config.pki(), &hsm)?;
    let artifacts = artifacts::declare(stack, config.artifacts(), &hsm, &pki)?;
    let access = access::declare(stack, config.operator_ip(), &network, &hsm)?;
    let bastion = bastion::declare(stack, config, &network, &access, renderer)?;
    exports::declare(stack, config.region(), &hsm, &bastion);

    debug!(
        stack = stack.name(),
        nodes = stack.nodes().len();
        "Declared environment"
    );
    Ok(Environment {
        network,
        hsm,
        pki,
        artifacts,
        access,
        bastion,
    })
}
