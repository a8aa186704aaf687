//! Error handling for [`StackConfig`] and related components.

use pkhsm_common::config::get_config_file_paths;

#[cfg(doc)]
use crate::StackConfig;
use crate::config::Ipv4Cidr;

/// An error that may occur when handling a [`StackConfig`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pkhsm configuration is missing.
    #[error("No configuration file found in {}.",
        get_config_file_paths().iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    ConfigIsMissing,

    /// A CIDR block is invalid.
    #[error("The CIDR block \"{value}\" is invalid: {reason}")]
    InvalidCidr {
        /// The invalid value.
        value: String,
        /// The reason why `value` is invalid.
        reason: &'static str,
    },

    /// The validity period of certificates is zero.
    #[error("The validity period of certificates must be at least one hour")]
    InvalidValidity,

    /// A required setting is empty.
    #[error("The setting \"{setting}\" must not be empty")]
    MissingSetting {
        /// The name of the empty setting.
        setting: &'static str,
    },

    /// No availability zone is requested.
    #[error("At least one availability zone is required")]
    NoAvailabilityZones,

    /// The RSA key length is too short.
    #[error("The RSA key length {bits} is shorter than {minimum} bits")]
    RsaKeyTooShort {
        /// The requested key length.
        bits: usize,
        /// The minimum key length.
        minimum: usize,
    },

    /// A CIDR block can not be split into the requested number of subnets.
    #[error("The CIDR block {cidr} can not be split into {count} subnet(s)")]
    TooManySubnets {
        /// The CIDR block to split.
        cidr: Ipv4Cidr,
        /// The requested number of subnets.
        count: usize,
    },
}
