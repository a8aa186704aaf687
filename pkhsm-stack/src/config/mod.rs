//! Configuration of an HSM-backed PKI environment.
//!
//! A [`StackConfig`] is read from a TOML file.
//! Only the region, the address of the operator and the SSH public key of the operator are
//! required, all other settings have defaults.
//!
//! ```toml
//! region = "eu-central-1"
//! operator_ip = "203.0.113.7"
//! ssh_public_key = "ssh-ed25519 AAAA... operator@example"
//!
//! [network]
//! cidr_block = "10.0.0.0/16"
//! availability_zones = 2
//!
//! [hsm]
//! hsm_type = "hsm2m.medium"
//! mode = "FIPS"
//!
//! [pki]
//! common_name = "piers"
//! validity_hours = 87648
//! ```

mod cidr;
mod error;

use std::{
    fs::read_to_string,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

pub use cidr::{DEFAULT_CIDR_BLOCK, Ipv4Cidr, MAX_SUBNET_PREFIX};
pub use error::Error;
use log::debug;
use pkhsm_common::{artifacts::DEFAULT_ARTIFACTS_DIR, config::get_config_file};
use pkhsm_pki::{KeyUse, MIN_RSA_BIT_LENGTH};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// The default name of a stack.
pub const DEFAULT_STACK_NAME: &str = "pkhsm";

/// The validity period of certificates: 3652 days.
pub const DEFAULT_VALIDITY_HOURS: u32 = 3652 * 24;

/// The mode of an HSM cluster.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
pub enum HsmMode {
    /// The cluster only offers FIPS-validated mechanisms.
    #[default]
    #[serde(rename = "FIPS")]
    #[strum(to_string = "FIPS")]
    Fips,

    /// The cluster also offers mechanisms that are not FIPS-validated.
    #[serde(rename = "NON_FIPS")]
    #[strum(to_string = "NON_FIPS")]
    NonFips,
}

/// Settings of the network.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// The address block of the network.
    pub cidr_block: Ipv4Cidr,

    /// The number of availability zones, each receiving one public subnet.
    pub availability_zones: usize,

    /// The value of the `Name` tag of all network resources.
    pub name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr_block: DEFAULT_CIDR_BLOCK,
            availability_zones: 2,
            name: "pk-hsm".to_string(),
        }
    }
}

/// Settings of the HSM cluster.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HsmConfig {
    /// The type of the HSM nodes.
    pub hsm_type: String,

    /// The mode of the cluster.
    pub mode: HsmMode,
}

impl Default for HsmConfig {
    fn default() -> Self {
        Self {
            hsm_type: "hsm2m.medium".to_string(),
            mode: HsmMode::default(),
        }
    }
}

/// Settings of the customer certificate authority and the signed cluster certificate.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PkiConfig {
    /// The common name of the CA certificate.
    pub common_name: String,

    /// The length of the RSA key of the CA.
    pub rsa_bits: usize,

    /// The validity period of the CA certificate and the cluster certificate.
    pub validity_hours: u32,

    /// The permitted uses of both certificates.
    ///
    /// An empty list adds no key usage restrictions.
    pub allowed_uses: Vec<KeyUse>,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            common_name: "piers".to_string(),
            rsa_bits: MIN_RSA_BIT_LENGTH,
            validity_hours: DEFAULT_VALIDITY_HOURS,
            allowed_uses: Vec::new(),
        }
    }
}

/// Settings of the bastion host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BastionConfig {
    /// The instance type, which must match the architecture of the image.
    pub instance_type: String,

    /// The name pattern of the image; the most recent match is used.
    pub image_name: String,

    /// The name of the key pair holding the SSH public key of the operator.
    pub key_name: String,

    /// The value of the `Name` tag of the instance.
    pub name: String,

    /// The path to the cloud-init template used as boot configuration.
    pub user_data: PathBuf,
}

impl Default for BastionConfig {
    fn default() -> Self {
        Self {
            instance_type: "t4g.small".to_string(),
            image_name: "al2023-ami-2023.7.20250331.0-kernel-6.1-arm64".to_string(),
            key_name: "piers-keypair".to_string(),
            name: "piers-ssh".to_string(),
            user_data: PathBuf::from("./userdata.yaml"),
        }
    }
}

/// Settings of the certificate artifacts.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// The directory the certificates are written to.
    pub directory: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
        }
    }
}

fn default_name() -> String {
    DEFAULT_STACK_NAME.to_string()
}

/// The configuration of an HSM-backed PKI environment.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default = "default_name")]
    name: String,

    region: String,

    operator_ip: Ipv4Addr,

    ssh_public_key: SecretString,

    #[serde(default)]
    network: NetworkConfig,

    #[serde(default)]
    hsm: HsmConfig,

    #[serde(default)]
    pki: PkiConfig,

    #[serde(default)]
    bastion: BastionConfig,

    #[serde(default)]
    artifacts: ArtifactsConfig,
}

impl StackConfig {
    /// Creates a new [`StackConfig`] from an optional configuration file path.
    ///
    /// If no configuration file path is provided, attempts to return the first configuration
    /// file location found using [`get_config_file`].
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - no configuration file path is provided and none is found in the default locations,
    /// - the configuration file can not be read,
    /// - the configuration file is not a valid [`StackConfig`],
    /// - or the configuration fails validation.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Write;
    ///
    /// use pkhsm_stack::StackConfig;
    ///
    /// # fn main() -> testresult::TestResult {
    /// let config_file = testdir::testdir!().join("pkhsm_config_new_from_file.toml");
    /// {
    ///     let mut file = std::fs::File::create(&config_file)?;
    ///     write!(
    ///         file,
    ///         r#"region = "eu-central-1"
    /// operator_ip = "203.0.113.7"
    /// ssh_public_key = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGl8r0dM7cVxHk5hJb3E2n9bqQwTzJb3m6k8Xo3s1aYb"
    /// "#
    ///     )?;
    /// }
    /// let config = StackConfig::new_from_file(Some(&config_file))?;
    /// assert_eq!(config.region(), "eu-central-1");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new_from_file(path: Option<&Path>) -> Result<Self, crate::Error> {
        let path = if let Some(path) = path {
            path.to_path_buf()
        } else {
            let Some(path) = get_config_file() else {
                return Err(Error::ConfigIsMissing.into());
            };
            path
        };
        debug!("Loading configuration from {}", path.display());

        let config: Self =
            toml::from_str(
                &read_to_string(&path).map_err(|source| crate::Error::IoPath {
                    path: path.clone(),
                    context: "reading it to string",
                    source,
                })?,
            )
            .map_err(|source| crate::Error::TomlRead {
                path,
                context: "reading it as a pkhsm config",
                source: Box::new(source),
            })?;
        config.validate()?;

        Ok(config)
    }

    /// Creates a new [`StackConfig`] from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is not a valid [`StackConfig`] or fails validation.
    pub fn from_toml_str(config: &str) -> Result<Self, crate::Error> {
        let config: Self = toml::from_str(config).map_err(|source| crate::Error::TomlRead {
            path: PathBuf::new(),
            context: "reading a string as a pkhsm config",
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - a required setting is empty,
    /// - no availability zone is requested,
    /// - the network block can not hold one subnet per availability zone,
    /// - the RSA key length is shorter than [`MIN_RSA_BIT_LENGTH`],
    /// - or the validity period of certificates is zero.
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("name", self.name.as_str()),
            ("region", self.region.as_str()),
            ("ssh_public_key", self.ssh_public_key.expose_secret()),
            ("hsm.hsm_type", self.hsm.hsm_type.as_str()),
            ("pki.common_name", self.pki.common_name.as_str()),
            ("bastion.instance_type", self.bastion.instance_type.as_str()),
            ("bastion.image_name", self.bastion.image_name.as_str()),
            ("bastion.key_name", self.bastion.key_name.as_str()),
        ];
        if let Some((setting, _)) = required
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
        {
            return Err(Error::MissingSetting { setting });
        }

        if self.network.availability_zones == 0 {
            return Err(Error::NoAvailabilityZones);
        }
        self.network
            .cidr_block
            .subnets(self.network.availability_zones)?;

        if self.pki.rsa_bits < MIN_RSA_BIT_LENGTH {
            return Err(Error::RsaKeyTooShort {
                bits: self.pki.rsa_bits,
                minimum: MIN_RSA_BIT_LENGTH,
            });
        }
        if self.pki.validity_hours == 0 {
            return Err(Error::InvalidValidity);
        }

        Ok(())
    }

    /// Replaces the path of the boot configuration template.
    pub fn with_user_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.bastion.user_data = path.into();
        self
    }

    /// Replaces the directory certificate artifacts are written to.
    pub fn with_artifacts_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts.directory = path.into();
        self
    }

    /// Returns the name of the stack.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the address of the operator, which is granted SSH access to the bastion host.
    pub fn operator_ip(&self) -> Ipv4Addr {
        self.operator_ip
    }

    /// Returns the SSH public key of the operator.
    pub fn ssh_public_key(&self) -> &SecretString {
        &self.ssh_public_key
    }

    /// Returns the network settings.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the HSM cluster settings.
    pub fn hsm(&self) -> &HsmConfig {
        &self.hsm
    }

    /// Returns the PKI settings.
    pub fn pki(&self) -> &PkiConfig {
        &self.pki
    }

    /// Returns the bastion host settings.
    pub fn bastion(&self) -> &BastionConfig {
        &self.bastion
    }

    /// Returns the artifacts settings.
    pub fn artifacts(&self) -> &ArtifactsConfig {
        &self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use rstest::rstest;
    use testdir::testdir;
    use testresult::TestResult;

    use super::*;

    const MINIMAL: &str = r#"
region = "eu-central-1"
operator_ip = "203.0.113.7"
ssh_public_key = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGl8r0dM7cVxHk5hJb3E2n9bqQwTzJb3m6k8Xo3s1aYb"
"#;

    #[test]
    fn minimal_config_uses_defaults() -> TestResult {
        let config = StackConfig::from_toml_str(MINIMAL)?;

        assert_eq!(config.name(), DEFAULT_STACK_NAME);
        assert_eq!(config.operator_ip(), Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(config.network().cidr_block.to_string(), "10.0.0.0/16");
        assert_eq!(config.network().availability_zones, 2);
        assert_eq!(config.hsm().hsm_type, "hsm2m.medium");
        assert_eq!(config.hsm().mode, HsmMode::Fips);
        assert_eq!(config.pki().validity_hours, 87648);
        assert_eq!(config.pki().rsa_bits, 2048);
        assert!(config.pki().allowed_uses.is_empty());
        assert_eq!(config.bastion().instance_type, "t4g.small");
        assert_eq!(config.artifacts().directory, Path::new("./dist"));
        Ok(())
    }

    #[test]
    fn sections_override_defaults() -> TestResult {
        let config = StackConfig::from_toml_str(&format!(
            r#"{MINIMAL}
[hsm]
mode = "NON_FIPS"

[pki]
allowed_uses = ["cert_signing", "crl_signing"]
"#
        ))?;

        assert_eq!(config.hsm().mode, HsmMode::NonFips);
        assert_eq!(config.hsm().hsm_type, "hsm2m.medium");
        assert_eq!(
            config.pki().allowed_uses,
            [KeyUse::CertSigning, KeyUse::CrlSigning]
        );
        Ok(())
    }

    #[rstest]
    #[case::no_zones("[network]\navailability_zones = 0", "NoAvailabilityZones")]
    #[case::small_network("[network]\ncidr_block = \"10.0.0.0/28\"", "TooManySubnets")]
    #[case::short_key("[pki]\nrsa_bits = 1024", "RsaKeyTooShort")]
    #[case::no_validity("[pki]\nvalidity_hours = 0", "InvalidValidity")]
    #[case::no_common_name("[pki]\ncommon_name = \"\"", "MissingSetting")]
    fn invalid_config_fails(#[case] section: &str, #[case] variant: &str) -> TestResult {
        let result = StackConfig::from_toml_str(&format!("{MINIMAL}\n{section}\n"));

        match result {
            Err(crate::Error::Config(error)) => {
                assert!(format!("{error:?}").starts_with(variant), "{error:?}")
            }
            other => panic!("Expected a configuration error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn invalid_operator_ip_fails() {
        let config = MINIMAL.replace("203.0.113.7", "203.0.113.7/32");
        assert!(matches!(
            StackConfig::from_toml_str(&config),
            Err(crate::Error::TomlRead { .. })
        ));
    }

    #[test]
    fn missing_file_fails() {
        let path = testdir!().join("missing.toml");
        assert!(matches!(
            StackConfig::new_from_file(Some(&path)),
            Err(crate::Error::IoPath { .. })
        ));
    }

    #[test]
    fn config_file_is_loaded() -> TestResult {
        let path = testdir!().join("pkhsm.toml");
        write(&path, MINIMAL)?;

        let config = StackConfig::new_from_file(Some(&path))?;
        assert_eq!(config.region(), "eu-central-1");
        Ok(())
    }
}
