//! Identifiers of resources and resource types.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The type of a resource, e.g. `aws:cloudhsmv2/cluster:Cluster`.
///
/// A resource type consists of a package, a module and a type name, separated by colons.
/// The package selects the [`Provider`][`crate::Provider`] responsible for the resource.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::ResourceType;
///
/// # fn main() -> testresult::TestResult {
/// let resource_type: ResourceType = "aws:cloudhsmv2/cluster:Cluster".parse()?;
/// assert_eq!(resource_type.package(), "aws");
///
/// // a type without package is invalid
/// assert!("Cluster".parse::<ResourceType>().is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a new [`ResourceType`].
    ///
    /// # Errors
    ///
    /// Returns an error if `value` does not consist of exactly three non-empty, colon separated
    /// parts.
    pub fn new(value: String) -> Result<Self, Error> {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(Error::InvalidResourceType { value });
        }
        Ok(Self(value))
    }

    /// Returns the package of the resource type.
    pub fn package(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// Returns the resource type as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.0
    }
}

impl TryFrom<String> for ResourceType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// The unique identifier of a resource in a [`Stack`][`crate::Stack`].
///
/// Combines a [`ResourceType`] with a logical name, rendered as `<type>::<name>`.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::Urn;
///
/// # fn main() -> testresult::TestResult {
/// let urn: Urn = "aws:cloudhsmv2/hsm:Hsm::hsm".parse()?;
/// assert_eq!(urn.name(), "hsm");
/// assert_eq!(urn.resource_type().package(), "aws");
/// assert_eq!(urn.to_string(), "aws:cloudhsmv2/hsm:Hsm::hsm");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(into = "String", try_from = "String")]
pub struct Urn {
    resource_type: ResourceType,
    name: String,
}

impl Urn {
    /// Creates a new [`Urn`] from a [`ResourceType`] and a logical name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is empty or contains `::`.
    pub fn new(resource_type: ResourceType, name: &str) -> Result<Self, Error> {
        if name.is_empty() || name.contains("::") {
            return Err(Error::InvalidResourceName {
                name: name.to_string(),
            });
        }
        Ok(Self {
            resource_type,
            name: name.to_string(),
        })
    }

    /// Returns the [`ResourceType`].
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Returns the logical name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for Urn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.resource_type, self.name)
    }
}

impl FromStr for Urn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((resource_type, name)) = s.split_once("::") else {
            return Err(Error::InvalidUrn {
                value: s.to_string(),
            });
        };
        Self::new(resource_type.parse()?, name)
    }
}

impl From<Urn> for String {
    fn from(value: Urn) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Urn {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
