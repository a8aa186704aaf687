//! Providers implement the lifecycle of resources of a package.

use std::{collections::BTreeMap, fmt::Debug};

use crate::{Error, Properties, ResourceType, Urn};

/// An error returned by a [`Provider`].
///
/// Errors of the underlying API are kept intact, so that they can be reported verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A required input is missing or has an unexpected type.
    #[error("Invalid input \"{field}\" for {resource_type}: {message}")]
    InvalidInput {
        /// The type of the resource.
        resource_type: ResourceType,
        /// The name of the input.
        field: String,
        /// A message describing the problem.
        message: String,
    },

    /// The provider does not support a resource type or read.
    #[error("The resource type {resource_type} is not supported")]
    Unsupported {
        /// The unsupported resource type.
        resource_type: ResourceType,
    },

    /// The underlying API returned an error.
    #[error(transparent)]
    Api(Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Wraps an arbitrary error of an underlying API.
    pub fn api(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Api(Box::new(error))
    }

    /// Creates an [`ProviderError::InvalidInput`].
    pub fn invalid_input(resource_type: &ResourceType, field: &str, message: &str) -> Self {
        Self::InvalidInput {
            resource_type: resource_type.clone(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// The lifecycle operations for all resource types of a package.
///
/// Implementations are called concurrently for independent resources.
pub trait Provider: Debug + Send + Sync {
    /// Returns the package this provider is responsible for (e.g. `aws`).
    fn package(&self) -> &str;

    /// Creates the resource `urn` from `inputs` and returns its outputs.
    fn create(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError>;

    /// Updates the resource `urn` in-place and returns its new outputs.
    ///
    /// `outputs` are the outputs recorded for the existing resource.
    fn update(
        &self,
        urn: &Urn,
        outputs: &Properties,
        inputs: &Properties,
    ) -> Result<Properties, ProviderError>;

    /// Deletes the resource `urn`, described by its recorded `outputs`.
    fn delete(&self, urn: &Urn, outputs: &Properties) -> Result<(), ProviderError>;

    /// Executes the read `urn` with `args` and returns the data read.
    fn read(&self, urn: &Urn, args: &Properties) -> Result<Properties, ProviderError>;

    /// Returns whether a change of `field` requires replacing a resource of `resource_type`.
    ///
    /// By default all changes are applied in-place.
    fn replace_on_change(&self, _resource_type: &ResourceType, _field: &str) -> bool {
        false
    }

    /// Returns the output fields of `resource_type` that carry secret data.
    fn secret_outputs(&self, _resource_type: &ResourceType) -> Vec<String> {
        Vec::new()
    }
}

/// A registry of [`Provider`]s by package.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::Providers;
///
/// let providers = Providers::new();
/// assert!(providers.get("aws").is_none());
/// ```
#[derive(Debug, Default)]
pub struct Providers {
    providers: BTreeMap<String, Box<dyn Provider>>,
}

impl Providers {
    /// Creates an empty [`Providers`] registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `provider` for its package.
    ///
    /// Replaces a provider previously registered for the same package.
    pub fn register(mut self, provider: impl Provider + 'static) -> Self {
        self.providers
            .insert(provider.package().to_string(), Box::new(provider));
        self
    }

    /// Returns the provider registered for `package`.
    pub fn get(&self, package: &str) -> Option<&dyn Provider> {
        self.providers.get(package).map(|provider| provider.as_ref())
    }

    /// Returns the provider responsible for `urn`.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is registered for the package of `urn`.
    pub fn for_urn(&self, urn: &Urn) -> Result<&dyn Provider, Error> {
        let package = urn.resource_type().package();
        self.get(package).ok_or_else(|| Error::MissingProvider {
            package: package.to_string(),
            urn: urn.clone(),
        })
    }
}
