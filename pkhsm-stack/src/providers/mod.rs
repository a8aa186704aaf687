//! In-process providers for certificates and local files.
//!
//! Cloud resources are handled by a provider supplied by the caller, which is registered
//! alongside the providers of this module using [`providers`].

pub mod local;
pub mod tls;

use pkhsm_engine::{Properties, Provider, ProviderError, Providers, Urn};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use self::{local::LocalProvider, tls::TlsProvider};

/// Returns a registry of the [`TlsProvider`], the [`LocalProvider`] and `cloud`.
///
/// # Examples
///
/// ```
/// use pkhsm_stack::providers;
/// use pkhsm_tests::SimulatedCloud;
///
/// let providers = providers(SimulatedCloud::new());
/// assert!(providers.get("aws").is_some());
/// assert!(providers.get("tls").is_some());
/// assert!(providers.get("local").is_some());
/// ```
pub fn providers(cloud: impl Provider + 'static) -> Providers {
    Providers::new()
        .register(TlsProvider)
        .register(LocalProvider)
        .register(cloud)
}

/// Returns the required string input `field`.
fn string<'a>(urn: &Urn, inputs: &'a Properties, field: &str) -> Result<&'a str, ProviderError> {
    inputs.get(field).and_then(Value::as_str).ok_or_else(|| {
        ProviderError::invalid_input(urn.resource_type(), field, "expected a string")
    })
}

/// Returns the optional input `field` deserialized as `T`, or `default` if it is not set.
fn optional<T: DeserializeOwned>(
    urn: &Urn,
    inputs: &Properties,
    field: &str,
    default: T,
) -> Result<T, ProviderError> {
    match inputs.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => serde_json::from_value(value.clone()).map_err(|error| {
            ProviderError::invalid_input(urn.resource_type(), field, &error.to_string())
        }),
    }
}
