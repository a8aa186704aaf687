//! Error handling.

use crate::{ProviderError, Urn};

/// An error that may occur when declaring or evaluating a provisioning program.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Deriving a deferred value failed.
    #[error("Unable to derive value: {message}")]
    Apply {
        /// A message describing the failure.
        message: String,
    },

    /// A dependency cycle exists between resources.
    #[error("Dependency cycle between {}", urns.iter().map(|urn| urn.to_string()).collect::<Vec<_>>().join(", "))]
    DependencyCycle {
        /// The resources that are part of or depend on a cycle.
        urns: Vec<Urn>,
    },

    /// A resource is declared more than once.
    #[error("The resource {urn} is declared more than once")]
    DuplicateResource {
        /// The duplicate resource.
        urn: Urn,
    },

    /// A resource name is invalid.
    #[error("Invalid resource name \"{name}\"")]
    InvalidResourceName {
        /// The invalid name.
        name: String,
    },

    /// A resource type is invalid.
    #[error("Invalid resource type \"{value}\" (expected <package>:<module>:<type>)")]
    InvalidResourceType {
        /// The invalid resource type.
        value: String,
    },

    /// A resource identifier is invalid.
    #[error("Invalid resource identifier \"{value}\" (expected <type>::<name>)")]
    InvalidUrn {
        /// The invalid identifier.
        value: String,
    },

    /// Evaluating the inputs of a resource failed.
    #[error("Evaluating inputs of {urn} failed:\n{source}")]
    Evaluate {
        /// The resource whose inputs can not be evaluated.
        urn: Urn,
        /// The error source.
        source: Box<Error>,
    },

    /// Evaluating an exported value failed.
    #[error("Evaluating export \"{name}\" failed:\n{source}")]
    Export {
        /// The name of the export.
        name: String,
        /// The error source.
        source: Box<Error>,
    },

    /// A JSON error occurred while handling state.
    #[error("JSON error while {context}:\n{source}")]
    Json {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "JSON error while ".
        context: &'static str,
        /// The error source.
        source: serde_json::Error,
    },

    /// A resource does not provide an attribute that is read from it.
    #[error("The resource {urn} does not provide the attribute \"{field}\"")]
    MissingAttribute {
        /// The resource lacking the attribute.
        urn: Urn,
        /// The name of the missing attribute.
        field: String,
    },

    /// No provider is registered for the package of a resource.
    #[error("No provider registered for package \"{package}\" (required by {urn})")]
    MissingProvider {
        /// The package without a provider.
        package: String,
        /// The resource requiring the provider.
        urn: Urn,
    },

    /// A resource depends on a resource that is not declared.
    #[error("The resource {urn} depends on {dependency}, which is not declared")]
    UnknownDependency {
        /// The resource declaring the dependency.
        urn: Urn,
        /// The undeclared dependency.
        dependency: Urn,
    },

    /// A value required for a step is unknown when executing it.
    #[error("The input \"{field}\" of {urn} is unknown while executing it")]
    UnknownInput {
        /// The resource with the unknown input.
        urn: Urn,
        /// The name of the unknown input.
        field: String,
    },

    /// A provider operation failed.
    #[error("Provider operation for {urn} failed:\n{source}")]
    Provider {
        /// The resource for which the operation failed.
        urn: Urn,
        /// The provider error, as returned by the provider.
        source: ProviderError,
    },

    /// One or more steps of an update failed.
    #[error("{} step(s) failed:\n{}", failures.len(), failures.join("\n"))]
    StepsFailed {
        /// The messages of all failed steps.
        failures: Vec<String>,
    },

    /// Joining a worker thread returned an error.
    #[error("Thread error while {context}")]
    Thread {
        /// The context in which the failed thread ran.
        ///
        /// Should complete the sentence "Thread error while ".
        context: String,
    },
}
