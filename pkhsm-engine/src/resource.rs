//! Declarations of resources, their inputs and options.

use std::collections::BTreeSet;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Known, Output, Urn};

/// The kind of a node in a provisioning program.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum NodeKind {
    /// A resource whose lifecycle is managed (created, updated, replaced and deleted).
    #[strum(to_string = "resource")]
    Managed,

    /// A read of existing data (a data source).
    ///
    /// Reads are executed on every run and are never recorded in state.
    #[strum(to_string = "read")]
    Read,
}

/// The named input properties of a resource.
///
/// Every input is a deferred value.
/// The union of the resources all inputs read from forms the data dependencies of a resource.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::{Inputs, Output};
/// use serde_json::json;
///
/// let inputs = Inputs::new()
///     .with("hsm_type", json!("hsm2m.medium"))
///     .with("mode", json!("FIPS"))
///     .output("subnet_ids", Output::known(vec!["subnet-1".to_string()]));
///
/// assert_eq!(inputs.names().collect::<Vec<_>>(), ["hsm_type", "mode", "subnet_ids"]);
/// assert!(inputs.dependencies().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Inputs {
    values: Vec<(String, Output<Value>)>,
}

impl Inputs {
    /// Creates an empty set of [`Inputs`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an input with a value that is known upfront.
    ///
    /// Replaces a previous input of the same `name`.
    pub fn with(self, name: &str, value: Value) -> Self {
        self.output(name, Output::known(value))
    }

    /// Adds an input with a deferred value.
    ///
    /// Replaces a previous input of the same `name`.
    pub fn output<T>(mut self, name: &str, value: Output<T>) -> Self
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        self.values.retain(|(existing, _)| existing != name);
        self.values.push((name.to_string(), value.into_value()));
        self.values.sort_by(|(a, _), (b, _)| a.cmp(b));
        self
    }

    /// Returns the names of all inputs in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// Returns an iterator over all inputs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Output<Value>)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns all resources the inputs read from.
    pub fn dependencies(&self) -> BTreeSet<Urn> {
        self.values
            .iter()
            .flat_map(|(_, value)| value.dependencies().iter().cloned())
            .collect()
    }
}

/// Options controlling how a resource is ordered and compared.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::{ResourceOptions, Urn};
///
/// # fn main() -> testresult::TestResult {
/// let hsm: Urn = "aws:cloudhsmv2/hsm:Hsm::hsm".parse()?;
/// let options = ResourceOptions::new()
///     .depends_on(&hsm)
///     .ignore_changes(["cert_request_pem"]);
///
/// assert!(options.get_depends_on().contains(&hsm));
/// assert!(options.is_ignored("cert_request_pem"));
/// assert!(!options.is_ignored("ca_cert_pem"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ResourceOptions {
    depends_on: BTreeSet<Urn>,
    ignore_changes: BTreeSet<String>,
}

impl ResourceOptions {
    /// Creates default [`ResourceOptions`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an explicit ordering edge: the resource is processed strictly after `urn`.
    ///
    /// Use this for dependencies on side effects of another resource, which can not be
    /// inferred from the data passed as inputs.
    pub fn depends_on(mut self, urn: &Urn) -> Self {
        self.depends_on.insert(urn.clone());
        self
    }

    /// Suppresses drift on the given input fields.
    ///
    /// Once the resource exists, changes to these fields never cause an update or replacement;
    /// the previously recorded values are kept instead.
    pub fn ignore_changes<'a>(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.ignore_changes
            .extend(fields.into_iter().map(ToString::to_string));
        self
    }

    /// Returns the explicit ordering dependencies.
    pub fn get_depends_on(&self) -> &BTreeSet<Urn> {
        &self.depends_on
    }

    /// Returns the fields for which drift is suppressed.
    pub fn get_ignore_changes(&self) -> &BTreeSet<String> {
        &self.ignore_changes
    }

    /// Returns whether drift on `field` is suppressed.
    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignore_changes.contains(field)
    }
}

/// A handle to a declared resource or read.
///
/// Attributes of the resource are available as deferred values, which depend on the resource.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Resource {
    urn: Urn,
}

impl Resource {
    pub(crate) fn new(urn: Urn) -> Self {
        Self { urn }
    }

    /// Returns the [`Urn`] of the resource.
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Returns the output attribute `field` as deferred [`Value`].
    ///
    /// Evaluation fails with [`Error::MissingAttribute`] if the resolved resource does not
    /// provide `field`.
    pub fn output(&self, field: &str) -> Output<Value> {
        let urn = self.urn.clone();
        let field = field.to_string();
        Output::from_fn(BTreeSet::from([self.urn.clone()]), move |resolver| {
            let Some(resolved) = resolver.resolve(&urn) else {
                return Ok(None);
            };
            let Some(value) = resolved.outputs.get(&field) else {
                return Err(Error::MissingAttribute {
                    urn: urn.clone(),
                    field: field.clone(),
                });
            };
            Ok(Some(Known {
                value: value.clone(),
                secret: resolved.secret_fields.contains(&field),
            }))
        })
    }

    /// Returns the output attribute `field` deserialized as `T`.
    pub fn get<T>(&self, field: &str) -> Output<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.output(field).deserialize()
    }

    /// Returns the output attribute `field` as deferred [`String`].
    pub fn string(&self, field: &str) -> Output<String> {
        self.get(field)
    }
}
