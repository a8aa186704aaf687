//! Deferred values.
//!
//! Every attribute of a resource that has not been created yet is unknown while a program is
//! declared.
//! An [`Output`] describes how a value is derived from such attributes, without deriving it.
//! The set of resources an [`Output`] reads from is tracked alongside, so that passing an
//! [`Output`] as input of another resource is all it takes to create a dependency edge.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Debug, Display},
    sync::Arc,
};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Urn};

/// The properties of a resource (its inputs or outputs).
pub type Properties = BTreeMap<String, Value>;

/// A resolved value and whether it is secret.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Known<T> {
    /// The resolved value.
    pub value: T,

    /// Whether the value is derived from secret data.
    pub secret: bool,
}

/// The outputs of a resolved resource, as seen by an [`Output`] during evaluation.
#[derive(Clone, Copy, Debug)]
pub struct Resolved<'a> {
    /// The output properties of the resource.
    pub outputs: &'a Properties,

    /// The names of all output properties that carry secret data.
    pub secret_fields: &'a BTreeSet<String>,
}

/// A source of resolved resource outputs.
///
/// Implemented by the engine for the resources it has already created, updated or read.
pub trait Resolver {
    /// Returns the outputs of the resource identified by `urn`.
    ///
    /// Returns [`None`] if the resource is not (yet) resolved.
    fn resolve(&self, urn: &Urn) -> Option<Resolved<'_>>;
}

/// Evaluation function of an [`Output`].
type Eval<T> = dyn Fn(&dyn Resolver) -> Result<Option<Known<T>>, Error> + Send + Sync;

/// A deferred value.
///
/// Evaluating an [`Output`] against a [`Resolver`] yields
///
/// - `Ok(None)` if any resource it depends on is not resolved yet (the value is *unknown*),
/// - `Ok(Some(Known))` once all of them are resolved,
/// - or an error if the value can not be derived from the resolved data.
///
/// Combinators never evaluate anything eagerly: they compose evaluation functions and merge the
/// sets of resources the combined values depend on.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::{Output, Properties, Resolved, Resolver, Urn};
///
/// struct Nothing;
///
/// impl Resolver for Nothing {
///     fn resolve(&self, _urn: &Urn) -> Option<Resolved<'_>> {
///         None
///     }
/// }
///
/// # fn main() -> testresult::TestResult {
/// let region = Output::known("eu-central-1".to_string());
/// let url = Output::format("https://{}.console.aws.amazon.com/", vec![region]);
///
/// let known = url.eval(&Nothing)?.expect("constant values are always known");
/// assert_eq!(known.value, "https://eu-central-1.console.aws.amazon.com/");
/// assert!(!known.secret);
/// # Ok(())
/// # }
/// ```
pub struct Output<T> {
    dependencies: BTreeSet<Urn>,
    eval: Arc<Eval<T>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            dependencies: self.dependencies.clone(),
            eval: self.eval.clone(),
        }
    }
}

impl<T> Debug for Output<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Output<T> {
    /// Creates an [`Output`] from an evaluation function and the resources it reads from.
    pub(crate) fn from_fn(
        dependencies: BTreeSet<Urn>,
        eval: impl Fn(&dyn Resolver) -> Result<Option<Known<T>>, Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            dependencies,
            eval: Arc::new(eval),
        }
    }

    fn constant(value: T, secret: bool) -> Self {
        Self::from_fn(BTreeSet::new(), move |_| {
            Ok(Some(Known {
                value: value.clone(),
                secret,
            }))
        })
    }

    /// Creates an [`Output`] of a value that is known upfront.
    pub fn known(value: T) -> Self {
        Self::constant(value, false)
    }

    /// Creates an [`Output`] of a secret value that is known upfront.
    ///
    /// Secrecy propagates to every value derived from the returned [`Output`].
    pub fn secret(value: T) -> Self {
        Self::constant(value, true)
    }

    /// Returns the resources this value is derived from.
    pub fn dependencies(&self) -> &BTreeSet<Urn> {
        &self.dependencies
    }

    /// Evaluates the value against `resolver`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value can not be derived from the resolved resource outputs.
    pub fn eval(&self, resolver: &dyn Resolver) -> Result<Option<Known<T>>, Error> {
        (self.eval)(resolver)
    }

    /// Marks this value as secret.
    pub fn into_secret(self) -> Self {
        let Self { dependencies, eval } = self;
        Self::from_fn(dependencies, move |resolver| {
            Ok(eval(resolver)?.map(|known| Known {
                value: known.value,
                secret: true,
            }))
        })
    }

    /// Derives a new value once this one is known.
    pub fn map<U, F>(self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let Self { dependencies, eval } = self;
        Output::from_fn(dependencies, move |resolver| {
            Ok(eval(resolver)?.map(|known| Known {
                value: f(known.value),
                secret: known.secret,
            }))
        })
    }

    /// Derives a new value once this one is known, with a fallible function.
    ///
    /// A failure of `f` surfaces as [`Error::Apply`] when evaluating the returned [`Output`].
    pub fn try_map<U, E, F>(self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        E: Display,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        let Self { dependencies, eval } = self;
        Output::from_fn(dependencies, move |resolver| {
            let Some(known) = eval(resolver)? else {
                return Ok(None);
            };
            let value = f(known.value).map_err(|error| Error::Apply {
                message: error.to_string(),
            })?;
            Ok(Some(Known {
                value,
                secret: known.secret,
            }))
        })
    }

    /// Combines this and another value into a tuple.
    ///
    /// The result is known once both values are known and secret if either one is.
    pub fn zip<U: Clone + Send + Sync + 'static>(self, other: Output<U>) -> Output<(T, U)> {
        let dependencies = self
            .dependencies
            .union(&other.dependencies)
            .cloned()
            .collect();
        let (left, right) = (self.eval, other.eval);
        Output::from_fn(dependencies, move |resolver| {
            let (Some(left), Some(right)) = (left(resolver)?, right(resolver)?) else {
                return Ok(None);
            };
            Ok(Some(Known {
                value: (left.value, right.value),
                secret: left.secret || right.secret,
            }))
        })
    }

    /// Combines a list of values into an [`Output`] of a list.
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        let dependencies = outputs
            .iter()
            .flat_map(|output| output.dependencies.iter().cloned())
            .collect();
        Output::from_fn(dependencies, move |resolver| {
            let mut values = Vec::with_capacity(outputs.len());
            let mut secret = false;
            for output in outputs.iter() {
                let Some(known) = output.eval(resolver)? else {
                    return Ok(None);
                };
                secret |= known.secret;
                values.push(known.value);
            }
            Ok(Some(Known {
                value: values,
                secret,
            }))
        })
    }
}

impl<T: Serialize + Clone + Send + Sync + 'static> Output<T> {
    /// Converts the value into a [`Value`].
    pub fn into_value(self) -> Output<Value> {
        self.try_map(serde_json::to_value)
    }
}

impl Output<String> {
    /// Interpolates `args` into the `{}` placeholders of `template`, in order.
    ///
    /// Surplus placeholders are kept verbatim, surplus arguments are ignored.
    pub fn format(template: &str, args: Vec<Output<String>>) -> Output<String> {
        let template = template.to_string();
        Output::all(args).map(move |args| {
            let mut args = args.into_iter();
            let mut parts = template.split("{}");
            let mut result = parts.next().unwrap_or_default().to_string();
            for part in parts {
                match args.next() {
                    Some(arg) => result.push_str(&arg),
                    None => result.push_str("{}"),
                }
                result.push_str(part);
            }
            result
        })
    }
}

impl Output<Value> {
    /// Selects a nested value using a JSON pointer (e.g. `/0/cluster_csr`).
    ///
    /// Evaluation fails with [`Error::Apply`] if the pointer does not match.
    pub fn pointer(self, pointer: &str) -> Output<Value> {
        let pointer = pointer.to_string();
        self.try_map(move |value| match value.pointer(&pointer) {
            Some(Value::Null) | None => Err(format!("no value at {pointer}")),
            Some(value) => Ok(value.clone()),
        })
    }

    /// Deserializes the value into `T`.
    pub fn deserialize<T>(self) -> Output<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.try_map(serde_json::from_value)
    }
}

impl<T: Clone + Send + Sync + 'static> From<T> for Output<T> {
    fn from(value: T) -> Self {
        Self::known(value)
    }
}

impl From<&str> for Output<String> {
    fn from(value: &str) -> Self {
        Self::known(value.to_string())
    }
}
