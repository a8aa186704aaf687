//! Comparison of declared resources with recorded state.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use log::debug;

use crate::{Error, Node, Properties, Provider, ResourceState, Resolver, Urn};

/// The operation required to converge a node.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::Display)]
pub enum Operation {
    /// The resource is up-to-date.
    #[strum(to_string = "same")]
    Same,

    /// The resource does not exist yet.
    #[strum(to_string = "create")]
    Create,

    /// The resource is updated in-place.
    #[strum(to_string = "update")]
    Update,

    /// The resource is deleted and created anew.
    #[strum(to_string = "replace")]
    Replace,

    /// The resource is no longer declared and is deleted.
    #[strum(to_string = "delete")]
    Delete,

    /// Data is read.
    #[strum(to_string = "read")]
    Read,
}

impl Operation {
    /// Returns whether the operation modifies a managed resource.
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Replace | Self::Delete
        )
    }
}

/// The evaluated inputs of a node.
#[derive(Clone, Debug, Default)]
pub(crate) struct EvaluatedInputs {
    /// The known input values.
    pub values: Properties,
    /// The names of inputs whose value is not known yet.
    pub unknown: BTreeSet<String>,
    /// The names of inputs carrying secret data.
    pub secret: BTreeSet<String>,
}

impl EvaluatedInputs {
    /// Evaluates all inputs of `node` against `resolver`.
    pub fn evaluate(node: &Node, resolver: &dyn Resolver) -> Result<Self, Error> {
        let mut evaluated = Self::default();
        for (name, output) in node.inputs().iter() {
            let known = output.eval(resolver).map_err(|source| Error::Evaluate {
                urn: node.urn().clone(),
                source: Box::new(source),
            })?;
            match known {
                Some(known) => {
                    if known.secret {
                        evaluated.secret.insert(name.to_string());
                    }
                    evaluated.values.insert(name.to_string(), known.value);
                }
                None => {
                    evaluated.unknown.insert(name.to_string());
                }
            }
        }
        Ok(evaluated)
    }

    /// Returns the first input whose value is unknown.
    pub fn first_unknown(&self) -> Option<&str> {
        self.unknown.iter().next().map(String::as_str)
    }
}

/// The result of comparing a managed resource with its recorded state.
#[derive(Clone, Debug)]
pub(crate) struct Diff {
    /// The required operation.
    pub operation: Operation,
    /// The inputs to apply, with suppressed fields reset to their recorded values.
    pub inputs: Properties,
    /// The fields that differ from recorded state.
    pub changed: Vec<String>,
    /// The fields that differ from recorded state, but whose drift is suppressed.
    pub ignored: Vec<String>,
}

impl Diff {
    /// Compares the evaluated inputs of `node` with its recorded state `old`.
    ///
    /// Fields listed in the ignore-changes option of `node` are compared using their recorded
    /// value: as long as the resource exists, the recorded value wins over the declared one.
    /// If `replace` is set, the resource is replaced using the declared values only.
    pub fn compute(
        node: &Node,
        old: Option<&ResourceState>,
        evaluated: &EvaluatedInputs,
        provider: &dyn Provider,
        replace: bool,
    ) -> Self {
        let Some(old) = old else {
            return Self {
                operation: Operation::Create,
                inputs: evaluated.values.clone(),
                changed: evaluated.values.keys().cloned().collect(),
                ignored: Vec::new(),
            };
        };

        let mut inputs = evaluated.values.clone();
        let mut unknown = evaluated.unknown.clone();
        let mut ignored = Vec::new();
        if !replace {
            for field in node.options().get_ignore_changes() {
                let Some(recorded) = old.inputs.get(field) else {
                    continue;
                };
                if unknown.remove(field) || inputs.get(field) != Some(recorded) {
                    ignored.push(field.clone());
                }
                inputs.insert(field.clone(), recorded.clone());
            }
        }

        let fields: BTreeSet<&String> = inputs.keys().chain(old.inputs.keys()).collect();
        let mut changed: Vec<String> = fields
            .into_iter()
            .filter(|field| !unknown.contains(*field) && inputs.get(*field) != old.inputs.get(*field))
            .cloned()
            .collect();
        changed.extend(unknown);
        changed.sort();

        let resource_type = node.urn().resource_type();
        let operation = if replace {
            Operation::Replace
        } else if changed.is_empty() {
            Operation::Same
        } else if changed
            .iter()
            .any(|field| provider.replace_on_change(resource_type, field))
        {
            Operation::Replace
        } else {
            Operation::Update
        };

        if !ignored.is_empty() {
            debug!(
                urn:% = node.urn(),
                ignored:? = ignored;
                "Suppressed drift on {} field(s) of {}", ignored.len(), node.urn()
            );
        }

        Self {
            operation,
            inputs,
            changed,
            ignored,
        }
    }
}

/// A step of a [`Plan`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlannedStep {
    /// The node the step applies to.
    pub urn: Urn,

    /// The operation of the step.
    pub operation: Operation,

    /// The input fields that differ from recorded state.
    pub changed: Vec<String>,

    /// The input fields that differ from recorded state, but whose drift is suppressed.
    pub ignored: Vec<String>,
}

impl Display for PlannedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>7} {}", self.operation.to_string(), self.urn)?;
        if self.operation != Operation::Create && !self.changed.is_empty() {
            write!(f, " [changed: {}]", self.changed.join(", "))?;
        }
        if !self.ignored.is_empty() {
            write!(f, " [ignored: {}]", self.ignored.join(", "))?;
        }
        Ok(())
    }
}

/// The steps required to converge a stack, as computed by
/// [`Engine::preview`][`crate::Engine::preview`].
#[derive(Clone, Debug, Default)]
pub struct Plan {
    steps: Vec<PlannedStep>,
}

impl Plan {
    pub(crate) fn push(&mut self, step: PlannedStep) {
        self.steps.push(step);
    }

    /// Returns all steps in processing order.
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Returns the step for `urn`.
    pub fn step(&self, urn: &Urn) -> Option<&PlannedStep> {
        self.steps.iter().find(|step| &step.urn == urn)
    }

    /// Returns all steps modifying a managed resource.
    pub fn modifications(&self) -> Vec<&PlannedStep> {
        self.steps
            .iter()
            .filter(|step| step.operation.is_modification())
            .collect()
    }

    /// Returns whether the plan modifies no managed resource.
    pub fn is_converged(&self) -> bool {
        self.modifications().is_empty()
    }

    /// Returns the number of steps per [`Operation`].
    pub fn summary(&self) -> BTreeMap<Operation, usize> {
        let mut summary = BTreeMap::new();
        for step in self.steps.iter() {
            *summary.entry(step.operation).or_default() += 1;
        }
        summary
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in self.steps.iter() {
            writeln!(f, "{step}")?;
        }
        Ok(())
    }
}
