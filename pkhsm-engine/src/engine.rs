//! Preview and execution of provisioning programs.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::Display,
    thread,
};

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::{
    Error,
    Graph,
    Known,
    Node,
    NodeKind,
    Operation,
    Plan,
    PlannedStep,
    Properties,
    ProviderError,
    Providers,
    ResourceState,
    Resolved,
    Resolver,
    Stack,
    State,
    Urn,
    plan::{Diff, EvaluatedInputs},
};

/// The default number of nodes processed concurrently.
pub const DEFAULT_PARALLELISM: usize = 10;

/// The replacement of a secret value in human-readable output.
pub const SECRET_PLACEHOLDER: &str = "[secret]";

/// Options for a single run of an [`Engine`].
///
/// # Examples
///
/// ```
/// use pkhsm_engine::{UpdateOptions, Urn};
///
/// # fn main() -> testresult::TestResult {
/// let ca: Urn = "tls:index/selfSignedCert:SelfSignedCert::customerCA".parse()?;
/// let options = UpdateOptions::new().replace(&ca);
/// assert!(options.is_replaced(&ca));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct UpdateOptions {
    replace: BTreeSet<Urn>,
}

impl UpdateOptions {
    /// Creates default [`UpdateOptions`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Forces the replacement of the resource `urn`.
    ///
    /// A forced replacement uses the declared inputs only, ignore-changes options do not apply.
    pub fn replace(mut self, urn: &Urn) -> Self {
        self.replace.insert(urn.clone());
        self
    }

    /// Returns whether the replacement of `urn` is forced.
    pub fn is_replaced(&self, urn: &Urn) -> bool {
        self.replace.contains(urn)
    }
}

/// The outputs of a resolved node.
#[derive(Clone, Debug, Default)]
struct Resolution {
    outputs: Properties,
    secret_fields: BTreeSet<String>,
}

/// All nodes resolved so far during a run.
#[derive(Debug, Default)]
struct Resolutions {
    resources: HashMap<Urn, Resolution>,
}

impl Resolutions {
    fn insert(&mut self, urn: Urn, outputs: Properties, secret_fields: BTreeSet<String>) {
        self.resources.insert(
            urn,
            Resolution {
                outputs,
                secret_fields,
            },
        );
    }

    fn contains(&self, urn: &Urn) -> bool {
        self.resources.contains_key(urn)
    }
}

impl Resolver for Resolutions {
    fn resolve(&self, urn: &Urn) -> Option<Resolved<'_>> {
        self.resources.get(urn).map(|resolution| Resolved {
            outputs: &resolution.outputs,
            secret_fields: &resolution.secret_fields,
        })
    }
}

/// The status of an executed step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StepStatus {
    /// The step succeeded.
    Succeeded,

    /// The step failed.
    Failed {
        /// The error message of the failure.
        message: String,
    },

    /// The step was not executed, because a step it depends on failed.
    Skipped {
        /// The failed step.
        cause: Urn,
    },
}

/// The outcome of a step of an [`Update`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepOutcome {
    /// The node of the step.
    pub urn: Urn,

    /// The executed operation.
    ///
    /// [`None`] if the step was skipped or failed before the operation was determined.
    pub operation: Option<Operation>,

    /// The status of the step.
    pub status: StepStatus,
}

impl StepOutcome {
    /// Returns whether the step failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, StepStatus::Failed { .. })
    }

    /// Returns whether the step was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, StepStatus::Skipped { .. })
    }
}

impl Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operation = self
            .operation
            .map(|operation| operation.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &self.status {
            StepStatus::Succeeded => write!(f, "{operation:>7} {}", self.urn),
            StepStatus::Failed { message } => {
                write!(f, "{operation:>7} {} failed: {message}", self.urn)
            }
            StepStatus::Skipped { cause } => {
                write!(f, "{operation:>7} {} skipped (depends on {cause})", self.urn)
            }
        }
    }
}

/// The exported values of a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, Known<Value>>,
}

impl Outputs {
    /// Returns the value exported as `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).map(|known| &known.value)
    }

    /// Returns whether the value exported as `name` is secret.
    pub fn is_secret(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|known| known.secret)
    }

    /// Returns the names of all exported values.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of exported values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether no values are exported.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Display for Outputs {
    /// Writes one `name: value` line per export, with secret values masked.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, known) in self.values.iter() {
            match &known.value {
                _ if known.secret => writeln!(f, "{name}: {SECRET_PLACEHOLDER}")?,
                Value::String(value) => writeln!(f, "{name}: {value}")?,
                value => writeln!(f, "{name}: {value}")?,
            }
        }
        Ok(())
    }
}

/// The result of [`Engine::up`].
#[derive(Debug)]
pub struct Update {
    state: State,
    outputs: Outputs,
    steps: Vec<StepOutcome>,
    export_errors: Vec<Error>,
}

impl Update {
    /// Returns the new state.
    ///
    /// Resources whose step failed or was skipped keep their previously recorded state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the new state, consuming the [`Update`].
    pub fn into_state(self) -> State {
        self.state
    }

    /// Returns the exported values that could be resolved.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Returns the outcome of all steps in execution order.
    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    /// Returns the outcome of the step for `urn`.
    pub fn step(&self, urn: &Urn) -> Option<&StepOutcome> {
        self.steps.iter().find(|step| &step.urn == urn)
    }

    /// Returns all failed steps.
    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.steps.iter().filter(|step| step.is_failed()).collect()
    }

    /// Checks that all steps succeeded and all exports could be evaluated.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::StepsFailed`] listing every failed step and export.
    pub fn check(&self) -> Result<(), Error> {
        let failures: Vec<String> = self
            .failures()
            .into_iter()
            .map(ToString::to_string)
            .chain(self.export_errors.iter().map(ToString::to_string))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::StepsFailed { failures })
        }
    }
}

/// The result of executing a single node.
#[derive(Debug)]
enum Executed {
    Managed {
        operation: Operation,
        state: ResourceState,
    },
    Read {
        outputs: Properties,
        secret_fields: BTreeSet<String>,
    },
}

/// A failed node execution.
#[derive(Debug)]
struct Failure {
    error: Error,
    operation: Option<Operation>,
    /// Whether the existing resource was deleted before the failure.
    deleted: bool,
}

impl Failure {
    fn new(error: Error, operation: Option<Operation>) -> Self {
        Self {
            error,
            operation,
            deleted: false,
        }
    }
}

/// Previews and executes [`Stack`]s using a set of [`Providers`].
///
/// # Examples
///
/// ```
/// use pkhsm_engine::{Engine, Providers, Stack, State, UpdateOptions};
///
/// # fn main() -> testresult::TestResult {
/// let engine = Engine::new(Providers::new()).with_parallelism(4);
/// let stack = Stack::new("empty");
///
/// let plan = engine.preview(&stack, &State::default(), &UpdateOptions::new())?;
/// assert!(plan.is_converged());
///
/// let update = engine.up(&stack, &State::default(), &UpdateOptions::new())?;
/// update.check()?;
/// assert!(update.state().is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    providers: Providers,
    parallelism: usize,
}

impl Engine {
    /// Creates a new [`Engine`] using `providers`.
    pub fn new(providers: Providers) -> Self {
        Self {
            providers,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Sets the maximum number of nodes processed concurrently.
    ///
    /// A `parallelism` of zero is treated as one.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Returns the [`Providers`] of the engine.
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Computes the steps required to converge `stack` from `state`, without modifying anything.
    ///
    /// Reads are executed once all nodes they depend on are resolved, so that data of existing
    /// infrastructure is taken into account.
    /// A read depending on a pending create, update or replacement is not executed and leaves
    /// all values derived from it unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - the dependency graph of `stack` is invalid,
    /// - no provider is registered for a node,
    /// - evaluating the inputs of a node fails,
    /// - or executing a read fails.
    pub fn preview(
        &self,
        stack: &Stack,
        state: &State,
        options: &UpdateOptions,
    ) -> Result<Plan, Error> {
        let graph = stack.graph()?;
        let mut resolutions = Resolutions::default();
        let mut plan = Plan::default();

        for urn in graph.order() {
            let Some(node) = stack.node(urn) else {
                continue;
            };
            let provider = self.providers.for_urn(urn)?;
            let evaluated = EvaluatedInputs::evaluate(node, &resolutions)?;

            match node.kind() {
                NodeKind::Read => {
                    let pending = graph
                        .dependencies(urn)
                        .into_iter()
                        .any(|dependency| !resolutions.contains(dependency));
                    if pending || !evaluated.unknown.is_empty() {
                        debug!(urn:% = urn; "Deferring read {urn} until its dependencies exist");
                    } else {
                        let outputs = provider
                            .read(urn, &evaluated.values)
                            .map_err(|source| Error::Provider {
                                urn: urn.clone(),
                                source,
                            })?;
                        let secret_fields =
                            provider.secret_outputs(urn.resource_type()).into_iter().collect();
                        resolutions.insert(urn.clone(), outputs, secret_fields);
                    }
                    plan.push(PlannedStep {
                        urn: urn.clone(),
                        operation: Operation::Read,
                        changed: Vec::new(),
                        ignored: Vec::new(),
                    });
                }
                NodeKind::Managed => {
                    let old = state.get(urn);
                    let diff =
                        Diff::compute(node, old, &evaluated, provider, options.is_replaced(urn));
                    if let (Operation::Same, Some(old)) = (diff.operation, old) {
                        resolutions.insert(
                            urn.clone(),
                            old.outputs.clone(),
                            old.secret_fields.clone(),
                        );
                    }
                    plan.push(PlannedStep {
                        urn: urn.clone(),
                        operation: diff.operation,
                        changed: diff.changed,
                        ignored: diff.ignored,
                    });
                }
            }
        }

        for urn in state.deletion_order() {
            if stack.node(urn).is_none() {
                plan.push(PlannedStep {
                    urn: urn.clone(),
                    operation: Operation::Delete,
                    changed: Vec::new(),
                    ignored: Vec::new(),
                });
            }
        }

        debug!("Preview of stack {}:\n{plan}", stack.name());
        Ok(plan)
    }

    /// Converges `stack` from `state`.
    ///
    /// Nodes are processed wave by wave: all nodes of a wave run concurrently (bounded by the
    /// configured parallelism) and a wave only starts once the previous one has finished.
    /// A failing node does not abort the run.
    /// Instead all nodes that directly or transitively depend on it are skipped, while all
    /// independent nodes are still processed.
    /// Recorded resources that are no longer declared are deleted last, dependents first.
    ///
    /// The returned [`Update`] always carries the new state, so that it can be persisted even
    /// if steps failed.
    /// Use [`Update::check`] to turn failed steps into an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the dependency graph of `stack` is invalid or if a node has no
    /// registered provider.
    pub fn up(&self, stack: &Stack, state: &State, options: &UpdateOptions) -> Result<Update, Error> {
        let graph = stack.graph()?;
        for node in stack.nodes() {
            self.providers.for_urn(node.urn())?;
        }

        let mut new_state = state.clone();
        let mut resolutions = Resolutions::default();
        let mut steps = Vec::new();
        // skipped node -> failed node it depends on
        let mut skipped: BTreeMap<Urn, Urn> = BTreeMap::new();

        for (index, wave) in graph.waves().iter().enumerate() {
            debug!(wave = index, nodes = wave.len(); "Processing wave {index}");
            let mut runnable = Vec::new();
            for urn in wave {
                if let Some(cause) = skipped.get(urn) {
                    warn!(urn:% = urn, cause:% = cause; "Skipping {urn}, because {cause} failed");
                    steps.push(StepOutcome {
                        urn: urn.clone(),
                        operation: None,
                        status: StepStatus::Skipped {
                            cause: cause.clone(),
                        },
                    });
                } else if let Some(node) = stack.node(urn) {
                    runnable.push(node);
                }
            }

            for chunk in runnable.chunks(self.parallelism) {
                let results = self.execute_all(chunk, &graph, state, &resolutions, options);
                for (urn, result) in results {
                    match result {
                        Ok(Executed::Managed { operation, state }) => {
                            resolutions.insert(
                                urn.clone(),
                                state.outputs.clone(),
                                state.secret_fields.clone(),
                            );
                            new_state.insert(urn.clone(), state);
                            steps.push(StepOutcome {
                                urn,
                                operation: Some(operation),
                                status: StepStatus::Succeeded,
                            });
                        }
                        Ok(Executed::Read {
                            outputs,
                            secret_fields,
                        }) => {
                            resolutions.insert(urn.clone(), outputs, secret_fields);
                            steps.push(StepOutcome {
                                urn,
                                operation: Some(Operation::Read),
                                status: StepStatus::Succeeded,
                            });
                        }
                        Err(failure) => {
                            error!(error:% = failure.error, urn:% = urn; "Step for {urn} failed");
                            if failure.deleted {
                                new_state.remove(&urn);
                            }
                            for dependent in graph.dependents(&urn) {
                                skipped.entry(dependent.clone()).or_insert_with(|| urn.clone());
                            }
                            steps.push(StepOutcome {
                                urn,
                                operation: failure.operation,
                                status: StepStatus::Failed {
                                    message: failure.error.to_string(),
                                },
                            });
                        }
                    }
                }
            }
        }

        for urn in state.deletion_order() {
            if stack.node(urn).is_some() {
                continue;
            }
            let status = match self.delete(urn, state) {
                Ok(()) => {
                    new_state.remove(urn);
                    StepStatus::Succeeded
                }
                Err(error) => {
                    error!(error:% = error, urn:% = urn; "Deleting {urn} failed");
                    StepStatus::Failed {
                        message: error.to_string(),
                    }
                }
            };
            steps.push(StepOutcome {
                urn: urn.clone(),
                operation: Some(Operation::Delete),
                status,
            });
        }

        let mut outputs = Outputs::default();
        let mut export_errors = Vec::new();
        for (name, output) in stack.exports() {
            match output.eval(&resolutions) {
                Ok(Some(known)) => {
                    outputs.values.insert(name.clone(), known);
                }
                Ok(None) => warn!("The export \"{name}\" is unknown, as it depends on failed steps"),
                Err(source) => export_errors.push(Error::Export {
                    name: name.clone(),
                    source: Box::new(source),
                }),
            }
        }

        Ok(Update {
            state: new_state,
            outputs,
            steps,
            export_errors,
        })
    }

    /// Executes all nodes of `chunk` concurrently.
    fn execute_all(
        &self,
        chunk: &[&Node],
        graph: &Graph,
        state: &State,
        resolutions: &Resolutions,
        options: &UpdateOptions,
    ) -> Vec<(Urn, Result<Executed, Failure>)> {
        thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|node| {
                    let replace = options.is_replaced(node.urn());
                    let handle =
                        scope.spawn(move || self.execute(node, graph, state, resolutions, replace));
                    (node.urn().clone(), handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(urn, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(Failure::new(
                            Error::Thread {
                                context: format!("processing {urn}"),
                            },
                            None,
                        ))
                    });
                    (urn, result)
                })
                .collect()
        })
    }

    /// Executes a single node.
    fn execute(
        &self,
        node: &Node,
        graph: &Graph,
        state: &State,
        resolutions: &Resolutions,
        replace: bool,
    ) -> Result<Executed, Failure> {
        let urn = node.urn();
        let provider = self
            .providers
            .for_urn(urn)
            .map_err(|error| Failure::new(error, None))?;
        let evaluated =
            EvaluatedInputs::evaluate(node, resolutions).map_err(|error| Failure::new(error, None))?;
        if let Some(field) = evaluated.first_unknown() {
            return Err(Failure::new(
                Error::UnknownInput {
                    urn: urn.clone(),
                    field: field.to_string(),
                },
                None,
            ));
        }
        let provider_error = |source: ProviderError| Error::Provider {
            urn: urn.clone(),
            source,
        };

        if node.kind() == NodeKind::Read {
            info!(urn:% = urn; "Reading {urn}");
            let outputs = provider
                .read(urn, &evaluated.values)
                .map_err(|source| Failure::new(provider_error(source), Some(Operation::Read)))?;
            return Ok(Executed::Read {
                outputs,
                secret_fields: provider.secret_outputs(urn.resource_type()).into_iter().collect(),
            });
        }

        let old = state.get(urn);
        let diff = Diff::compute(node, old, &evaluated, provider, replace);
        let operation = diff.operation;
        let fail = |source: ProviderError| Failure::new(provider_error(source), Some(operation));

        let outputs = match (operation, old) {
            (Operation::Same, Some(old)) => {
                debug!(urn:% = urn; "{urn} is up-to-date");
                old.outputs.clone()
            }
            (Operation::Update, Some(old)) => {
                info!(urn:% = urn, changed:? = diff.changed; "Updating {urn}");
                provider.update(urn, &old.outputs, &diff.inputs).map_err(fail)?
            }
            (Operation::Replace, Some(old)) => {
                info!(urn:% = urn, changed:? = diff.changed; "Replacing {urn}");
                provider.delete(urn, &old.outputs).map_err(fail)?;
                provider
                    .create(urn, &diff.inputs)
                    .map_err(|source| Failure {
                        deleted: true,
                        ..fail(source)
                    })?
            }
            _ => {
                info!(urn:% = urn; "Creating {urn}");
                provider.create(urn, &diff.inputs).map_err(fail)?
            }
        };

        let mut secret_fields = evaluated.secret;
        secret_fields.extend(provider.secret_outputs(urn.resource_type()));
        if let Some(old) = old {
            secret_fields.extend(
                diff.ignored
                    .iter()
                    .filter(|field| old.secret_fields.contains(*field))
                    .cloned(),
            );
        }

        Ok(Executed::Managed {
            operation,
            state: ResourceState {
                inputs: diff.inputs,
                outputs,
                dependencies: graph.dependencies(urn).into_iter().cloned().collect(),
                secret_fields,
            },
        })
    }

    /// Deletes the recorded resource `urn`.
    fn delete(&self, urn: &Urn, state: &State) -> Result<(), Error> {
        let Some(recorded) = state.get(urn) else {
            return Ok(());
        };
        info!(urn:% = urn; "Deleting {urn}");
        self.providers
            .for_urn(urn)?
            .delete(urn, &recorded.outputs)
            .map_err(|source| Error::Provider {
                urn: urn.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;
    use serde_json::json;
    use testresult::TestResult;

    use super::*;
    use crate::{Inputs, Output, Provider, ResourceOptions, ResourceType};

    /// A provider echoing inputs as outputs, with an `id` derived from the resource name.
    #[derive(Clone, Debug, Default)]
    struct Echo {
        log: Arc<Mutex<Vec<String>>>,
        failing: Arc<Mutex<BTreeSet<String>>>,
    }

    impl Echo {
        fn record(&self, operation: &str, urn: &Urn) -> Result<(), ProviderError> {
            if let Ok(mut log) = self.log.lock() {
                log.push(format!("{operation} {}", urn.name()));
            }
            let failing = self
                .failing
                .lock()
                .map(|failing| failing.contains(urn.name()))
                .unwrap_or_default();
            if failing {
                return Err(ProviderError::api(std::io::Error::other(format!(
                    "{} is broken",
                    urn.name()
                ))));
            }
            Ok(())
        }

        fn fail(&self, name: &str) {
            if let Ok(mut failing) = self.failing.lock() {
                failing.insert(name.to_string());
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().map(|log| log.clone()).unwrap_or_default()
        }

        fn outputs(urn: &Urn, inputs: &Properties) -> Properties {
            let mut outputs = inputs.clone();
            outputs.insert("id".to_string(), json!(format!("{}-id", urn.name())));
            outputs
        }
    }

    impl Provider for Echo {
        fn package(&self) -> &str {
            "test"
        }

        fn create(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
            self.record("create", urn)?;
            Ok(Self::outputs(urn, inputs))
        }

        fn update(
            &self,
            urn: &Urn,
            _outputs: &Properties,
            inputs: &Properties,
        ) -> Result<Properties, ProviderError> {
            self.record("update", urn)?;
            Ok(Self::outputs(urn, inputs))
        }

        fn delete(&self, urn: &Urn, _outputs: &Properties) -> Result<(), ProviderError> {
            self.record("delete", urn)
        }

        fn read(&self, urn: &Urn, args: &Properties) -> Result<Properties, ProviderError> {
            self.record("read", urn)?;
            Ok(Self::outputs(urn, args))
        }

        fn replace_on_change(&self, _resource_type: &ResourceType, field: &str) -> bool {
            field == "immutable"
        }

        fn secret_outputs(&self, _resource_type: &ResourceType) -> Vec<String> {
            vec!["token".to_string()]
        }
    }

    const NODE: &str = "test:index/node:Node";

    fn engine(echo: &Echo) -> Engine {
        Engine::new(Providers::new().register(echo.clone())).with_parallelism(2)
    }

    /// A chain `a <- b <- c` plus an independent `d`.
    fn chain(value: &str) -> TestResult<Stack> {
        let mut stack = Stack::new("test");
        let a = stack.resource(NODE, "a", Inputs::new(), ResourceOptions::new())?;
        let b = stack.resource(
            NODE,
            "b",
            Inputs::new()
                .output("a", a.string("id"))
                .with("value", json!(value)),
            ResourceOptions::new().ignore_changes(["value"]),
        )?;
        let c = stack.resource(
            NODE,
            "c",
            Inputs::new().output("b", b.string("id")),
            ResourceOptions::new(),
        )?;
        stack.resource(NODE, "d", Inputs::new(), ResourceOptions::new())?;
        stack.export("c", c.string("id"));
        Ok(stack)
    }

    #[test]
    fn up_creates_in_dependency_order_and_converges() -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let stack = chain("one")?;

        let update = engine.up(&stack, &State::default(), &UpdateOptions::new())?;
        update.check()?;
        assert_eq!(update.state().len(), 4);
        assert_eq!(update.outputs().get("c"), Some(&json!("c-id")));

        let log = echo.log();
        let position = |entry: &str| log.iter().position(|logged| logged == entry);
        assert!(position("create a") < position("create b"));
        assert!(position("create b") < position("create c"));

        let plan = engine.preview(&stack, update.state(), &UpdateOptions::new())?;
        assert!(plan.is_converged(), "{plan}");
        Ok(())
    }

    #[test]
    fn ignored_field_keeps_recorded_value() -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let first = engine.up(&chain("one")?, &State::default(), &UpdateOptions::new())?;
        let stack = chain("two")?;
        let b: Urn = format!("{NODE}::b").parse()?;

        let plan = engine.preview(&stack, first.state(), &UpdateOptions::new())?;
        let step = plan.step(&b).ok_or("no step for b")?;
        assert_eq!(step.operation, Operation::Same);
        assert_eq!(step.ignored, vec!["value".to_string()]);

        let update = engine.up(&stack, first.state(), &UpdateOptions::new())?;
        update.check()?;
        let recorded = update.state().get(&b).ok_or("b is not recorded")?;
        assert_eq!(recorded.inputs["value"], json!("one"));
        Ok(())
    }

    #[test]
    fn forced_replacement_uses_declared_values() -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let first = engine.up(&chain("one")?, &State::default(), &UpdateOptions::new())?;
        let b: Urn = format!("{NODE}::b").parse()?;
        let options = UpdateOptions::new().replace(&b);

        let update = engine.up(&chain("two")?, first.state(), &options)?;
        update.check()?;
        assert_eq!(
            update.step(&b).and_then(|step| step.operation),
            Some(Operation::Replace)
        );
        let recorded = update.state().get(&b).ok_or("b is not recorded")?;
        assert_eq!(recorded.inputs["value"], json!("two"));

        let log = echo.log();
        let position = |entry: &str| log.iter().rposition(|logged| logged == entry);
        assert!(position("delete b") < position("create b"));
        Ok(())
    }

    #[rstest]
    #[case::in_place("mutable", Operation::Update)]
    #[case::replacement("immutable", Operation::Replace)]
    fn changed_field_selects_operation(
        #[case] field: &str,
        #[case] expected: Operation,
    ) -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let declare = |value: &str| -> TestResult<Stack> {
            let mut stack = Stack::new("test");
            stack.resource(
                NODE,
                "a",
                Inputs::new().with(field, json!(value)),
                ResourceOptions::new(),
            )?;
            Ok(stack)
        };
        let first = engine.up(&declare("one")?, &State::default(), &UpdateOptions::new())?;

        let plan = engine.preview(&declare("two")?, first.state(), &UpdateOptions::new())?;
        let a: Urn = format!("{NODE}::a").parse()?;
        let step = plan.step(&a).ok_or("no step for a")?;
        assert_eq!(step.operation, expected);
        assert_eq!(step.changed, vec![field.to_string()]);
        Ok(())
    }

    #[test]
    fn failure_skips_dependents_only() -> TestResult {
        let echo = Echo::default();
        echo.fail("b");
        let engine = engine(&echo);

        let update = engine.up(&chain("one")?, &State::default(), &UpdateOptions::new())?;
        let b: Urn = format!("{NODE}::b").parse()?;
        let c: Urn = format!("{NODE}::c").parse()?;
        let d: Urn = format!("{NODE}::d").parse()?;

        assert_eq!(update.failures().len(), 1);
        assert_eq!(
            update.step(&c).map(|step| step.status.clone()),
            Some(StepStatus::Skipped { cause: b.clone() })
        );
        assert!(update.state().get(&b).is_none());
        assert!(update.state().get(&c).is_none());
        assert!(update.state().get(&d).is_some());
        assert!(update.outputs().get("c").is_none());
        assert!(!echo.log().contains(&"create c".to_string()));
        assert!(matches!(update.check(), Err(Error::StepsFailed { failures }) if failures.len() == 1));
        Ok(())
    }

    #[test]
    fn undeclared_resources_are_deleted_dependents_first() -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let first = engine.up(&chain("one")?, &State::default(), &UpdateOptions::new())?;

        let mut stack = Stack::new("test");
        stack.resource(NODE, "d", Inputs::new(), ResourceOptions::new())?;
        let plan = engine.preview(&stack, first.state(), &UpdateOptions::new())?;
        assert_eq!(plan.summary().get(&Operation::Delete), Some(&3));

        let update = engine.up(&stack, first.state(), &UpdateOptions::new())?;
        update.check()?;
        assert_eq!(update.state().len(), 1);
        let deletes: Vec<String> = echo
            .log()
            .into_iter()
            .filter(|entry| entry.starts_with("delete"))
            .collect();
        assert_eq!(deletes, ["delete c", "delete b", "delete a"]);
        Ok(())
    }

    #[test]
    fn preview_defers_reads_of_pending_resources() -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let mut stack = Stack::new("test");
        let a = stack.resource(NODE, "a", Inputs::new(), ResourceOptions::new())?;
        let lookup = stack.read(
            "test:index/getNode:getNode",
            "lookup",
            Inputs::new().with("name", json!("a")),
            ResourceOptions::new().depends_on(a.urn()),
        )?;
        stack.export("lookup", lookup.string("id"));

        let plan = engine.preview(&stack, &State::default(), &UpdateOptions::new())?;
        assert_eq!(
            plan.step(lookup.urn()).map(|step| step.operation),
            Some(Operation::Read)
        );
        assert!(echo.log().is_empty());

        let update = engine.up(&stack, &State::default(), &UpdateOptions::new())?;
        update.check()?;
        assert_eq!(echo.log(), ["create a", "read lookup"]);

        // the resource exists now, so the read runs during preview
        engine.preview(&stack, update.state(), &UpdateOptions::new())?;
        assert_eq!(echo.log().last().map(String::as_str), Some("read lookup"));
        assert_eq!(echo.log().len(), 3);
        Ok(())
    }

    #[test]
    fn secret_exports_are_masked() -> TestResult {
        let echo = Echo::default();
        let engine = engine(&echo);
        let mut stack = Stack::new("test");
        let a = stack.resource(
            NODE,
            "a",
            Inputs::new().output("key", Output::secret("ssh-ed25519 AAAA".to_string())),
            ResourceOptions::new(),
        )?;
        stack.export("key", a.string("key"));
        stack.export("token", a.output("token").map(|_| "unused".to_string()));
        stack.export("id", a.string("id"));

        let update = engine.up(&stack, &State::default(), &UpdateOptions::new())?;
        // the provider does not return a token, so the export can not be evaluated
        assert!(update.check().is_err());
        assert!(update.outputs().is_secret("key"));
        assert_eq!(update.outputs().to_string(), "id: a-id\nkey: [secret]\n");

        let a_state = update.state().get(a.urn()).ok_or("a is not recorded")?;
        assert!(a_state.secret_fields.contains("key"));
        Ok(())
    }
}
