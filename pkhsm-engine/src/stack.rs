//! Provisioning programs.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Graph, Inputs, NodeKind, Output, Resource, ResourceOptions, ResourceType, Urn};

/// A declared resource or read.
#[derive(Clone, Debug)]
pub struct Node {
    urn: Urn,
    kind: NodeKind,
    inputs: Inputs,
    options: ResourceOptions,
}

impl Node {
    /// Returns the [`Urn`] of the node.
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Returns the [`NodeKind`] of the node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the [`Inputs`] of the node.
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Returns the [`ResourceOptions`] of the node.
    pub fn options(&self) -> &ResourceOptions {
        &self.options
    }

    /// Returns the resources this node reads data from.
    pub fn data_dependencies(&self) -> BTreeSet<Urn> {
        self.inputs.dependencies()
    }

    /// Returns the resources this node is explicitly ordered after.
    pub fn explicit_dependencies(&self) -> &BTreeSet<Urn> {
        self.options.get_depends_on()
    }
}

/// A provisioning program: declared resources, reads and exported values.
///
/// Declaring a resource does not provision anything.
/// The returned [`Resource`] handle exposes deferred attributes, which are passed as inputs to
/// other resources.
///
/// # Examples
///
/// ```
/// use pkhsm_engine::{Inputs, ResourceOptions, Stack};
/// use serde_json::json;
///
/// # fn main() -> testresult::TestResult {
/// let mut stack = Stack::new("dev");
/// let cluster = stack.resource(
///     "aws:cloudhsmv2/cluster:Cluster",
///     "hsmCluster",
///     Inputs::new().with("mode", json!("FIPS")),
///     ResourceOptions::new(),
/// )?;
/// let hsm = stack.resource(
///     "aws:cloudhsmv2/hsm:Hsm",
///     "hsm",
///     Inputs::new().output("cluster_id", cluster.string("cluster_id")),
///     ResourceOptions::new(),
/// )?;
/// stack.export("hsm_ip", hsm.string("ip_address"));
///
/// let graph = stack.graph()?;
/// assert!(graph.precedes(cluster.urn(), hsm.urn()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Stack {
    name: String,
    nodes: Vec<Node>,
    exports: BTreeMap<String, Output<Value>>,
}

impl Stack {
    /// Creates a new, empty [`Stack`].
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            exports: BTreeMap::new(),
        }
    }

    /// Returns the name of the stack.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn declare(
        &mut self,
        kind: NodeKind,
        resource_type: &str,
        name: &str,
        inputs: Inputs,
        options: ResourceOptions,
    ) -> Result<Resource, Error> {
        let urn = Urn::new(resource_type.parse::<ResourceType>()?, name)?;
        if self.nodes.iter().any(|node| node.urn == urn) {
            return Err(Error::DuplicateResource { urn });
        }
        debug!(
            urn:% = urn,
            kind:% = kind,
            inputs:? = inputs.names().collect::<Vec<_>>();
            "Declared {urn}"
        );
        self.nodes.push(Node {
            urn: urn.clone(),
            kind,
            inputs,
            options,
        });
        Ok(Resource::new(urn))
    }

    /// Declares a managed resource.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `resource_type` is not a valid [`ResourceType`],
    /// - `name` is not a valid resource name,
    /// - or a node with the same type and name is already declared.
    pub fn resource(
        &mut self,
        resource_type: &str,
        name: &str,
        inputs: Inputs,
        options: ResourceOptions,
    ) -> Result<Resource, Error> {
        self.declare(NodeKind::Managed, resource_type, name, inputs, options)
    }

    /// Declares a read of existing data (a data source).
    ///
    /// Reads are executed on every run.
    /// Use [`ResourceOptions::depends_on`] if a read only succeeds once another resource exists.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - `function` is not a valid [`ResourceType`],
    /// - `name` is not a valid resource name,
    /// - or a node with the same type and name is already declared.
    pub fn read(
        &mut self,
        function: &str,
        name: &str,
        args: Inputs,
        options: ResourceOptions,
    ) -> Result<Resource, Error> {
        self.declare(NodeKind::Read, function, name, args, options)
    }

    /// Exports a value as run output under `name`.
    ///
    /// Replaces a previous export of the same `name`.
    pub fn export<T>(&mut self, name: &str, value: Output<T>)
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        self.exports.insert(name.to_string(), value.into_value());
    }

    /// Returns all declared nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node identified by `urn`.
    pub fn node(&self, urn: &Urn) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.urn == urn)
    }

    /// Returns all exported values.
    pub fn exports(&self) -> &BTreeMap<String, Output<Value>> {
        &self.exports
    }

    /// Builds the dependency [`Graph`] of the stack.
    ///
    /// # Errors
    ///
    /// Returns an error if a node depends on an undeclared resource or if the dependencies
    /// form a cycle.
    pub fn graph(&self) -> Result<Graph, Error> {
        Graph::new(self)
    }
}
