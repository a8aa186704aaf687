//! Dependency graphs of provisioning programs.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::{Error, NodeKind, Stack, Urn};

/// The kind of a dependency edge.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::Display)]
pub enum EdgeKind {
    /// The dependent reads data of the dependency.
    #[strum(to_string = "data")]
    Data,

    /// The dependent is explicitly ordered after the dependency.
    #[strum(to_string = "explicit")]
    Explicit,
}

/// A dependency edge: `to` is processed strictly after `from`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Edge {
    /// The dependency.
    pub from: Urn,

    /// The dependent.
    pub to: Urn,

    /// The kind of the edge.
    pub kind: EdgeKind,
}

/// The validated dependency graph of a [`Stack`].
///
/// Data edges are derived from the deferred inputs of each node, explicit edges from
/// [`ResourceOptions::depends_on`][`crate::ResourceOptions::depends_on`].
/// A node that has both a data and an explicit dependency on the same node has two edges.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<Urn>,
    kinds: HashMap<Urn, NodeKind>,
    edges: BTreeSet<Edge>,
    dependencies: HashMap<Urn, BTreeSet<Urn>>,
    dependents: HashMap<Urn, BTreeSet<Urn>>,
    waves: Vec<Vec<Urn>>,
}

impl Graph {
    /// Creates a new [`Graph`] from the nodes of `stack`.
    ///
    /// # Errors
    ///
    /// Returns an error if
    /// - a node depends on a resource that is not declared in `stack`,
    /// - or the dependencies form a cycle.
    pub fn new(stack: &Stack) -> Result<Self, Error> {
        let nodes: Vec<Urn> = stack.nodes().iter().map(|node| node.urn().clone()).collect();
        let kinds = stack
            .nodes()
            .iter()
            .map(|node| (node.urn().clone(), node.kind()))
            .collect();

        let mut edges = BTreeSet::new();
        let mut dependencies: HashMap<Urn, BTreeSet<Urn>> = HashMap::new();
        let mut dependents: HashMap<Urn, BTreeSet<Urn>> = HashMap::new();
        for node in stack.nodes() {
            let typed = node
                .data_dependencies()
                .into_iter()
                .map(|urn| (urn, EdgeKind::Data))
                .chain(
                    node.explicit_dependencies()
                        .iter()
                        .cloned()
                        .map(|urn| (urn, EdgeKind::Explicit)),
                );
            for (dependency, kind) in typed {
                if !nodes.contains(&dependency) {
                    return Err(Error::UnknownDependency {
                        urn: node.urn().clone(),
                        dependency,
                    });
                }
                dependencies
                    .entry(node.urn().clone())
                    .or_default()
                    .insert(dependency.clone());
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(node.urn().clone());
                edges.insert(Edge {
                    from: dependency,
                    to: node.urn().clone(),
                    kind,
                });
            }
        }

        let waves = Self::levels(&nodes, &dependencies)?;

        Ok(Self {
            nodes,
            kinds,
            edges,
            dependencies,
            dependents,
            waves,
        })
    }

    /// Groups `nodes` into waves, in which every node only depends on nodes of earlier waves.
    ///
    /// Nodes keep their declaration order within a wave.
    fn levels(
        nodes: &[Urn],
        dependencies: &HashMap<Urn, BTreeSet<Urn>>,
    ) -> Result<Vec<Vec<Urn>>, Error> {
        let mut remaining: Vec<&Urn> = nodes.iter().collect();
        let mut done: BTreeSet<&Urn> = BTreeSet::new();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&Urn>, Vec<&Urn>) =
                remaining.into_iter().partition(|urn| {
                    dependencies
                        .get(*urn)
                        .is_none_or(|deps| deps.iter().all(|dep| done.contains(dep)))
                });
            if ready.is_empty() {
                return Err(Error::DependencyCycle {
                    urns: blocked.into_iter().cloned().collect(),
                });
            }
            done.extend(ready.iter().copied());
            waves.push(ready.into_iter().cloned().collect());
            remaining = blocked;
        }

        Ok(waves)
    }

    /// Returns all nodes in declaration order.
    pub fn nodes(&self) -> &[Urn] {
        &self.nodes
    }

    /// Returns the [`NodeKind`] of `urn`.
    pub fn kind(&self, urn: &Urn) -> Option<NodeKind> {
        self.kinds.get(urn).copied()
    }

    /// Returns all edges.
    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    /// Returns the waves of the graph.
    ///
    /// All nodes of a wave are independent of each other and only depend on nodes of earlier
    /// waves, which is why they may be processed in parallel.
    pub fn waves(&self) -> &[Vec<Urn>] {
        &self.waves
    }

    /// Returns all nodes in a valid processing order.
    pub fn order(&self) -> Vec<&Urn> {
        self.waves.iter().flatten().collect()
    }

    /// Returns the direct dependencies of `urn`.
    pub fn dependencies(&self, urn: &Urn) -> BTreeSet<&Urn> {
        self.dependencies
            .get(urn)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Returns the explicit (non-data) dependencies of `urn`.
    pub fn explicit_dependencies(&self, urn: &Urn) -> BTreeSet<&Urn> {
        self.edges
            .iter()
            .filter(|edge| &edge.to == urn && edge.kind == EdgeKind::Explicit)
            .map(|edge| &edge.from)
            .collect()
    }

    /// Returns all nodes that directly or transitively depend on `urn`.
    pub fn dependents(&self, urn: &Urn) -> BTreeSet<&Urn> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([urn]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents.get(current).into_iter().flatten() {
                if found.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        found
    }

    /// Returns whether `before` is guaranteed to be processed strictly before `after`.
    ///
    /// This is the case if `after` directly or transitively depends on `before`.
    pub fn precedes(&self, before: &Urn, after: &Urn) -> bool {
        self.dependents(before).contains(after)
    }

    /// Returns the index of the wave containing each node.
    pub fn wave_index(&self) -> BTreeMap<&Urn, usize> {
        self.waves
            .iter()
            .enumerate()
            .flat_map(|(index, wave)| wave.iter().map(move |urn| (urn, index)))
            .collect()
    }
}
