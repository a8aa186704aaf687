#![doc = include_str!("../README.md")]

mod engine;
mod error;
mod graph;
mod output;
mod plan;
mod provider;
mod resource;
mod stack;
mod state;
mod urn;

pub use engine::{
    DEFAULT_PARALLELISM,
    Engine,
    Outputs,
    SECRET_PLACEHOLDER,
    StepOutcome,
    StepStatus,
    Update,
    UpdateOptions,
};
pub use error::Error;
pub use graph::{Edge, EdgeKind, Graph};
pub use output::{Known, Output, Properties, Resolved, Resolver};
pub use plan::{Operation, Plan, PlannedStep};
pub use provider::{Provider, ProviderError, Providers};
pub use resource::{Inputs, NodeKind, Resource, ResourceOptions};
pub use stack::{Node, Stack};
pub use state::{ResourceState, State};
pub use urn::{ResourceType, Urn};
