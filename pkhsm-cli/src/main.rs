//! Application for inspecting pkhsm environments.

use std::process::ExitCode;

use clap::Parser;
use log::{debug, error};
use pkhsm_cli::{
    cli::{Cli, Command, GraphCommand},
    graph::render,
};
use pkhsm_engine::Stack;
use pkhsm_stack::{CloudInitRenderer, StackConfig};

/// pkhsm error.
#[derive(Debug, thiserror::Error)]
enum Error {
    /// Declaring the environment failed.
    #[error("Environment error:\n{0}")]
    Stack(#[from] pkhsm_stack::Error),

    /// The dependency graph is invalid.
    #[error("Engine error:\n{0}")]
    Engine(#[from] pkhsm_engine::Error),

    /// The output can not be written.
    #[error("I/O error while writing output: {0}")]
    Io(#[from] std::io::Error),

    /// A pkhsm-common logging error.
    #[error(transparent)]
    Logging(#[from] pkhsm_common::logging::Error),
}

/// Declares the environment configured for `command` and prints its waves on stdout.
///
/// # Errors
///
/// Returns an error if
/// - the configuration can not be loaded,
/// - the environment can not be declared,
/// - the dependency graph is invalid,
/// - or writing to stdout fails.
fn graph(command: GraphCommand) -> Result<(), Error> {
    let config = StackConfig::new_from_file(command.config.as_deref())?;
    let mut stack = Stack::new(config.name());
    pkhsm_stack::declare(&mut stack, &config, &CloudInitRenderer)?;
    let graph = stack.graph()?;
    debug!(nodes = graph.nodes().len(), waves = graph.waves().len(); "Rendering graph");

    render(&graph, std::io::stdout().lock())?;
    Ok(())
}

/// Runs the requested subcommand.
fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(error) = pkhsm_common::logging::setup_logging(args.verbosity) {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }

    let result = match args.command {
        Command::Graph(command) => graph(command),
    };

    if let Err(error) = result {
        error!("{error}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
