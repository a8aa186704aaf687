//! Command line interface for `pkhsm`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

/// Command line arguments of `pkhsm`.
#[derive(Debug, Parser)]
#[command(
    name = "pkhsm",
    about = "Inspect an environment consisting of an HSM cluster, its PKI and a bastion host."
)]
pub struct Cli {
    /// Global processing log verbosity.
    #[command(flatten)]
    pub verbosity: Verbosity,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The subcommands of `pkhsm`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the dependency graph of an environment.
    Graph(GraphCommand),
}

/// Arguments of the `graph` subcommand.
#[derive(Debug, Parser)]
#[command(
    about = "Print the execution waves of an environment",
    long_about = "Print the execution waves of an environment

The environment described by the configuration file is declared, but nothing is provisioned.
Each wave lists the nodes that may be processed in parallel once all earlier waves are done.
Explicit ordering constraints are listed below the node they apply to."
)]
pub struct GraphCommand {
    /// The path to a configuration file.
    #[arg(
        env = "PKHSM_CONFIG",
        help = "The path to a configuration file",
        long_help = "The path to a configuration file

If not specified, the default configuration file locations are searched.",
        long,
        short
    )]
    pub config: Option<PathBuf>,
}
