#![doc = include_str!("../README.md")]

mod cloud;

pub use cloud::{Action, CloudOperation, Error, Image, SIMULATED_ZONES, SimulatedCloud};
use rstest::fixture;

/// The address of a sample operator.
pub static OPERATOR_IP: &str = "203.0.113.7";

/// A sample SSH public key of an operator.
pub static OPERATOR_SSH_PUBLIC_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGl8r0dM7cVxHk5hJb3E2n9bqQwTzJb3m6k8Xo3s1aYb operator@example";

/// The region of the simulated cloud.
pub static REGION: &str = "eu-central-1";

pub use fixtures::simulated_cloud;

#[allow(missing_docs)]
mod fixtures {
    use super::*;

    /// Returns a fresh [`SimulatedCloud`].
    #[fixture]
    pub fn simulated_cloud() -> SimulatedCloud {
        SimulatedCloud::new()
    }
}
