#![doc = include_str!("../README.md")]

pub mod artifacts;
pub mod aws;
pub mod config;
#[cfg(feature = "logging")]
pub mod logging;
