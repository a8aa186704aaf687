//! Error handling.

use std::path::PathBuf;

/// An error that may occur when declaring an HSM-backed PKI environment.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A boot configuration error.
    #[error("Boot configuration error:\n{0}")]
    Boot(#[from] crate::boot::Error),

    /// A configuration error.
    #[error("Configuration error:\n{0}")]
    Config(#[from] crate::config::Error),

    /// An engine error.
    #[error("Engine error:\n{0}")]
    Engine(#[from] pkhsm_engine::Error),

    /// The architecture of the selected image does not match the instance type.
    #[error(
        "The image {image} is built for {architecture}, but the instance type {instance_type} requires {required}"
    )]
    ImageArchitecture {
        /// The identifier of the image.
        image: String,
        /// The architecture of the image.
        architecture: String,
        /// The configured instance type.
        instance_type: String,
        /// The architecture the instance type requires.
        required: &'static str,
    },

    /// An I/O error for a specific path.
    #[error("I/O error for file {path} while {context}: {source}")]
    IoPath {
        /// The path to the file for which the error occurred.
        path: PathBuf,
        /// The context in which the error occurs.
        ///
        /// This is meant to complete the sentence "I/O error for file {path} while ".
        context: &'static str,
        /// The error source.
        source: std::io::Error,
    },

    /// The network provides fewer subnets than required.
    #[error("The network provides {available} subnet(s), but subnet {index} is required")]
    MissingSubnet {
        /// The index of the required subnet.
        index: usize,
        /// The number of available subnets.
        available: usize,
    },

    /// TOML error while reading a file.
    #[error("TOML read error for file {path} while {context}:\n{source}")]
    TomlRead {
        /// The path to a file that fails to read.
        path: PathBuf,
        /// The context in which the error occurs.
        ///
        /// This is meant to complete the sentence "TOML read error for file {path} while ".
        context: &'static str,
        /// The error source.
        source: Box<toml::de::Error>,
    },
}
