//! Files on the local filesystem.

use std::{
    fs::{Permissions, create_dir_all, remove_file, rename, set_permissions, write},
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use log::{debug, info};
use pkhsm_common::artifacts::ARTIFACT_FILE_PERMISSION;
use pkhsm_engine::{Properties, Provider, ProviderError, ResourceType, Urn};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{optional, string};

/// The package of the [`LocalProvider`].
pub const PACKAGE: &str = "local";

/// A file with fixed content.
pub const FILE: &str = "local:index/file:File";

/// The octal permission of files, if none is requested.
pub const DEFAULT_FILE_PERMISSION: &str = ARTIFACT_FILE_PERMISSION;

/// An error that may occur when handling local files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file permission is not an octal mode.
    #[error("The file permission \"{permission}\" is not an octal mode")]
    InvalidPermission {
        /// The invalid permission.
        permission: String,
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
}

impl From<Error> for ProviderError {
    fn from(value: Error) -> Self {
        ProviderError::api(value)
    }
}

/// Parses an octal file permission (e.g. `644`).
///
/// # Examples
///
/// ```
/// use pkhsm_stack::providers::local::parse_permission;
///
/// # fn main() -> testresult::TestResult {
/// assert_eq!(parse_permission("644")?, 0o644);
/// assert_eq!(parse_permission("0600")?, 0o600);
/// assert!(parse_permission("9").is_err());
/// # Ok(())
/// # }
/// ```
pub fn parse_permission(permission: &str) -> Result<u32, Error> {
    match u32::from_str_radix(permission, 8) {
        Ok(mode) if !permission.is_empty() && mode <= 0o7777 => Ok(mode),
        _ => Err(Error::InvalidPermission {
            permission: permission.to_string(),
        }),
    }
}

/// Writes `content` to `path` with the file mode `mode`.
///
/// Missing parent directories are created.
/// The content is written to a temporary file next to `path` first, which is renamed to `path`
/// once it is complete, so that `path` never holds partial content.
pub fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|source| Error::IoPath {
            path: parent.to_path_buf(),
            context: "creating the parent directory",
            source,
        })?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let temporary = path.with_file_name(format!(".{file_name}.tmp"));
    write(&temporary, content).map_err(|source| Error::IoPath {
        path: temporary.clone(),
        context: "writing the content",
        source,
    })?;
    set_permissions(&temporary, Permissions::from_mode(mode)).map_err(|source| {
        Error::IoPath {
            path: temporary.clone(),
            context: "applying the file permission",
            source,
        }
    })?;
    rename(&temporary, path).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "moving the content into place",
        source,
    })?;

    Ok(())
}

/// Manages files on the local filesystem.
///
/// Every change of an input replaces the file.
#[derive(Clone, Debug, Default)]
pub struct LocalProvider;

impl LocalProvider {
    fn file(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        let filename = PathBuf::from(string(urn, inputs, "filename")?);
        let content = string(urn, inputs, "content")?;
        let permission: String = optional(
            urn,
            inputs,
            "file_permission",
            DEFAULT_FILE_PERMISSION.to_string(),
        )?;
        let mode = parse_permission(&permission)?;

        write_file(&filename, content.as_bytes(), mode)?;
        info!(urn:% = urn; "Wrote {} (mode {mode:o})", filename.display());

        let digest = hex::encode(Sha256::digest(content.as_bytes()));
        let mut outputs = inputs.clone();
        outputs.insert("id".to_string(), json!(digest));
        outputs.insert("content_sha256".to_string(), json!(digest));
        Ok(outputs)
    }
}

impl Provider for LocalProvider {
    fn package(&self) -> &str {
        PACKAGE
    }

    fn create(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        match urn.resource_type().as_str() {
            FILE => self.file(urn, inputs),
            _ => Err(ProviderError::Unsupported {
                resource_type: urn.resource_type().clone(),
            }),
        }
    }

    fn update(
        &self,
        urn: &Urn,
        _outputs: &Properties,
        inputs: &Properties,
    ) -> Result<Properties, ProviderError> {
        self.create(urn, inputs)
    }

    fn delete(&self, urn: &Urn, outputs: &Properties) -> Result<(), ProviderError> {
        let filename = PathBuf::from(string(urn, outputs, "filename")?);
        match remove_file(&filename) {
            Ok(()) => {
                info!(urn:% = urn; "Removed {}", filename.display());
                Ok(())
            }
            Err(source) if source.kind() == ErrorKind::NotFound => {
                debug!(urn:% = urn; "{} is already removed", filename.display());
                Ok(())
            }
            Err(source) => Err(Error::IoPath {
                path: filename,
                context: "removing it",
                source,
            }
            .into()),
        }
    }

    fn read(&self, urn: &Urn, _args: &Properties) -> Result<Properties, ProviderError> {
        Err(ProviderError::Unsupported {
            resource_type: urn.resource_type().clone(),
        })
    }

    fn replace_on_change(&self, _resource_type: &ResourceType, _field: &str) -> bool {
        true
    }
}
