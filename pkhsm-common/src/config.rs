//! Default locations for pkhsm configuration files.
//!
//! A configuration file is looked up in the current working directory first and in the
//! configuration directory of the calling user second.
//!
//! # Examples
//!
//! ```
//! use pkhsm_common::config::{get_config_file, get_config_file_or_default};
//!
//! // Get the first config file found, according to precedence.
//! println!("{:?}", get_config_file());
//!
//! // Get the first config file found, or the default in the working directory.
//! println!("{:?}", get_config_file_or_default());
//! ```

use std::path::PathBuf;

/// The filename of a pkhsm configuration file in the working directory.
const LOCAL_CONFIG_FILE: &str = "pkhsm.toml";

/// The application name used for the user configuration directory.
const APP_NAME: &str = "pkhsm";

/// The name of the configuration file in the user configuration directory.
const USER_CONFIG_NAME: &str = "config";

/// Returns the path of the configuration file in the current working directory.
pub fn get_local_config_file_path() -> PathBuf {
    PathBuf::from(LOCAL_CONFIG_FILE)
}

/// Returns the path of the configuration file in the user configuration directory.
///
/// The location follows the platform conventions (e.g. `$XDG_CONFIG_HOME/pkhsm/config.toml` on
/// Linux, where an empty or relative `$XDG_CONFIG_HOME` is ignored in favor of
/// `$HOME/.config`).
/// Returns [`None`] if the home directory of the calling user can not be determined.
pub fn get_user_config_file_path() -> Option<PathBuf> {
    confy::get_configuration_file_path(APP_NAME, USER_CONFIG_NAME).ok()
}

/// Returns all configuration file paths, sorted by precedence.
pub fn get_config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![get_local_config_file_path()];
    if let Some(path) = get_user_config_file_path() {
        paths.push(path);
    }
    paths
}

/// Returns the first pkhsm configuration file available, or [`None`] if none found.
pub fn get_config_file() -> Option<PathBuf> {
    get_config_file_paths().into_iter().find(|path| path.is_file())
}

/// Returns the first pkhsm configuration file available, or the default in the working
/// directory.
pub fn get_config_file_or_default() -> PathBuf {
    get_config_file().unwrap_or_else(get_local_config_file_path)
}
