//! Names and locations of the certificate artifacts of an HSM cluster.
//!
//! The signed cluster certificate and the customer CA certificate are written to a shared
//! artifacts directory, from which operators pick them up to initialize the cluster.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//!
//! use pkhsm_common::artifacts::{get_ca_certificate_path, get_cluster_certificate_path};
//!
//! let dir = Path::new("./dist");
//! assert_eq!(
//!     get_cluster_certificate_path(dir, "cluster-abc123"),
//!     Path::new("./dist/cluster-abc123_CustomerHsmCertificate.crt")
//! );
//! assert_eq!(get_ca_certificate_path(dir), Path::new("./dist/customerCA.crt"));
//! ```

use std::path::{Path, PathBuf};

/// The default directory for certificate artifacts, relative to the working directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "./dist";

/// The file name of the customer CA certificate.
pub const CA_CERTIFICATE_FILE: &str = "customerCA.crt";

/// The suffix appended to a cluster identifier to form the signed cluster certificate file name.
pub const CLUSTER_CERTIFICATE_SUFFIX: &str = "_CustomerHsmCertificate.crt";

/// The octal file permission of all certificate artifacts (`rw-r--r--`).
pub const ARTIFACT_FILE_PERMISSION: &str = "644";

/// Returns the file name of the signed certificate for the cluster `cluster_id`.
pub fn get_cluster_certificate_file_name(cluster_id: &str) -> String {
    format!("{cluster_id}{CLUSTER_CERTIFICATE_SUFFIX}")
}

/// Returns the path of the signed certificate for the cluster `cluster_id` in `dir`.
pub fn get_cluster_certificate_path(dir: &Path, cluster_id: &str) -> PathBuf {
    dir.join(get_cluster_certificate_file_name(cluster_id))
}

/// Returns the path of the customer CA certificate in `dir`.
pub fn get_ca_certificate_path(dir: &Path) -> PathBuf {
    dir.join(CA_CERTIFICATE_FILE)
}
