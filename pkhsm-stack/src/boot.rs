//! Boot configuration of the bastion host.

use std::{fs::read_to_string, path::Path};

use base64ct::{Base64, Encoding};
use log::debug;

/// The boundary between the parts of a rendered multipart document.
pub const MIME_BOUNDARY: &str = "MIMEBOUNDARY";

/// The content type of a cloud-init configuration part.
pub const CLOUD_CONFIG_CONTENT_TYPE: &str = "text/cloud-config";

/// An error that may occur when rendering a boot configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The template can not be read.
    #[error("Unable to read the boot configuration template {path}:\n{source}")]
    Template {
        /// The path to the template.
        path: std::path::PathBuf,
        /// The error source.
        source: std::io::Error,
    },

    /// The template is empty.
    #[error("The boot configuration template {path} is empty")]
    EmptyTemplate {
        /// The path to the template.
        path: std::path::PathBuf,
    },
}

/// Renders a boot configuration template into an opaque payload for a compute instance.
pub trait BootConfigRenderer: std::fmt::Debug {
    /// Renders the template at `template` and returns the base64-encoded payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the template can not be rendered.
    fn render(&self, template: &Path) -> Result<String, Error>;
}

/// Renders a cloud-init configuration as multipart document with a single part.
///
/// # Examples
///
/// ```
/// use base64ct::{Base64, Encoding};
/// use pkhsm_stack::{BootConfigRenderer, CloudInitRenderer};
///
/// # fn main() -> testresult::TestResult {
/// let template = testdir::testdir!().join("userdata.yaml");
/// std::fs::write(&template, "#cloud-config\npackages: [opensc]\n")?;
///
/// let payload = CloudInitRenderer::default().render(&template)?;
/// let document = String::from_utf8(Base64::decode_vec(&payload)?)?;
/// assert!(document.contains("Content-Type: text/cloud-config"));
/// assert!(document.contains("packages: [opensc]"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct CloudInitRenderer;

impl CloudInitRenderer {
    /// Wraps `content` as single `text/cloud-config` part of a multipart document.
    pub fn multipart(content: &str) -> String {
        let content = content.trim_end_matches(['\r', '\n']);
        format!(
            "Content-Type: multipart/mixed; boundary=\"{MIME_BOUNDARY}\"\r\n\
             MIME-Version: 1.0\r\n\
             \r\n\
             --{MIME_BOUNDARY}\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             Content-Type: {CLOUD_CONFIG_CONTENT_TYPE}\r\n\
             Mime-Version: 1.0\r\n\
             \r\n\
             {content}\r\n\
             --{MIME_BOUNDARY}--\r\n"
        )
    }
}

impl BootConfigRenderer for CloudInitRenderer {
    fn render(&self, template: &Path) -> Result<String, Error> {
        let content = read_to_string(template).map_err(|source| Error::Template {
            path: template.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Err(Error::EmptyTemplate {
                path: template.to_path_buf(),
            });
        }
        debug!("Rendering boot configuration from {}", template.display());
        Ok(Base64::encode_string(Self::multipart(&content).as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use testdir::testdir;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn multipart_wraps_a_single_part() {
        let document = CloudInitRenderer::multipart("#cloud-config\nruncmd: [true]\n");

        assert!(document.starts_with("Content-Type: multipart/mixed; boundary=\"MIMEBOUNDARY\""));
        assert_eq!(document.matches("--MIMEBOUNDARY\r\n").count(), 1);
        assert!(document.ends_with("#cloud-config\nruncmd: [true]\r\n--MIMEBOUNDARY--\r\n"));
    }

    #[test]
    fn rendering_is_deterministic() -> TestResult {
        let template = testdir!().join("userdata.yaml");
        write(&template, "#cloud-config\n")?;

        let renderer = CloudInitRenderer;
        assert_eq!(renderer.render(&template)?, renderer.render(&template)?);
        Ok(())
    }

    #[test]
    fn missing_template_fails() {
        let template = testdir!().join("missing.yaml");
        assert!(matches!(
            CloudInitRenderer.render(&template),
            Err(Error::Template { .. })
        ));
    }

    #[test]
    fn empty_template_fails() -> TestResult {
        let template = testdir!().join("empty.yaml");
        write(&template, "\n")?;

        assert!(matches!(
            CloudInitRenderer.render(&template),
            Err(Error::EmptyTemplate { .. })
        ));
        Ok(())
    }
}
