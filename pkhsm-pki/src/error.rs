//! Error handling.

use crate::MIN_RSA_BIT_LENGTH;

/// An error that may occur when generating keys or issuing certificates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An RSA key is requested with an unsafe key length.
    #[error(
        "RSA keys shorter than {MIN_RSA_BIT_LENGTH} are not supported. A key length of {key_length} is unsafe!"
    )]
    InvalidKeyLengthRsa {
        /// The invalid key length.
        key_length: usize,
    },

    /// A certificate is requested with an empty validity period.
    #[error("The validity period of a certificate must be at least one hour")]
    InvalidValidity,

    /// A self-signed certificate is requested without a common name.
    #[error("A self-signed certificate requires a subject common name")]
    MissingCommonName,

    /// Generating an RSA key failed.
    #[error("RSA error while {context}:\n{source}")]
    Rsa {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "RSA error while ".
        context: &'static str,
        /// The error source.
        source: rsa::Error,
    },

    /// Encoding a private key as PKCS#8 failed.
    #[error("PKCS#8 error while {context}:\n{source}")]
    Pkcs8 {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "PKCS#8 error while ".
        context: &'static str,
        /// The error source.
        source: rsa::pkcs8::Error,
    },

    /// Encoding a public key as SubjectPublicKeyInfo failed.
    #[error("SPKI error while {context}:\n{source}")]
    Spki {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "SPKI error while ".
        context: &'static str,
        /// The error source.
        source: rsa::pkcs8::spki::Error,
    },

    /// Parsing, issuing or encoding a certificate or request failed.
    #[error("X.509 error while {context}:\n{source}")]
    X509 {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "X.509 error while ".
        context: &'static str,
        /// The error source.
        source: rcgen::Error,
    },
}
