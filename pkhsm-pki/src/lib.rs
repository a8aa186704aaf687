#![doc = include_str!("../README.md")]

mod certificate;
mod error;
mod key;

pub use certificate::{CertificateProfile, KeyUse, self_sign, sign_request};
pub use error::Error;
pub use key::{MIN_RSA_BIT_LENGTH, RsaKey, generate_rsa_key};
