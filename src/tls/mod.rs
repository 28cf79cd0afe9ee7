//! TLS trust configuration for SSL links.
//!
//! - `trust`: authentication mode, fingerprint and CA bundle
//! - `verifier`: rustls verifiers for the no-check and fingerprint modes
//! - `der`: Common Name extraction for certificate listings

pub mod der;
pub mod trust;
pub mod verifier;

pub use trust::{AuthMode, TrustError, TrustManager};
pub use verifier::{server_name_for, sha1_fingerprint};
