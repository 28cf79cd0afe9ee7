//! TLS Trust Manager
//!
//! Holds the global trust configuration consulted whenever an SSL link is
//! opened:
//!
//! - authentication mode (none / fingerprint / certificate chain)
//! - one stored SHA-1 fingerprint
//! - an ordered, capped bundle of CA certificates (raw DER)
//! - an optional TLS record size limit
//!
//! Mode changes are validated against their prerequisites. A mode can still
//! lose its prerequisite later (the last certificate deleted), in which case
//! [`TrustManager::client_config`] refuses to build a configuration and the
//! link open fails.

use super::der;
use super::verifier::{FingerprintVerifier, NoVerification};
use bytes::Bytes;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default cap on the CA bundle
pub const DEFAULT_MAX_CERTIFICATES: usize = 5;

/// Record sizes accepted by `AT+CIPSSLSIZE`; 16384 is the protocol default.
pub const SSL_BUFFER_SIZES: [u32; 5] = [512, 1024, 2048, 4096, 16384];

/// How the server certificate of an SSL link is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Accept any certificate
    #[default]
    None,
    /// Compare the SHA-1 of the end-entity certificate
    Fingerprint,
    /// Validate the chain against the CA bundle
    CertificateChain,
}

impl AuthMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AuthMode::None),
            1 => Some(AuthMode::Fingerprint),
            2 => Some(AuthMode::CertificateChain),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AuthMode::None => 0,
            AuthMode::Fingerprint => 1,
            AuthMode::CertificateChain => 2,
        }
    }
}

/// Trust configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrustError {
    #[error("no valid fingerprint stored")]
    FingerprintNotValid,

    #[error("no CA certificate loaded")]
    CaCertNotLoaded,

    #[error("certificate bundle is full ({0})")]
    BundleFull(usize),

    #[error("no certificates loaded")]
    NoCertificates,

    #[error("no certificate at position {0}")]
    NoSuchCertificate(usize),

    #[error("cap {cap} is below the {loaded} loaded certificates")]
    CapBelowLoaded { cap: usize, loaded: usize },

    #[error("unsupported TLS buffer size {0}")]
    InvalidBufferSize(u32),
}

/// The trust configuration.
#[derive(Debug, Clone)]
pub struct TrustManager {
    mode: AuthMode,
    fingerprint: Option<[u8; 20]>,
    bundle: Vec<Bytes>,
    cap: usize,
    buffer_size: Option<usize>,
}

impl TrustManager {
    pub fn new(cap: usize) -> Self {
        Self {
            mode: AuthMode::None,
            fingerprint: None,
            bundle: Vec::new(),
            cap,
            buffer_size: None,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Selects the authentication mode if its prerequisite is met.
    pub fn set_mode(&mut self, mode: AuthMode) -> Result<(), TrustError> {
        match mode {
            AuthMode::Fingerprint if self.fingerprint.is_none() => {
                Err(TrustError::FingerprintNotValid)
            }
            AuthMode::CertificateChain if self.bundle.is_empty() => {
                Err(TrustError::CaCertNotLoaded)
            }
            _ => {
                self.mode = mode;
                Ok(())
            }
        }
    }

    pub fn fingerprint(&self) -> Option<&[u8; 20]> {
        self.fingerprint.as_ref()
    }

    /// Stores an already validated fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: [u8; 20]) {
        self.fingerprint = Some(fingerprint);
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Changes the bundle cap. The cap may not drop below the loaded count.
    pub fn set_cap(&mut self, cap: usize) -> Result<(), TrustError> {
        if cap < self.bundle.len() {
            return Err(TrustError::CapBelowLoaded {
                cap,
                loaded: self.bundle.len(),
            });
        }
        self.cap = cap;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bundle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundle.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bundle.len() >= self.cap
    }

    /// Appends a DER certificate. Returns its 1-based position.
    pub fn append(&mut self, der: Bytes) -> Result<usize, TrustError> {
        if self.is_full() {
            return Err(TrustError::BundleFull(self.cap));
        }
        self.bundle.push(der);
        Ok(self.bundle.len())
    }

    /// The certificate at 1-based `position`.
    pub fn certificate(&self, position: usize) -> Result<&Bytes, TrustError> {
        if position == 0 {
            return Err(TrustError::NoSuchCertificate(position));
        }
        self.bundle
            .get(position - 1)
            .ok_or(TrustError::NoSuchCertificate(position))
    }

    /// Iterates certificates with their 1-based positions.
    pub fn certificates(&self) -> impl Iterator<Item = (usize, &Bytes)> {
        self.bundle.iter().enumerate().map(|(i, c)| (i + 1, c))
    }

    /// Display label of a certificate: its CN, or `cert ok`.
    pub fn label(der: &[u8]) -> String {
        match der::common_name(der) {
            Some(cn) => String::from_utf8_lossy(cn).into_owned(),
            None => "cert ok".to_string(),
        }
    }

    /// Removes the certificate at 1-based `position`, keeping the order of the rest.
    pub fn delete(&mut self, position: usize) -> Result<(), TrustError> {
        if self.bundle.is_empty() {
            return Err(TrustError::NoCertificates);
        }
        if position == 0 || position > self.bundle.len() {
            return Err(TrustError::NoSuchCertificate(position));
        }
        self.bundle.remove(position - 1);
        Ok(())
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.map_or(16384, |s| s as u32)
    }

    /// Sets the TLS record size; 16384 restores the default.
    pub fn set_buffer_size(&mut self, size: u32) -> Result<(), TrustError> {
        if !SSL_BUFFER_SIZES.contains(&size) {
            return Err(TrustError::InvalidBufferSize(size));
        }
        self.buffer_size = if size == 16384 {
            None
        } else {
            Some(size as usize)
        };
        Ok(())
    }

    /// Builds the rustls client configuration for a new SSL link.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TrustError> {
        let mut config = match self.mode {
            AuthMode::None => ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth(),
            AuthMode::Fingerprint => {
                let fp = self.fingerprint.ok_or(TrustError::FingerprintNotValid)?;
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(FingerprintVerifier::new(fp)))
                    .with_no_client_auth()
            }
            AuthMode::CertificateChain => {
                let mut roots = RootCertStore::empty();
                for (position, der) in self.certificates() {
                    if let Err(e) = roots.add(CertificateDer::from(der.to_vec())) {
                        warn!(position, error = %e, "Skipping unusable CA certificate");
                    }
                }
                if roots.is_empty() {
                    return Err(TrustError::CaCertNotLoaded);
                }
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth()
            }
        };

        // rustls counts the 5-byte record header in the fragment size.
        config.max_fragment_size = self.buffer_size.map(|s| s + 5);
        debug!(mode = ?self.mode, buffer = self.buffer_size(), "Built TLS client configuration");
        Ok(Arc::new(config))
    }
}

impl Default for TrustManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CERTIFICATES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::der::tests::cert_with_cn;

    fn bundle_of(manager: &TrustManager) -> Vec<Bytes> {
        manager.certificates().map(|(_, c)| c.clone()).collect()
    }

    #[test]
    fn test_fingerprint_mode_requires_fingerprint() {
        let mut trust = TrustManager::default();
        assert_eq!(
            trust.set_mode(AuthMode::Fingerprint),
            Err(TrustError::FingerprintNotValid)
        );
        assert_eq!(trust.mode(), AuthMode::None);

        trust.set_fingerprint([0xab; 20]);
        assert_eq!(trust.set_mode(AuthMode::Fingerprint), Ok(()));
        assert_eq!(trust.mode(), AuthMode::Fingerprint);
    }

    #[test]
    fn test_chain_mode_requires_bundle() {
        let mut trust = TrustManager::default();
        assert_eq!(
            trust.set_mode(AuthMode::CertificateChain),
            Err(TrustError::CaCertNotLoaded)
        );

        trust.append(Bytes::from(cert_with_cn("Root"))).unwrap();
        assert_eq!(trust.set_mode(AuthMode::CertificateChain), Ok(()));
    }

    #[test]
    fn test_append_respects_cap() {
        let mut trust = TrustManager::new(2);
        assert_eq!(trust.append(Bytes::from_static(b"a")), Ok(1));
        assert_eq!(trust.append(Bytes::from_static(b"b")), Ok(2));
        assert_eq!(
            trust.append(Bytes::from_static(b"c")),
            Err(TrustError::BundleFull(2))
        );
        assert_eq!(trust.len(), 2);
    }

    #[test]
    fn test_set_cap_below_loaded() {
        let mut trust = TrustManager::new(3);
        trust.append(Bytes::from_static(b"a")).unwrap();
        trust.append(Bytes::from_static(b"b")).unwrap();
        assert_eq!(
            trust.set_cap(1),
            Err(TrustError::CapBelowLoaded { cap: 1, loaded: 2 })
        );
        assert_eq!(trust.set_cap(2), Ok(()));
        assert!(trust.is_full());
    }

    #[test]
    fn test_delete_preserves_order() {
        let mut trust = TrustManager::new(5);
        for name in ["one", "two", "three", "four", "five"] {
            trust.append(Bytes::from(name)).unwrap();
        }

        trust.delete(3).unwrap();
        assert_eq!(
            bundle_of(&trust),
            vec![
                Bytes::from("one"),
                Bytes::from("two"),
                Bytes::from("four"),
                Bytes::from("five")
            ]
        );
    }

    #[test]
    fn test_delete_out_of_range_leaves_bundle() {
        let mut trust = TrustManager::new(5);
        for name in ["one", "two", "three", "four", "five"] {
            trust.append(Bytes::from(name)).unwrap();
        }
        let before = bundle_of(&trust);

        assert_eq!(trust.delete(6), Err(TrustError::NoSuchCertificate(6)));
        assert_eq!(trust.delete(0), Err(TrustError::NoSuchCertificate(0)));
        assert_eq!(bundle_of(&trust), before);
    }

    #[test]
    fn test_delete_empty_bundle() {
        let mut trust = TrustManager::default();
        assert_eq!(trust.delete(1), Err(TrustError::NoCertificates));
    }

    #[test]
    fn test_label() {
        assert_eq!(TrustManager::label(&cert_with_cn("My CA")), "My CA");
        assert_eq!(TrustManager::label(b"junk"), "cert ok");
    }

    #[test]
    fn test_buffer_size() {
        let mut trust = TrustManager::default();
        assert_eq!(trust.buffer_size(), 16384);
        trust.set_buffer_size(4096).unwrap();
        assert_eq!(trust.buffer_size(), 4096);
        assert_eq!(
            trust.set_buffer_size(4000),
            Err(TrustError::InvalidBufferSize(4000))
        );
        trust.set_buffer_size(16384).unwrap();
        assert_eq!(trust.buffer_size(), 16384);
    }

    #[test]
    fn test_client_config_prerequisites() {
        let mut trust = TrustManager::default();
        assert!(trust.client_config().is_ok());

        trust.append(Bytes::from(cert_with_cn("Root"))).unwrap();
        trust.set_mode(AuthMode::CertificateChain).unwrap();
        trust.delete(1).unwrap();
        assert_eq!(
            trust.client_config().err(),
            Some(TrustError::CaCertNotLoaded)
        );
    }
}
