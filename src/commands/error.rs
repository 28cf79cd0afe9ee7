//! Command errors and their host-visible rendering.
//!
//! Handlers return a [`CommandError`]; [`CommandError::render`] is the only
//! place that turns one into bytes for the host.

use crate::link::{OpenError, RegistryError, ServerError};
use crate::protocol::{DecodeError, Reply};
use crate::storage::SettingsError;
use crate::tls::TrustError;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed line or argument; plain `ERROR`
    #[error("syntax error")]
    Syntax,

    /// Valid syntax refused in the current state; message line then `ERROR`
    #[error("{0}")]
    Rejected(Cow<'static, str>),

    /// Name resolution failed while opening a link
    #[error("DNS Fail")]
    DnsFail,

    /// Transport connect or handshake failed while opening a link
    #[error("connect fail")]
    ConnectFail,

    /// The operation failed and the link is reported closed
    #[error("closed")]
    Closed,

    /// Persisting settings failed
    #[error("settings: {0}")]
    Storage(#[from] SettingsError),
}

pub type CommandResult<T> = Result<T, CommandError>;

impl CommandError {
    pub fn rejected(message: impl Into<Cow<'static, str>>) -> Self {
        CommandError::Rejected(message.into())
    }

    /// Writes the host-visible form of the error.
    pub fn render(&self, out: &mut Reply) {
        match self {
            CommandError::Syntax => {
                out.error();
            }
            CommandError::Rejected(message) => {
                out.line(message.as_bytes()).error();
            }
            CommandError::DnsFail => {
                out.line("DNS Fail").error().line("CLOSED");
            }
            CommandError::ConnectFail => {
                out.line("connect fail").error().line("CLOSED");
            }
            CommandError::Closed => {
                out.error().line("CLOSED");
            }
            CommandError::Storage(e) => {
                warn!(error = %e, "Settings not saved");
                out.error();
            }
        }
    }
}

impl From<DecodeError> for CommandError {
    fn from(e: DecodeError) -> Self {
        trace!(error = %e, "Argument decode failed");
        CommandError::Syntax
    }
}

impl From<TrustError> for CommandError {
    fn from(e: TrustError) -> Self {
        match e {
            TrustError::FingerprintNotValid => CommandError::rejected("fp not valid"),
            TrustError::CaCertNotLoaded => CommandError::rejected("CA cert not loaded"),
            TrustError::BundleFull(cap) => {
                CommandError::rejected(format!("Reached the maximum of {} certificates", cap))
            }
            TrustError::NoCertificates => CommandError::rejected("+CIPSSLCERT:no certificates"),
            TrustError::NoSuchCertificate(_) => {
                CommandError::rejected("+CIPSSLCERT=DELETE:no certificate")
            }
            other => {
                trace!(error = %other, "Trust configuration refused");
                CommandError::Syntax
            }
        }
    }
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::LinkActive => CommandError::rejected("link is builded"),
            RegistryError::ServerActive => CommandError::rejected("CIPSERVER must be 0"),
            RegistryError::AlreadyConnected(_) => CommandError::rejected("ALREADY CONNECTED\r\n"),
            RegistryError::InvalidLink(_) => CommandError::rejected("link is not valid"),
        }
    }
}

impl From<OpenError> for CommandError {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::Dns(_) => CommandError::DnsFail,
            OpenError::Connect(_) | OpenError::Handshake(_) => CommandError::ConnectFail,
            OpenError::ServerName(_) | OpenError::MissingTlsConfig => CommandError::Syntax,
        }
    }
}

impl From<ServerError> for CommandError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::NotRunning | ServerError::AlreadyRunning(_) => {
                CommandError::rejected("no change")
            }
            other => {
                warn!(error = %other, "Server command failed");
                CommandError::Syntax
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(e: CommandError) -> Vec<u8> {
        let mut out = Reply::new();
        e.render(&mut out);
        out.as_bytes().to_vec()
    }

    #[test]
    fn test_render_forms() {
        assert_eq!(rendered(CommandError::Syntax), b"\r\nERROR\r\n");
        assert_eq!(
            rendered(CommandError::rejected("MUX=0")),
            b"MUX=0\r\n\r\nERROR\r\n"
        );
        assert_eq!(
            rendered(CommandError::DnsFail),
            b"DNS Fail\r\n\r\nERROR\r\nCLOSED\r\n"
        );
        assert_eq!(rendered(CommandError::Closed), b"\r\nERROR\r\nCLOSED\r\n");
    }

    #[test]
    fn test_conversions() {
        assert!(matches!(
            CommandError::from(DecodeError::ExpectedNumber(3)),
            CommandError::Syntax
        ));
        assert_eq!(
            rendered(TrustError::BundleFull(2).into()),
            b"Reached the maximum of 2 certificates\r\n\r\nERROR\r\n"
        );
        assert_eq!(
            rendered(RegistryError::AlreadyConnected(0).into()),
            b"ALREADY CONNECTED\r\n\r\n\r\nERROR\r\n"
        );
        assert!(matches!(
            CommandError::from(OpenError::Dns("x".into())),
            CommandError::DnsFail
        ));
    }
}
