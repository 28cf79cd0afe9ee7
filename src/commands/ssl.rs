//! TLS commands: record size, authentication mode, fingerprint and the CA
//! certificate bundle.

use super::error::{CommandError, CommandResult};
use super::handler::{CommandHandler, Completion};
use super::table::{Form, Matched};
use crate::protocol::{Cursor, Reply};
use crate::tls::{AuthMode, TrustError, TrustManager};
use tracing::info;

impl CommandHandler {
    /// `AT+CIPSSLSIZE=<size>`; there is no query form.
    pub(super) fn cmd_cipsslsize(&mut self, m: Matched, line: &[u8]) -> CommandResult<Completion> {
        if m.form != Form::Set {
            return Err(CommandError::Syntax);
        }
        let mut cursor = Cursor::new(line, m.args);
        let size = cursor.read_number()?;
        cursor.finish()?;
        self.device.trust.set_buffer_size(size)?;
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_cipsslauth(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CIPSSLAUTH:{}\r\n", self.device.trust.mode().code());
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let code = cursor.read_number_in(0..=2)?;
        cursor.finish()?;
        let mode = AuthMode::from_code(code).ok_or(CommandError::Syntax)?;
        self.device.trust.set_mode(mode)?;
        info!(?mode, "TLS authentication mode");
        Ok(Completion::Ok)
    }

    /// `AT+CIPSSLFP?` / `AT+CIPSSLFP="<sha1>"`, compact or colon separated.
    pub(super) fn cmd_cipsslfp(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            return match self.device.trust.fingerprint() {
                Some(fp) => {
                    write!(out, "+CIPSSLFP:\"{}\"\r\n\r\nOK\r\n", hex_pairs(fp));
                    Ok(Completion::Done)
                }
                None => Err(CommandError::rejected("not valid")),
            };
        }

        let mut cursor = Cursor::new(line, m.args);
        let fingerprint = cursor.read_fingerprint()?;
        cursor.finish()?;
        self.device.trust.set_fingerprint(fingerprint);
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_cipsslcertmax(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CIPSSLCERTMAX:{}\r\nOK\r\n", self.device.trust.cap());
            return Ok(Completion::Done);
        }

        let mut cursor = Cursor::new(line, m.args);
        let cap = cursor.read_number()?;
        cursor.finish()?;
        self.device.trust.set_cap(cap as usize)?;
        self.device.settings.update(|s| s.max_certificates = cap)?;
        Ok(Completion::Ok)
    }

    /// `AT+CIPSSLCERT` in its four shapes:
    ///
    /// - bare: prompt for a PEM certificate
    /// - `?`: list every loaded certificate
    /// - `?<n>`: show certificate `n`
    /// - `=DELETE,<n>`: remove certificate `n`
    pub(super) fn cmd_cipsslcert(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        let mut cursor = Cursor::new(line, m.args);
        let trust = &mut self.device.trust;

        if cursor.at_end() {
            if trust.is_full() {
                return Err(TrustError::BundleFull(trust.cap()).into());
            }
            return Ok(Completion::LoadCertificate);
        }

        if cursor.eat(b'?') {
            if cursor.at_end() {
                if trust.is_empty() {
                    out.line("+CIPSSLCERT:no certs loaded");
                }
                for (position, der) in trust.certificates() {
                    write!(out, "+CIPSSLCERT,{}:{}\r\n", position, TrustManager::label(der));
                }
                return Ok(Completion::Ok);
            }

            let position = cursor.read_number()? as usize;
            cursor.finish()?;
            if position == 0 {
                return Err(CommandError::Syntax);
            }
            let der = trust.certificate(position).map_err(|_| {
                CommandError::rejected(format!("+CIPSSLCERT,{}:no certificate", position))
            })?;
            write!(out, "+CIPSSLCERT,{}:{}\r\n", position, TrustManager::label(der));
            return Ok(Completion::Ok);
        }

        if cursor.eat_slice(b"=DELETE,") {
            if trust.is_empty() {
                return Err(TrustError::NoCertificates.into());
            }
            let position = cursor.read_number()? as usize;
            cursor.finish()?;
            if position == 0 {
                return Err(CommandError::Syntax);
            }
            trust.delete(position)?;
            info!(position, remaining = trust.len(), "CA certificate deleted");
            write!(out, "+CIPSSLCERT,{}:deleted\r\n", position);
            return Ok(Completion::Ok);
        }

        Err(CommandError::Syntax)
    }
}

/// Colon separated lowercase hex, as printed for fingerprints.
fn hex_pairs(bytes: &[u8; 20]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
