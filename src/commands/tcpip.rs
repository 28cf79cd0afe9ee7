//! Link commands: open, send, close, listen and receive.

use super::error::{CommandError, CommandResult};
use super::handler::{CommandHandler, Completion};
use super::table::{Form, Matched};
use crate::link::{
    read_link_prefix, resolve, Link, LinkType, MuxMode, Origin, RecvMode, TransferError,
    ALL_LINKS, DEFAULT_SERVER_PORT, MAX_LINKS, MAX_TRANSFER,
};
use crate::protocol::types::format_mac;
use crate::protocol::{Cursor, Reply};
use crate::wifi::Interface;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound of `AT+CIPSTO`, in seconds
const MAX_IDLE_TIMEOUT: u32 = 7200;

impl CommandHandler {
    // ========================================================================
    // Status
    // ========================================================================

    pub(super) fn cmd_cipstatus(&self, out: &mut Reply) -> CommandResult<Completion> {
        let device = &self.device;
        if !device.wifi.is_connected() {
            out.line("STATUS:5");
            return Ok(Completion::Ok);
        }

        let max_id = device.registry.max_link_id();
        let mut listed = false;
        for (id, link) in device.registry.iter() {
            if id > max_id || !link.is_connected() {
                continue;
            }
            if !listed {
                out.line("STATUS:3");
                listed = true;
            }
            let role = match link.origin() {
                Origin::Client => 0,
                Origin::Server(_) => 1,
            };
            write!(
                out,
                "+CIPSTATUS:{},\"{}\",\"{}\",{},{},{}\r\n",
                id,
                link.kind().as_str(),
                link.remote().ip(),
                link.remote().port(),
                link.local_port(),
                role
            );
        }

        if !listed {
            let status = if device.registry.was_connected() { 4 } else { 2 };
            write!(out, "STATUS:{}\r\n", status);
        }
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_cifsr(&self, out: &mut Reply) -> CommandResult<Completion> {
        let wifi = &self.device.wifi;
        write!(out, "+CIFSR:STAIP,\"{}\"\r\n", wifi.local_ip());
        write!(out, "+CIFSR:STAMAC,\"{}\"\r\n", format_mac(&wifi.mac_address(Interface::Station)));
        Ok(Completion::Ok)
    }

    // ========================================================================
    // Opening and Closing
    // ========================================================================

    /// `AT+CIPSTART=[id,]"type","host",port[,keepalive]`
    pub(super) async fn cmd_cipstart(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        let mut cursor = Cursor::new(line, m.args);
        cursor.expect(b'=')?;

        let id = if self.device.registry.is_multiplexed() {
            read_link_prefix(&mut cursor, (MAX_LINKS - 1) as u8).ok_or(CommandError::Syntax)?
        } else {
            0
        };

        let quoted = cursor.remaining().get(..5).unwrap_or_default();
        let kind = match quoted {
            [b'"', text @ .., b'"'] => LinkType::parse(text),
            _ => None,
        }
        .ok_or_else(|| CommandError::rejected("Link type ERROR\r\n"))?;
        cursor.eat_slice(quoted);

        let ip_error = || CommandError::rejected("IP ERROR\r\n");
        cursor.expect(b',').map_err(|_| ip_error())?;
        let host = cursor.read_string(false, true).map_err(|_| ip_error())?;
        if host.contains(&b' ') {
            return Err(ip_error());
        }
        cursor.expect(b',').map_err(|_| ip_error())?;

        // From here on a malformed line is reported as a closed link
        let port = cursor.read_number().map_err(|_| CommandError::Closed)?;
        let port = u16::try_from(port).map_err(|_| CommandError::Closed)?;
        if cursor.eat(b',') {
            // Keepalive interval: links use the OS keepalive, so the digits
            // (possibly none) are only skipped
            cursor.skip_digits();
        }
        cursor.finish().map_err(|_| CommandError::Closed)?;

        let host = String::from_utf8_lossy(&host).into_owned();
        debug!(link = id, kind = kind.as_str(), host = %host, port, "Opening link");

        if !self.device.has_ip() {
            return Err(CommandError::rejected("no ip"));
        }
        if self.device.registry.is_open(id) {
            return Err(CommandError::rejected("ALREADY CONNECTED\r\n"));
        }

        let tls = match kind {
            LinkType::Ssl => Some(self.device.trust.client_config().map_err(|e| {
                debug!(error = %e, "No usable TLS configuration");
                CommandError::Syntax
            })?),
            _ => None,
        };

        let addr = resolve(&host, port).await?;
        let link = Link::open(kind, &host, addr, tls).await?;
        self.device.registry.insert(id, link)?;
        info!(link = id, remote = %addr, "Link connected");

        write!(out, "{}CONNECT\r\n", self.device.registry.prefix(id));
        Ok(Completion::Ok)
    }

    /// `AT+CIPCLOSE[=id]`, id 5 closing every link
    pub(super) async fn cmd_cipclose(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        let mut cursor = Cursor::new(line, m.args);
        let multiplexed = self.device.registry.is_multiplexed();

        let target = if cursor.eat(b'=') {
            let id = cursor.read_number_in(0..=ALL_LINKS as u32)? as usize;
            cursor.finish()?;
            if !multiplexed {
                return Err(CommandError::rejected("MUX=0"));
            }
            id
        } else {
            cursor.finish()?;
            if multiplexed {
                return Err(CommandError::rejected("MUX=1"));
            }
            0
        };

        let registry = &mut self.device.registry;
        for id in 0..MAX_LINKS {
            if id != target && target != ALL_LINKS {
                continue;
            }
            let prefix = registry.prefix(id);
            match registry.remove(id) {
                Some(mut link) => {
                    link.stop().await;
                    write!(out, "{}CLOSED\r\n", prefix);
                }
                None if target == ALL_LINKS => {}
                None if multiplexed => return Err(CommandError::rejected("UNLINK")),
                None => return Err(CommandError::Syntax),
            }
        }
        Ok(Completion::Ok)
    }

    /// `AT+CIPCLOSEMODE`: validated and otherwise ignored.
    pub(super) fn cmd_cipclosemode(&self, m: Matched, line: &[u8]) -> CommandResult<Completion> {
        let mut cursor = Cursor::new(line, m.args);
        cursor.expect(b'=')?;
        let first = cursor.read_number_in(0..=ALL_LINKS as u32)?;
        if self.device.registry.is_multiplexed() {
            cursor.expect(b',')?;
            cursor.read_number_in(0..=1)?;
        } else if first > 1 {
            return Err(CommandError::Syntax);
        }
        cursor.finish()?;
        Ok(Completion::Ok)
    }

    // ========================================================================
    // Sending and Receiving
    // ========================================================================

    /// `AT+CIPSEND=[id,]len`: prompts for `len` raw bytes.
    pub(super) fn cmd_cipsend(&mut self, m: Matched, line: &[u8]) -> CommandResult<Completion> {
        let mut cursor = Cursor::new(line, m.args);
        cursor.expect(b'=')?;
        let link = self.link_argument(&mut cursor)?;

        match self.device.registry.get(link) {
            Some(l) if l.is_connected() => {}
            _ => return Err(CommandError::rejected("link is not valid")),
        }

        let len = cursor.read_number()? as usize;
        cursor.finish()?;
        if len > MAX_TRANSFER {
            return Err(CommandError::rejected("too long"));
        }

        if let Some(l) = self.device.registry.get_mut(link) {
            l.pending_send = len;
        }
        debug!(link, len, "Awaiting send payload");
        Ok(Completion::Send { link, len })
    }

    /// `AT+CIPRECVDATA=[id,]size`: pulls buffered bytes in passive mode.
    pub(super) async fn cmd_ciprecvdata(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form != Form::Set {
            return Err(CommandError::Syntax);
        }
        let mut cursor = Cursor::new(line, m.args);
        let link = self.link_argument(&mut cursor)?;
        if !self.device.registry.is_open(link) {
            return Err(CommandError::rejected("link is not valid"));
        }

        let size = cursor.read_number()? as usize;
        cursor.finish()?;
        if size > MAX_TRANSFER {
            return Err(CommandError::rejected("too long"));
        }

        let device = &mut self.device;
        match device.transfer.pull(&mut device.registry, link, size).await {
            Ok(data) => {
                write!(out, "+CIPRECVDATA,{}:", data.len());
                out.raw(&data).raw("\r\n");
                Ok(Completion::Ok)
            }
            Err(TransferError::Empty) | Err(TransferError::NotOpen(_)) => Err(CommandError::Syntax),
        }
    }

    pub(super) async fn cmd_ciprecvlen(&mut self, m: Matched, out: &mut Reply) -> CommandResult<Completion> {
        if m.form != Form::Query {
            return Err(CommandError::Syntax);
        }
        let registry = &mut self.device.registry;
        let mut counts = [0usize; MAX_LINKS];
        for (id, count) in counts.iter_mut().enumerate() {
            if let Some(link) = registry.get_mut(id) {
                link.fill().await;
                *count = link.available();
            }
        }
        let counts: Vec<String> = counts.iter().map(usize::to_string).collect();
        write!(out, "+CIPRECVLEN:{}\r\n", counts.join(","));
        Ok(Completion::Ok)
    }

    /// Reads the optional `<digit>,` link prefix of CIPSEND / CIPRECVDATA.
    ///
    /// A prefix in single mode is refused; without one, link 0 is used.
    fn link_argument(&self, cursor: &mut Cursor<'_>) -> CommandResult<usize> {
        match read_link_prefix(cursor, MAX_LINKS as u8) {
            Some(_) if !self.device.registry.is_multiplexed() => Err(CommandError::rejected("MUX=0")),
            Some(id) => Ok(id),
            None => Ok(0),
        }
    }

    // ========================================================================
    // Modes
    // ========================================================================

    pub(super) fn cmd_cipmux(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CIPMUX:{}\r\n\r\nOK\r\n", self.device.registry.mux().code());
            return Ok(Completion::Done);
        }

        let mut cursor = Cursor::new(line, m.args);
        let mode = match cursor.read_number_in(0..=1)? {
            0 => MuxMode::Single,
            _ => MuxMode::Multiplex,
        };
        cursor.finish()?;

        let listening = self.device.servers.is_listening();
        self.device.registry.set_mux(mode, listening)?;
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_cipdinfo(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            let shown = if self.device.transfer.show_remote { "TRUE" } else { "FALSE" };
            write!(out, "+CIPDINFO:{}\r\n\r\nOK\r\n", shown);
            return Ok(Completion::Done);
        }

        let mut cursor = Cursor::new(line, m.args);
        let show = cursor.read_number_in(0..=1)?;
        cursor.finish()?;
        self.device.transfer.show_remote = show == 1;
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_ciprecvmode(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CIPRECVMODE:{}\r\n\r\nOK\r\n", self.device.transfer.mode().code());
            return Ok(Completion::Done);
        }

        let mut cursor = Cursor::new(line, m.args);
        let mode = match cursor.read_number_in(0..=1)? {
            0 => RecvMode::Active,
            _ => RecvMode::Passive,
        };
        cursor.finish()?;

        let device = &mut self.device;
        device.transfer.set_mode(mode, &mut device.registry);
        Ok(Completion::Ok)
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// `AT+CIPSERVER=<0|1>[,port]`
    pub(super) async fn cmd_cipserver(&mut self, m: Matched, line: &[u8]) -> CommandResult<Completion> {
        if !self.device.registry.is_multiplexed() {
            return Err(CommandError::Syntax);
        }

        let mut cursor = Cursor::new(line, m.args);
        cursor.expect(b'=')?;
        let start = match cursor.peek() {
            Some(b'0') => false,
            Some(b'1') => true,
            _ => return Err(CommandError::Syntax),
        };
        cursor.eat(if start { b'1' } else { b'0' });

        let port = if cursor.at_end() {
            if start {
                DEFAULT_SERVER_PORT
            } else {
                0
            }
        } else {
            cursor.expect(b',')?;
            let port = cursor.read_number()?;
            cursor.finish()?;
            u16::try_from(port).map_err(|_| CommandError::Syntax)?
        };

        let servers = &mut self.device.servers;
        if start {
            servers.start(port).await?;
        } else {
            servers.stop(port)?;
        }
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_cipservermaxconn(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CIPSERVERMAXCONN:{}\r\n", self.device.servers.config.max_connections);
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let max = cursor.read_number_in(1..=MAX_LINKS as u32)?;
        cursor.finish()?;
        self.device.servers.config.max_connections = max as usize;
        Ok(Completion::Ok)
    }

    pub(super) fn cmd_cipsto(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CIPSTO:{}\r\n", self.device.servers.config.idle_timeout.as_secs());
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let secs = cursor.read_number_in(0..=MAX_IDLE_TIMEOUT)?;
        cursor.finish()?;
        self.device.servers.config.idle_timeout = Duration::from_secs(u64::from(secs));
        Ok(Completion::Ok)
    }
}
