//! Command Dispatcher
//!
//! [`CommandHandler`] owns the [`Device`] and runs one command line to
//! completion: match it against the table, route it to its handler, and
//! turn the handler's result into reply bytes.
//!
//! ## Response Contract
//!
//! A handler writes any informational lines into the [`Reply`] and returns
//! a [`Completion`] telling the dispatcher how the response ends:
//!
//! | completion        | dispatcher appends              | reader afterwards |
//! |-------------------|---------------------------------|-------------------|
//! | `Ok`              | `\r\nOK\r\n`                    | line              |
//! | `Done`            | nothing (handler wrote it)      | line              |
//! | `Send`            | `OK\r\n> `                      | raw byte count    |
//! | `LoadCertificate` | `\r\nOK\r\n>`                   | PEM block         |
//! | `Pending`         | nothing, device marked busy     | line              |
//! | `Reset`           | `\r\nOK\r\n`, device restarted  | line              |
//!
//! A returned [`CommandError`] is rendered instead. Basic and Wi-Fi
//! commands live here; link commands are in `tcpip`, TLS commands in `ssl`.
//!
//! ```text
//! line ──> find_command ──> dispatch ──> cmd_* ──> Completion ──> Reply
//!                                           │
//!                                           └──> CommandError::render
//! ```

use super::error::{CommandError, CommandResult};
use super::table::{find_command, CommandId, Form, Matched, Scope};
use crate::device::{Background, Device};
use crate::protocol::types::{format_mac, CERT_PROMPT, MSG_BUSY, SEND_PROMPT};
use crate::protocol::{Cursor, Reply};
use crate::storage::{DnsConfig, NetConfig, UartConfig};
use crate::wifi::{Interface, WifiEvent, WifiMode};
use crate::VERSION;
use bytes::Bytes;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Longest wait for a station disconnect before a new join
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DISCONNECT_POLL: Duration = Duration::from_millis(50);

/// How a handler's response ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Append the OK token
    Ok,
    /// The handler wrote its own terminal form
    Done,
    /// Prompt for `len` raw bytes destined for `link`
    Send { link: usize, len: usize },
    /// Prompt for a PEM certificate
    LoadCertificate,
    /// A background operation will finish the response later
    Pending(Background),
    /// Append OK, then restart the device
    Reset,
}

/// What the line reader should collect next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Line,
    Payload { link: usize, len: usize },
    Pem,
}

/// Result of executing one command line.
#[derive(Debug)]
pub struct Outcome {
    pub reply: Reply,
    pub next: Next,
}

/// Executes AT commands against the device state.
pub struct CommandHandler {
    pub(super) device: Device,
    /// Slot and link serial the outstanding `AT+CIPSEND` payload belongs to
    send_target: Option<(usize, u64)>,
    /// When the handler was created, for the debug log
    start_time: Instant,
}

impl CommandHandler {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            send_target: None,
            start_time: Instant::now(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn is_busy(&self) -> bool {
        self.device.busy.is_some()
    }

    pub fn echo_enabled(&self) -> bool {
        self.device.echo
    }

    /// Runs one complete command line (CRLF included).
    pub async fn execute(&mut self, line: &[u8]) -> Outcome {
        let mut reply = Reply::new();

        if self.device.busy.is_some() {
            trace!("Busy, command refused");
            reply.raw(MSG_BUSY);
            return Outcome {
                reply,
                next: Next::Line,
            };
        }

        let result = match find_command(line) {
            Ok(matched) => {
                debug!(command = ?matched.id, form = ?matched.form, "Dispatching");
                self.dispatch(matched, line, &mut reply).await
            }
            Err(e) => {
                debug!(error = %e, line = %String::from_utf8_lossy(line).trim_end(), "No command");
                Err(CommandError::Syntax)
            }
        };

        let next = match result {
            Ok(Completion::Ok) => {
                reply.ok();
                Next::Line
            }
            Ok(Completion::Done) => Next::Line,
            Ok(Completion::Send { link, len }) => {
                self.send_target = self.device.registry.get(link).map(|l| (link, l.serial()));
                reply.raw(SEND_PROMPT);
                Next::Payload { link, len }
            }
            Ok(Completion::LoadCertificate) => {
                reply.raw(CERT_PROMPT);
                Next::Pem
            }
            Ok(Completion::Pending(op)) => {
                debug!(?op, "Background operation started");
                self.device.busy = Some(op);
                Next::Line
            }
            Ok(Completion::Reset) => {
                reply.ok();
                self.device.reset().await;
                Next::Line
            }
            Err(e) => {
                debug!(error = %e, "Command failed");
                e.render(&mut reply);
                Next::Line
            }
        };

        Outcome { reply, next }
    }

    /// Routes a matched command to its handler.
    async fn dispatch(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        match m.id {
            CommandId::At => Ok(Completion::Ok),
            CommandId::Rst => Ok(Completion::Reset),
            CommandId::Gmr => self.cmd_gmr(out),
            CommandId::Echo => self.cmd_echo(m, line),
            CommandId::Restore => self.cmd_restore(),
            CommandId::Uart(scope) => self.cmd_uart(m, scope, line, out),
            CommandId::SysRam => self.cmd_sysram(out),
            CommandId::CwMode(scope) => self.cmd_cwmode(m, scope, line, out),
            CommandId::CwJap(scope) => self.cmd_cwjap(m, scope, line, out).await,
            CommandId::CwLap => self.cmd_cwlap(),
            CommandId::CwQap => self.cmd_cwqap(),
            CommandId::CwDhcp(scope) => self.cmd_cwdhcp(m, scope, line, out),
            CommandId::CwAutoConn => self.cmd_cwautoconn(m, line, out),
            CommandId::CipStaMac(scope) => self.cmd_cipmac(m, Interface::Station, scope, line, out),
            CommandId::CipApMac(scope) => self.cmd_cipmac(m, Interface::SoftAp, scope, line, out),
            CommandId::CipSta(scope) => self.cmd_cipsta(m, scope, line, out),
            CommandId::CwHostname => self.cmd_cwhostname(m, line, out),
            CommandId::CipDns(scope) => self.cmd_cipdns(m, scope, line, out),

            CommandId::CipStatus => self.cmd_cipstatus(out),
            CommandId::CipStart => self.cmd_cipstart(m, line, out).await,
            CommandId::CipSend => self.cmd_cipsend(m, line),
            CommandId::CipCloseMode => self.cmd_cipclosemode(m, line),
            CommandId::CipClose => self.cmd_cipclose(m, line, out).await,
            CommandId::Cifsr => self.cmd_cifsr(out),
            CommandId::CipMux => self.cmd_cipmux(m, line, out),
            CommandId::CipDinfo => self.cmd_cipdinfo(m, line, out),
            CommandId::CipServer => self.cmd_cipserver(m, line).await,
            CommandId::CipServerMaxConn => self.cmd_cipservermaxconn(m, line, out),
            CommandId::CipSto => self.cmd_cipsto(m, line, out),
            CommandId::CipRecvMode => self.cmd_ciprecvmode(m, line, out),
            CommandId::CipRecvData => self.cmd_ciprecvdata(m, line, out).await,
            CommandId::CipRecvLen => self.cmd_ciprecvlen(m, out).await,
            CommandId::CipSntpCfg => self.cmd_cipsntpcfg(m, line, out),
            CommandId::CipSntpTime => self.cmd_cipsntptime(out),
            CommandId::SntpTime => self.cmd_sntptime(out),
            CommandId::SysCpuFreq => self.cmd_syscpufreq(m, line, out),
            CommandId::RfMode => self.cmd_rfmode(m, line, out),

            CommandId::CipSslSize => self.cmd_cipsslsize(m, line),
            CommandId::CipSslAuth => self.cmd_cipsslauth(m, line, out),
            CommandId::CipSslFp => self.cmd_cipsslfp(m, line, out),
            CommandId::CipSslCertMax => self.cmd_cipsslcertmax(m, line, out),
            CommandId::CipSslCert => self.cmd_cipsslcert(m, line, out),
        }
    }

    /// Collects background completions and link traffic for the host.
    ///
    /// Called between command lines; anything returned is unsolicited output.
    pub async fn poll_events(&mut self) -> Reply {
        let mut out = Reply::new();

        while let Some(event) = self.device.wifi.poll_event() {
            trace!(?event, "Wi-Fi event");
            match event {
                WifiEvent::Connected => {
                    out.line("WIFI CONNECTED");
                }
                WifiEvent::GotIp(ip) => {
                    info!(%ip, "Station got address");
                    out.line("WIFI GOT IP");
                    if self.device.busy == Some(Background::Join) {
                        self.device.busy = None;
                        out.ok();
                    }
                }
                WifiEvent::JoinFailed(code) => {
                    info!(code, "Join failed");
                    if self.device.busy == Some(Background::Join) {
                        self.device.busy = None;
                        write!(out, "+CWJAP:{}\r\n\r\nFAIL\r\n", code);
                    }
                }
                WifiEvent::Disconnected(reason) => {
                    write!(out, "WIFI DISCONNECT ({})\r\n", reason);
                }
                WifiEvent::ScanDone(entries) => {
                    if self.device.busy == Some(Background::Scan) {
                        self.device.busy = None;
                        for e in &entries {
                            write!(
                                out,
                                "+CWLAP:({},{},{},{},{},0,0,0,0,0,0)\n",
                                e.encryption,
                                e.ssid,
                                e.rssi,
                                format_mac(&e.bssid),
                                e.channel
                            );
                        }
                        out.ok();
                    }
                }
            }
        }

        let device = &mut self.device;
        device
            .transfer
            .pump(&mut device.registry, &mut device.servers, &mut out)
            .await;
        out
    }

    /// Finishes an `AT+CIPSEND` once the announced bytes have arrived.
    ///
    /// Fails if the link closed meanwhile, including when another link has
    /// since taken over the same slot.
    pub async fn complete_send(&mut self, link: usize, data: Bytes) -> Reply {
        let mut out = Reply::new();
        let target = self.send_target.take();
        let sent = match self.device.registry.get_mut(link) {
            Some(l) if target != Some((link, l.serial())) => {
                debug!(link, "Link replaced before payload arrived");
                false
            }
            Some(l) => {
                l.pending_send = 0;
                match l.send(&data).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(link, error = %e, "Send failed");
                        false
                    }
                }
            }
            None => false,
        };

        if sent {
            write!(out, "\r\nRecv {} bytes\r\n\r\nSEND OK\r\n", data.len());
        } else {
            out.raw("\r\nSEND FAIL\r\n");
        }
        out
    }

    /// Finishes an `AT+CIPSSLCERT` load. `None` means the PEM block overflowed.
    pub fn complete_pem(&mut self, pem: Option<Bytes>) -> Reply {
        let mut out = Reply::new();
        let der = pem.and_then(|pem| {
            rustls_pemfile::certs(&mut pem.as_ref())
                .find_map(Result::ok)
                .map(|cert| Bytes::copy_from_slice(cert.as_ref()))
        });

        match der.map(|der| self.device.trust.append(der)) {
            Some(Ok(position)) => {
                info!(position, "CA certificate loaded");
                out.ok();
            }
            Some(Err(e)) => {
                debug!(error = %e, "CA certificate rejected");
                out.error();
            }
            None => {
                debug!("No certificate in PEM block");
                out.error();
            }
        }
        out
    }

    // ========================================================================
    // Basic Commands
    // ========================================================================

    fn cmd_gmr(&self, out: &mut Reply) -> CommandResult<Completion> {
        trace!(uptime = ?self.start_time.elapsed(), "Version query");
        out.line("AT version:1.7.0.0 (partial)");
        write!(out, "SDK version:{}\r\n", VERSION);
        write!(out, "Version atmod:{}\r\n", VERSION);
        out.raw("OK\r\n");
        Ok(Completion::Done)
    }

    fn cmd_echo(&mut self, m: Matched, line: &[u8]) -> CommandResult<Completion> {
        let mut cursor = Cursor::new(line, m.args);
        let echo = cursor.read_number_in(0..=1)?;
        cursor.finish()?;
        self.device.echo = echo == 1;
        Ok(Completion::Ok)
    }

    fn cmd_restore(&mut self) -> CommandResult<Completion> {
        info!("Restoring factory settings");
        self.device.settings.factory_reset()?;
        Ok(Completion::Reset)
    }

    fn cmd_uart(&mut self, m: Matched, scope: Scope, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            let uart = match scope {
                Scope::Default => self.device.settings.get().uart,
                _ => self.device.uart,
            };
            write!(
                out,
                "+UART{}:{},{},{},{},0\r\nOK\r\n",
                scope.suffix(),
                uart.baud,
                uart.data_bits,
                uart.stop_bits,
                uart.parity
            );
            return Ok(Completion::Done);
        }

        let mut cursor = Cursor::new(line, m.args);
        let baud = cursor.read_number_in(110..=921_600)?;
        cursor.expect(b',')?;
        let data_bits = cursor.read_number_in(5..=8)? as u8;
        cursor.expect(b',')?;
        let stop_bits = cursor.read_number_in(1..=3)? as u8;
        cursor.expect(b',')?;
        let parity = cursor.read_number_in(0..=2)? as u8;
        cursor.expect(b',')?;
        let flow = cursor.read_number_in(0..=3)?;
        cursor.finish()?;

        if flow != 0 {
            return Err(CommandError::rejected("NOT IMPLEMENTED"));
        }

        let uart = UartConfig {
            baud,
            data_bits,
            stop_bits,
            parity,
            flow_control: 0,
        };
        info!(baud, data_bits, stop_bits, parity, "UART reconfigured");
        self.device.uart = uart;
        if scope.persists() {
            self.device.settings.update(|s| s.uart = uart)?;
        }
        Ok(Completion::Ok)
    }

    // ========================================================================
    // Wi-Fi Commands
    // ========================================================================

    fn cmd_cwmode(&mut self, m: Matched, scope: Scope, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CWMODE{}:{}\r\n", scope.suffix(), self.device.wifi.mode().code());
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let code = cursor.read_number_in(0..=3)?;
        cursor.finish()?;
        let mode = WifiMode::from_code(code).ok_or(CommandError::Syntax)?;

        if !self.device.wifi.set_mode(mode, scope.persists()) {
            return Err(CommandError::Syntax);
        }
        if mode != WifiMode::SoftAp {
            let dns = self.device.settings.get().dns;
            if !dns.dns1.is_unspecified() {
                self.device.wifi.set_dns(dns);
            }
            self.device.apply_dhcp();
        }
        Ok(Completion::Ok)
    }

    async fn cmd_cwjap(&mut self, m: Matched, scope: Scope, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if self.device.wifi.mode() == WifiMode::SoftAp {
            return Err(CommandError::Syntax);
        }

        if m.form == Form::Query {
            match self.device.wifi.station_info() {
                Some(info) if self.device.wifi.is_connected() => {
                    write!(
                        out,
                        "+CWJAP{}:\"{}\",\"{}\",{},{}\r\n",
                        scope.suffix(),
                        info.ssid,
                        format_mac(&info.bssid),
                        info.channel,
                        info.rssi
                    );
                }
                _ => {
                    out.line("No AP");
                }
            }
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let ssid = cursor.read_string(true, false)?;
        cursor.expect(b',')?;
        let password = cursor.read_string(true, true)?;
        let bssid = if cursor.eat(b',') {
            Some(cursor.read_mac()?)
        } else {
            None
        };
        cursor.finish()?;

        let wifi = &mut self.device.wifi;
        if wifi.is_connected() {
            wifi.disconnect();
            let deadline = Instant::now() + DISCONNECT_TIMEOUT;
            while wifi.is_connected() && Instant::now() < deadline {
                tokio::time::sleep(DISCONNECT_POLL).await;
            }
            if wifi.is_connected() {
                return Err(CommandError::Syntax);
            }
        }

        let ssid = String::from_utf8_lossy(&ssid);
        let password = String::from_utf8_lossy(&password);
        info!(ssid = %ssid, "Joining access point");
        wifi.begin_join(&ssid, &password, bssid, scope.persists());
        Ok(Completion::Pending(Background::Join))
    }

    fn cmd_cwlap(&mut self) -> CommandResult<Completion> {
        if self.device.wifi.mode() == WifiMode::SoftAp {
            return Err(CommandError::Syntax);
        }
        self.device.wifi.begin_scan();
        Ok(Completion::Pending(Background::Scan))
    }

    fn cmd_cwqap(&mut self) -> CommandResult<Completion> {
        if self.device.wifi.is_connected() {
            self.device.wifi.disconnect();
        }
        Ok(Completion::Ok)
    }

    fn cmd_cwdhcp(&mut self, m: Matched, scope: Scope, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            let mode = match scope {
                Scope::Default => self.device.settings.get().dhcp_mode,
                _ => self.device.dhcp_mode,
            };
            write!(out, "+CWDHCP{}:{}\r\n", scope.suffix(), mode);
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let target = cursor.read_number_in(0..=2)?;
        cursor.expect(b',')?;
        let enable = cursor.read_number_in(0..=1)? as u8;
        cursor.finish()?;

        // The addressed interface must match the current mode
        let expected = [WifiMode::SoftAp, WifiMode::Station, WifiMode::StationAndAp][target as usize];
        if self.device.wifi.mode() != expected {
            return Err(CommandError::Syntax);
        }

        let mode = 1 | (enable << 1);
        self.device.dhcp_mode = mode;
        self.device.apply_dhcp();
        if scope.persists() {
            self.device.settings.update(|s| s.dhcp_mode = mode)?;
        }
        Ok(Completion::Ok)
    }

    fn cmd_cipsta(&mut self, m: Matched, scope: Scope, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if self.device.wifi.mode() == WifiMode::SoftAp {
            return Err(CommandError::Syntax);
        }

        if m.form == Form::Query {
            let wifi = &self.device.wifi;
            let config = match scope {
                Scope::Default => self.device.settings.get().net,
                _ => NetConfig {
                    ip: wifi.local_ip(),
                    gateway: wifi.gateway(),
                    netmask: wifi.netmask(),
                },
            };
            let config = if !wifi.is_connected() || config.ip.is_unspecified() {
                NetConfig::default()
            } else {
                config
            };
            let sfx = scope.suffix();
            write!(out, "+CIPSTA{}:ip:\"{}\"\r\n", sfx, config.ip);
            write!(out, "+CIPSTA{}:gateway:\"{}\"\r\n", sfx, config.gateway);
            write!(out, "+CIPSTA{}:netmask:\"{}\"\r\n", sfx, config.netmask);
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let ip = cursor.read_ipv4()?;
        let config = if cursor.eat(b',') {
            let gateway = cursor.read_ipv4()?;
            cursor.expect(b',')?;
            let netmask = cursor.read_ipv4()?;
            cursor.finish()?;
            NetConfig { ip, gateway, netmask }
        } else {
            cursor.finish()?;
            derive_net(ip)
        };

        if scope.persists() {
            self.device.settings.update(|s| {
                s.net = config;
                s.dhcp_mode = 1;
            })?;
        }
        self.device.static_net = config;
        self.device.dhcp_mode = 1;
        self.device.apply_dhcp();
        Ok(Completion::Ok)
    }

    fn cmd_cwhostname(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CWHOSTNAME:{}\r\n", self.device.wifi.hostname());
            return Ok(Completion::Ok);
        }
        if self.device.wifi.mode() == WifiMode::SoftAp {
            return Err(CommandError::Syntax);
        }

        let mut cursor = Cursor::new(line, m.args);
        let name = cursor.read_string(false, false)?;
        cursor.finish()?;
        let name = String::from_utf8_lossy(&name);
        if self.device.wifi.set_hostname(&name) && self.device.wifi.hostname() == name {
            Ok(Completion::Ok)
        } else {
            Err(CommandError::Syntax)
        }
    }

    fn cmd_cipdns(&mut self, m: Matched, scope: Scope, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            let dns = match scope {
                Scope::Default => self.device.settings.get().dns,
                _ => self.device.wifi.dns(),
            };
            if !dns.dns1.is_unspecified() {
                write!(out, "+CIPDNS{}:{}\r\n", scope.suffix(), dns.dns1);
                if !dns.dns2.is_unspecified() && dns.dns1 != dns.dns2 {
                    write!(out, "+CIPDNS{}:{}\r\n", scope.suffix(), dns.dns2);
                }
            }
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let enable = cursor.read_number_in(0..=1)?;
        let mut dns = DnsConfig::default();
        if enable == 0 {
            cursor.finish()?;
        } else {
            cursor.expect(b',')?;
            dns.dns1 = cursor.read_ipv4()?;
            if dns.dns1.is_unspecified() {
                return Err(CommandError::rejected("IP1 invalid"));
            }
            if !cursor.at_end() {
                cursor.expect(b',')?;
                dns.dns2 = cursor.read_ipv4()?;
                cursor.finish()?;
                if dns.dns2.is_unspecified() {
                    return Err(CommandError::rejected("IP2 invalid"));
                }
            }
        }

        if scope.persists() {
            self.device.settings.update(|s| s.dns = dns)?;
        }
        self.device.wifi.set_dns(dns);
        Ok(Completion::Ok)
    }

    fn cmd_cwautoconn(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+CWAUTOCONN:{}\r\n", u8::from(self.device.settings.get().autoconnect));
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let enable = cursor.read_number_in(0..=1)? == 1;
        cursor.finish()?;
        self.device.settings.update(|s| s.autoconnect = enable)?;
        info!(enable, "Station autoconnect");
        Ok(Completion::Ok)
    }

    /// `AT+CIPSTAMAC` / `AT+CIPAPMAC`: `"xx:xx:xx:xx:xx:xx"`.
    fn cmd_cipmac(
        &mut self,
        m: Matched,
        iface: Interface,
        scope: Scope,
        line: &[u8],
        out: &mut Reply,
    ) -> CommandResult<Completion> {
        let name = match iface {
            Interface::Station => "STA",
            Interface::SoftAp => "AP",
        };
        if m.form == Form::Query {
            let mac = self.device.wifi.mac_address(iface);
            write!(out, "+CIP{}MAC{}:\"{}\"\r\n", name, scope.suffix(), format_mac(&mac));
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let mac = cursor.read_mac()?;
        cursor.finish()?;
        // Multicast and duplicate addresses are refused by the driver
        if !self.device.wifi.set_mac_address(iface, mac, scope.persists()) {
            return Err(CommandError::Syntax);
        }
        info!(interface = name, mac = %format_mac(&mac), "MAC address changed");
        Ok(Completion::Ok)
    }
}

/// Gateway `a.b.c.1` and a /24 mask for an address given alone.
fn derive_net(ip: Ipv4Addr) -> NetConfig {
    if ip.is_unspecified() {
        return NetConfig::default();
    }
    let [a, b, c, _] = ip.octets();
    NetConfig {
        ip,
        gateway: Ipv4Addr::new(a, b, c, 1),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
    }
}
