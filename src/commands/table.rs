//! Command Descriptor Table and Matcher
//!
//! The table is the single source of truth for which command texts exist and
//! what line shape each accepts. Matching is a linear scan for the first
//! entry whose text prefixes the line after `AT`; the entry's mode then
//! decides whether the rest of the line is acceptable.
//!
//! ```text
//! AT+CIPMUX=1\r\n
//! ──┬───────┬────
//!   │       └─ marker '=' (QueryOrSet): arguments start after it
//!   └─ "+CIPMUX" matched
//! ```
//!
//! Order matters where one text prefixes another: `+CIPSERVERMAXCONN`
//! is reachable past `+CIPSERVER` only because NoChecking refuses an
//! alphabetic follower, `+CIPSTAMAC` sits before `+CIPSTA`, and `+CWLAP` is
//! Exact so `+CWLAPOPT` lines fail. Query-only commands carry the `?` in
//! their text and match exactly.

use thiserror::Error;

/// Every line begins with these two bytes.
pub const PREFIX: &[u8] = b"AT";

/// How the bytes after a matched command text are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The handler parses the suffix; the next byte must not be a letter
    NoChecking,
    /// Nothing may follow the text except CRLF
    ExactMatch,
    /// `?` + CRLF, or `=` followed by arguments
    QueryOrSet,
}

/// Which flavour of a configuration command was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `AT+CWMODE`: applies now and persists (legacy form)
    Legacy,
    /// `AT+CWMODE_CUR`: applies now only
    Current,
    /// `AT+CWMODE_DEF`: applies now and persists
    Default,
}

impl Scope {
    /// The suffix echoed in query replies.
    pub fn suffix(self) -> &'static str {
        match self {
            Scope::Legacy => "",
            Scope::Current => "_CUR",
            Scope::Default => "_DEF",
        }
    }

    /// Whether a change is written to persistent settings.
    pub fn persists(self) -> bool {
        !matches!(self, Scope::Current)
    }
}

/// Identifiers of the supported commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    At,
    Rst,
    Gmr,
    Echo,
    Restore,
    Uart(Scope),
    SysRam,
    CwMode(Scope),
    CwJap(Scope),
    CwLap,
    CwQap,
    CwDhcp(Scope),
    CwAutoConn,
    CipStaMac(Scope),
    CipApMac(Scope),
    CipSta(Scope),
    CwHostname,
    CipStatus,
    CipStart,
    CipSslSize,
    CipSend,
    CipCloseMode,
    CipClose,
    Cifsr,
    CipMux,
    CipDinfo,
    CipServer,
    CipServerMaxConn,
    CipSto,
    CipRecvMode,
    CipRecvData,
    CipRecvLen,
    CipSntpCfg,
    CipSntpTime,
    CipDns(Scope),
    SysCpuFreq,
    RfMode,
    CipSslAuth,
    CipSslFp,
    CipSslCertMax,
    CipSslCert,
    SntpTime,
}

/// One row of the command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    pub text: &'static str,
    pub mode: MatchMode,
    pub id: CommandId,
}

const fn cmd(text: &'static str, mode: MatchMode, id: CommandId) -> CommandDescriptor {
    CommandDescriptor { text, mode, id }
}

use CommandId::*;
use MatchMode::*;

/// The command table, in scan order.
pub static COMMANDS: &[CommandDescriptor] = &[
    cmd("+RST", ExactMatch, Rst),
    cmd("+GMR", ExactMatch, Gmr),
    cmd("E", NoChecking, Echo),
    cmd("+RESTORE", ExactMatch, Restore),
    cmd("+UART", QueryOrSet, Uart(Scope::Legacy)),
    cmd("+UART_CUR", QueryOrSet, Uart(Scope::Current)),
    cmd("+UART_DEF", QueryOrSet, Uart(Scope::Default)),
    cmd("+SYSRAM?", ExactMatch, SysRam),
    cmd("+CWMODE", QueryOrSet, CwMode(Scope::Legacy)),
    cmd("+CWMODE_CUR", QueryOrSet, CwMode(Scope::Current)),
    cmd("+CWMODE_DEF", QueryOrSet, CwMode(Scope::Default)),
    cmd("+CWJAP", QueryOrSet, CwJap(Scope::Legacy)),
    cmd("+CWJAP_CUR", QueryOrSet, CwJap(Scope::Current)),
    cmd("+CWJAP_DEF", QueryOrSet, CwJap(Scope::Default)),
    cmd("+CWLAP", ExactMatch, CwLap),
    cmd("+CWQAP", ExactMatch, CwQap),
    cmd("+CWDHCP", QueryOrSet, CwDhcp(Scope::Legacy)),
    cmd("+CWDHCP_CUR", QueryOrSet, CwDhcp(Scope::Current)),
    cmd("+CWDHCP_DEF", QueryOrSet, CwDhcp(Scope::Default)),
    cmd("+CWAUTOCONN", QueryOrSet, CwAutoConn),
    cmd("+CIPSTAMAC", QueryOrSet, CipStaMac(Scope::Legacy)),
    cmd("+CIPSTAMAC_CUR", QueryOrSet, CipStaMac(Scope::Current)),
    cmd("+CIPSTAMAC_DEF", QueryOrSet, CipStaMac(Scope::Default)),
    cmd("+CIPAPMAC", QueryOrSet, CipApMac(Scope::Legacy)),
    cmd("+CIPAPMAC_CUR", QueryOrSet, CipApMac(Scope::Current)),
    cmd("+CIPAPMAC_DEF", QueryOrSet, CipApMac(Scope::Default)),
    cmd("+CIPSTA", QueryOrSet, CipSta(Scope::Legacy)),
    cmd("+CIPSTA_CUR", QueryOrSet, CipSta(Scope::Current)),
    cmd("+CIPSTA_DEF", QueryOrSet, CipSta(Scope::Default)),
    cmd("+CWHOSTNAME", QueryOrSet, CwHostname),
    cmd("+CIPSTATUS", ExactMatch, CipStatus),
    cmd("+CIPSTART", NoChecking, CipStart),
    cmd("+CIPSSLSIZE", QueryOrSet, CipSslSize),
    cmd("+CIPSEND", NoChecking, CipSend),
    cmd("+CIPCLOSEMODE", NoChecking, CipCloseMode),
    cmd("+CIPCLOSE", NoChecking, CipClose),
    cmd("+CIFSR", ExactMatch, Cifsr),
    cmd("+CIPMUX", QueryOrSet, CipMux),
    cmd("+CIPDINFO", QueryOrSet, CipDinfo),
    cmd("+CIPSERVER", NoChecking, CipServer),
    cmd("+CIPSERVERMAXCONN", QueryOrSet, CipServerMaxConn),
    cmd("+CIPSTO", QueryOrSet, CipSto),
    cmd("+CIPRECVMODE", QueryOrSet, CipRecvMode),
    cmd("+CIPRECVDATA", QueryOrSet, CipRecvData),
    cmd("+CIPRECVLEN", QueryOrSet, CipRecvLen),
    cmd("+CIPSNTPCFG", QueryOrSet, CipSntpCfg),
    cmd("+CIPSNTPTIME?", ExactMatch, CipSntpTime),
    cmd("+CIPDNS", QueryOrSet, CipDns(Scope::Legacy)),
    cmd("+CIPDNS_CUR", QueryOrSet, CipDns(Scope::Current)),
    cmd("+CIPDNS_DEF", QueryOrSet, CipDns(Scope::Default)),
    cmd("+SYSCPUFREQ", QueryOrSet, SysCpuFreq),
    cmd("+RFMODE", QueryOrSet, RfMode),
    cmd("+CIPSSLAUTH", QueryOrSet, CipSslAuth),
    cmd("+CIPSSLFP", QueryOrSet, CipSslFp),
    cmd("+CIPSSLCERTMAX", QueryOrSet, CipSslCertMax),
    cmd("+CIPSSLCERT", NoChecking, CipSslCert),
    cmd("+SNTPTIME?", ExactMatch, SntpTime),
];

/// The shape of a matched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// Exact text, no arguments (also the bare `AT`)
    Bare,
    /// `?` followed by CRLF
    Query,
    /// `=` followed by arguments
    Set,
    /// Free-form suffix parsed by the handler
    Free,
}

/// Result of a successful match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matched {
    pub id: CommandId,
    pub form: Form,
    /// Offset of the first argument byte (after the marker, if any)
    pub args: usize,
}

/// Why a line did not resolve to a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Missing prefix, missing terminator or too short
    #[error("malformed command line")]
    Malformed,

    /// No table entry prefixes the line
    #[error("unknown command")]
    Unknown,

    /// An entry matched but the line shape is wrong for its mode
    #[error("syntax error in {0:?}")]
    Syntax(CommandId),
}

/// Resolves a complete command line (CRLF included) to a table entry.
pub fn find_command(line: &[u8]) -> Result<Matched, MatchError> {
    if line.len() < 4 || !line.starts_with(PREFIX) || !line.ends_with(b"\r\n") {
        return Err(MatchError::Malformed);
    }
    if line.len() == 4 {
        return Ok(Matched {
            id: CommandId::At,
            form: Form::Bare,
            args: PREFIX.len(),
        });
    }

    let body = &line[PREFIX.len()..];
    for desc in COMMANDS {
        let text = desc.text.as_bytes();
        if !body.starts_with(text) {
            continue;
        }
        let after = PREFIX.len() + text.len();

        match desc.mode {
            MatchMode::ExactMatch => {
                if line.len() != after + 2 {
                    return Err(MatchError::Syntax(desc.id));
                }
                return Ok(Matched {
                    id: desc.id,
                    form: Form::Bare,
                    args: after,
                });
            }
            MatchMode::QueryOrSet => match line[after] {
                b'?' => {
                    if line.len() != after + 3 {
                        return Err(MatchError::Syntax(desc.id));
                    }
                    return Ok(Matched {
                        id: desc.id,
                        form: Form::Query,
                        args: after + 1,
                    });
                }
                b'=' => {
                    return Ok(Matched {
                        id: desc.id,
                        form: Form::Set,
                        args: after + 1,
                    });
                }
                _ => continue,
            },
            MatchMode::NoChecking => {
                if line[after].is_ascii_alphabetic() {
                    continue;
                }
                return Ok(Matched {
                    id: desc.id,
                    form: Form::Free,
                    args: after,
                });
            }
        }
    }

    Err(MatchError::Unknown)
}
