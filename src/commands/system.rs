//! System commands: free memory, CPU clock, radio PHY mode and the SNTP
//! client clock.

use super::error::{CommandError, CommandResult};
use super::handler::{CommandHandler, Completion};
use super::table::{Form, Matched};
use crate::device::SntpConfig;
use crate::protocol::{Cursor, Reply};
use crate::wifi::PhyMode;
use chrono::{DateTime, Utc};
use tracing::info;

/// A clock below this many seconds has never been synchronised.
const SYNCED_AFTER: i64 = 16 * 3600;

/// Largest accepted timezone offset, in hours either side of UTC
const MAX_TIMEZONE: u32 = 12;

impl CommandHandler {
    pub(super) fn cmd_sysram(&self, out: &mut Reply) -> CommandResult<Completion> {
        write!(out, "+SYSRAM:{}\r\nOK\r\n", self.device.wifi.free_heap());
        Ok(Completion::Done)
    }

    /// `AT+SYSCPUFREQ?` / `AT+SYSCPUFREQ=<80|160>`
    pub(super) fn cmd_syscpufreq(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+SYSCPUFREQ:{}\r\n", self.device.wifi.cpu_freq());
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let mhz = cursor.read_number()?;
        cursor.finish()?;
        if !self.device.wifi.set_cpu_freq(mhz) {
            return Err(CommandError::Syntax);
        }
        info!(mhz, "CPU frequency");
        Ok(Completion::Ok)
    }

    /// `AT+RFMODE?` / `AT+RFMODE=<1..3>` (802.11 b/g/n)
    pub(super) fn cmd_rfmode(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            write!(out, "+RFMODE:{}\r\nOK\r\n", self.device.wifi.phy_mode().code());
            return Ok(Completion::Done);
        }

        let mut cursor = Cursor::new(line, m.args);
        let code = cursor.read_number_in(1..=3)?;
        cursor.finish()?;
        let mode = PhyMode::from_code(code).ok_or(CommandError::Syntax)?;
        if !self.device.wifi.set_phy_mode(mode) {
            return Err(CommandError::Syntax);
        }
        info!(?mode, "PHY mode");
        Ok(Completion::Ok)
    }

    /// `AT+CIPSNTPCFG=<enable>[,<timezone>[,"<server>"...]]`, up to three servers.
    pub(super) fn cmd_cipsntpcfg(&mut self, m: Matched, line: &[u8], out: &mut Reply) -> CommandResult<Completion> {
        if m.form == Form::Query {
            let sntp = &self.device.sntp;
            write!(out, "+CIPSNTPCFG:{}", u8::from(sntp.enabled));
            if sntp.enabled {
                write!(out, ",{}", sntp.timezone);
                for server in sntp.servers.iter().filter(|s| !s.is_empty()) {
                    write!(out, ",\"{}\"", server);
                }
            }
            out.line("");
            return Ok(Completion::Ok);
        }

        let mut cursor = Cursor::new(line, m.args);
        let enabled = cursor.read_number_in(0..=1)? == 1;
        if !enabled {
            cursor.finish()?;
            self.device.sntp.enabled = false;
            info!("SNTP disabled");
            return Ok(Completion::Ok);
        }

        cursor.expect(b',')?;
        let negative = cursor.eat(b'-');
        let hours = cursor.read_number_in(0..=MAX_TIMEZONE)? as i32;
        let mut servers: [String; 3] = Default::default();
        for server in servers.iter_mut() {
            if !cursor.eat(b',') {
                break;
            }
            *server = String::from_utf8_lossy(&cursor.read_string(true, true)?).into_owned();
        }
        cursor.finish()?;

        let timezone = if negative { -hours } else { hours };
        info!(timezone, servers = ?servers, "SNTP enabled");
        self.device.sntp = SntpConfig {
            enabled: true,
            timezone,
            servers,
        };
        Ok(Completion::Ok)
    }

    /// Local time in asctime form; the epoch while SNTP is off or unsynced.
    pub(super) fn cmd_cipsntptime(&self, out: &mut Reply) -> CommandResult<Completion> {
        let local = local_seconds(&self.device.sntp, unix_now()).unwrap_or(0);
        write!(out, "+CIPSNTPTIME:{}\nOK\r\n", asctime(local));
        Ok(Completion::Done)
    }

    /// Local time as seconds plus `YYYY-MM-DD HH:MM:SS`.
    pub(super) fn cmd_sntptime(&self, out: &mut Reply) -> CommandResult<Completion> {
        let local = local_seconds(&self.device.sntp, unix_now())
            .ok_or_else(|| CommandError::rejected("+SNTPTIME:Enable SNTP first (AT+CIPSNTPCFG)"))?;
        write!(out, "+SNTPTIME:{},{}\r\nOK\r\n", local, to_datetime(local).format("%Y-%m-%d %H:%M:%S"));
        Ok(Completion::Done)
    }
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// `now` shifted into the configured timezone, or `None` before a usable sync.
fn local_seconds(sntp: &SntpConfig, now: i64) -> Option<i64> {
    (sntp.enabled && now > SYNCED_AFTER).then(|| now + i64::from(sntp.timezone) * 3600)
}

fn to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// C `asctime` layout without the trailing newline.
fn asctime(secs: i64) -> String {
    to_datetime(secs).format("%a %b %e %H:%M:%S %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handler::tests::{create_handler, run};
    use crate::wifi::SIM_FREE_HEAP;

    // 2023-11-14 22:13:20 UTC, a Tuesday
    const SAMPLE: i64 = 1_700_000_000;

    fn enabled(timezone: i32) -> SntpConfig {
        SntpConfig {
            enabled: true,
            timezone,
            ..Default::default()
        }
    }

    #[test]
    fn test_asctime() {
        assert_eq!(asctime(0), "Thu Jan  1 00:00:00 1970");
        assert_eq!(asctime(SAMPLE), "Tue Nov 14 22:13:20 2023");
    }

    #[test]
    fn test_local_seconds() {
        assert_eq!(local_seconds(&SntpConfig::default(), SAMPLE), None);
        assert_eq!(local_seconds(&enabled(0), 3600), None);
        assert_eq!(local_seconds(&enabled(1), SAMPLE), Some(SAMPLE + 3600));
        assert_eq!(local_seconds(&enabled(-5), SAMPLE), Some(SAMPLE - 5 * 3600));
        assert_eq!(asctime(SAMPLE + 3600), "Tue Nov 14 23:13:20 2023");
    }

    #[tokio::test]
    async fn test_sysram() {
        let mut h = create_handler();
        assert_eq!(
            run(&mut h, "AT+SYSRAM?").await,
            format!("+SYSRAM:{}\r\nOK\r\n", SIM_FREE_HEAP)
        );
        assert_eq!(run(&mut h, "AT+SYSRAM").await, "\r\nERROR\r\n");
    }

    #[tokio::test]
    async fn test_syscpufreq() {
        let mut h = create_handler();
        assert_eq!(run(&mut h, "AT+SYSCPUFREQ?").await, "+SYSCPUFREQ:80\r\n\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+SYSCPUFREQ=160").await, "\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+SYSCPUFREQ?").await, "+SYSCPUFREQ:160\r\n\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+SYSCPUFREQ=100").await, "\r\nERROR\r\n");
        assert_eq!(run(&mut h, "AT+SYSCPUFREQ?").await, "+SYSCPUFREQ:160\r\n\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_rfmode() {
        let mut h = create_handler();
        assert_eq!(run(&mut h, "AT+RFMODE?").await, "+RFMODE:3\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+RFMODE=1").await, "\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+RFMODE?").await, "+RFMODE:1\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+RFMODE=0").await, "\r\nERROR\r\n");
        assert_eq!(run(&mut h, "AT+RFMODE=4").await, "\r\nERROR\r\n");
    }

    #[tokio::test]
    async fn test_cipsntpcfg() {
        let mut h = create_handler();
        assert_eq!(run(&mut h, "AT+CIPSNTPCFG?").await, "+CIPSNTPCFG:0\r\n\r\nOK\r\n");

        assert_eq!(
            run(&mut h, "AT+CIPSNTPCFG=1,-3,\"pool.ntp.org\",\"time.nist.gov\"").await,
            "\r\nOK\r\n"
        );
        assert_eq!(
            run(&mut h, "AT+CIPSNTPCFG?").await,
            "+CIPSNTPCFG:1,-3,\"pool.ntp.org\",\"time.nist.gov\"\r\n\r\nOK\r\n"
        );

        assert_eq!(run(&mut h, "AT+CIPSNTPCFG=1,13").await, "\r\nERROR\r\n");
        assert_eq!(run(&mut h, "AT+CIPSNTPCFG=1").await, "\r\nERROR\r\n");
        assert_eq!(run(&mut h, "AT+CIPSNTPCFG=2").await, "\r\nERROR\r\n");
        assert_eq!(
            run(&mut h, "AT+CIPSNTPCFG=1,1,\"a\",\"b\",\"c\",\"d\"").await,
            "\r\nERROR\r\n"
        );

        assert_eq!(run(&mut h, "AT+CIPSNTPCFG=1,8").await, "\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+CIPSNTPCFG?").await, "+CIPSNTPCFG:1,8\r\n\r\nOK\r\n");

        assert_eq!(run(&mut h, "AT+CIPSNTPCFG=0").await, "\r\nOK\r\n");
        assert_eq!(run(&mut h, "AT+CIPSNTPCFG?").await, "+CIPSNTPCFG:0\r\n\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_sntp_time_queries() {
        let mut h = create_handler();
        assert_eq!(
            run(&mut h, "AT+CIPSNTPTIME?").await,
            "+CIPSNTPTIME:Thu Jan  1 00:00:00 1970\nOK\r\n"
        );
        assert_eq!(
            run(&mut h, "AT+SNTPTIME?").await,
            "+SNTPTIME:Enable SNTP first (AT+CIPSNTPCFG)\r\n\r\nERROR\r\n"
        );

        run(&mut h, "AT+CIPSNTPCFG=1,0").await;
        let reply = run(&mut h, "AT+CIPSNTPTIME?").await;
        assert!(reply.starts_with("+CIPSNTPTIME:"));
        assert!(reply.ends_with("\nOK\r\n"));
        assert!(!reply.contains("1970"));

        let reply = run(&mut h, "AT+SNTPTIME?").await;
        let (stamp, rest) = reply
            .strip_prefix("+SNTPTIME:")
            .and_then(|r| r.split_once(','))
            .unwrap();
        let secs: i64 = stamp.parse().unwrap();
        assert!((secs - unix_now()).abs() < 5);
        assert_eq!(rest, format!("{}\r\nOK\r\n", to_datetime(secs).format("%Y-%m-%d %H:%M:%S")));
    }

    #[tokio::test]
    async fn test_reset_clears_sntp() {
        let mut h = create_handler();
        run(&mut h, "AT+CIPSNTPCFG=1,2,\"pool.ntp.org\"").await;
        run(&mut h, "AT+RST").await;
        assert_eq!(run(&mut h, "AT+CIPSNTPCFG?").await, "+CIPSNTPCFG:0\r\n\r\nOK\r\n");
    }
}
