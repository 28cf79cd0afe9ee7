//! Persistent Settings
//!
//! A small fixed-layout record survives resets: UART framing, DHCP mode,
//! static station address, DNS servers and the CA bundle cap. The record is
//! guarded by a CRC-32 so that a blank or corrupted store falls back to the
//! factory defaults instead of loading garbage.
//!
//! ## Record Layout (little-endian)
//!
//! ```text
//! offset  size  field
//!  0      4     UART baud rate
//!  4      1     UART data bits
//!  5      1     UART stop bits
//!  6      1     UART parity
//!  7      1     UART flow control
//!  8      1     DHCP mode
//!  9      1     station autoconnect
//! 10      2     reserved (zero)
//! 12      4     station IP
//! 16      4     station gateway
//! 20      4     station netmask
//! 24      4     DNS 1
//! 28      4     DNS 2
//! 32      4     maximum certificates
//! 36      4     CRC-32 of bytes 0..36
//! ```
//!
//! The store writes only when the encoded record actually changes.

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Encoded size of the record, checksum included
pub const RECORD_LEN: usize = 40;

const PAYLOAD_LEN: usize = RECORD_LEN - 4;

/// Settings store errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("settings record has {0} bytes, expected {RECORD_LEN}")]
    Length(usize),

    #[error("settings checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    Checksum { stored: u32, computed: u32 },
}

/// UART framing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: u8,
    pub flow_control: u8,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: 0,
            flow_control: 0,
        }
    }
}

/// Static station address configuration. All zero means "not configured".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetConfig {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// DNS servers. Zero entries are unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsConfig {
    pub dns1: Ipv4Addr,
    pub dns2: Ipv4Addr,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            dns1: Ipv4Addr::UNSPECIFIED,
            dns2: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// The persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub uart: UartConfig,
    /// Bit 0: soft AP DHCP server, bit 1: station DHCP client
    pub dhcp_mode: u8,
    /// Join the access point at boot (`AT+CWAUTOCONN`)
    pub autoconnect: bool,
    pub net: NetConfig,
    pub dns: DnsConfig,
    pub max_certificates: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uart: UartConfig::default(),
            dhcp_mode: 3,
            autoconnect: true,
            net: NetConfig::default(),
            dns: DnsConfig::default(),
            max_certificates: 5,
        }
    }
}

impl Settings {
    /// Encodes the record with its checksum trailer.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&self.uart.baud.to_le_bytes());
        out[4] = self.uart.data_bits;
        out[5] = self.uart.stop_bits;
        out[6] = self.uart.parity;
        out[7] = self.uart.flow_control;
        out[8] = self.dhcp_mode;
        out[9] = u8::from(self.autoconnect);
        out[12..16].copy_from_slice(&self.net.ip.octets());
        out[16..20].copy_from_slice(&self.net.gateway.octets());
        out[20..24].copy_from_slice(&self.net.netmask.octets());
        out[24..28].copy_from_slice(&self.dns.dns1.octets());
        out[28..32].copy_from_slice(&self.dns.dns2.octets());
        out[32..36].copy_from_slice(&self.max_certificates.to_le_bytes());

        let crc = crc32_ieee(&out[..PAYLOAD_LEN]);
        out[PAYLOAD_LEN..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decodes a record, verifying length and checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self, SettingsError> {
        if bytes.len() != RECORD_LEN {
            return Err(SettingsError::Length(bytes.len()));
        }
        let stored = u32::from_le_bytes(le4(&bytes[PAYLOAD_LEN..]));
        let computed = crc32_ieee(&bytes[..PAYLOAD_LEN]);
        if stored != computed {
            return Err(SettingsError::Checksum { stored, computed });
        }

        let ip = |at: usize| Ipv4Addr::from(le4(&bytes[at..at + 4]));
        Ok(Self {
            uart: UartConfig {
                baud: u32::from_le_bytes(le4(&bytes[0..4])),
                data_bits: bytes[4],
                stop_bits: bytes[5],
                parity: bytes[6],
                flow_control: bytes[7],
            },
            dhcp_mode: bytes[8],
            autoconnect: bytes[9] != 0,
            net: NetConfig {
                ip: ip(12),
                gateway: ip(16),
                netmask: ip(20),
            },
            dns: DnsConfig {
                dns1: ip(24),
                dns2: ip(28),
            },
            max_certificates: u32::from_le_bytes(le4(&bytes[32..36])),
        })
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[..4]);
    out
}

/// CRC-32/ISO-HDLC (reflected, polynomial 0xEDB88320).
pub fn crc32_ieee(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= u32::from(b);
        for _ in 0..8 {
            let mask = 0u32.wrapping_sub(crc & 1);
            crc = (crc >> 1) ^ (0xEDB8_8320u32 & mask);
        }
    }
    !crc
}

/// Owns the current settings and their backing file.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: Settings,
}

impl SettingsStore {
    /// Opens the store at `path`, falling back to defaults when the file is
    /// missing or fails its checksum.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let current = match fs::read(&path) {
            Ok(bytes) => match Settings::decode(&bytes) {
                Ok(settings) => {
                    debug!(path = %path.display(), "Loaded settings");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Settings invalid, using defaults");
                    Settings::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read settings, using defaults");
                Settings::default()
            }
        };

        Self {
            path: Some(path),
            current,
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Settings::default(),
        }
    }

    pub fn get(&self) -> &Settings {
        &self.current
    }

    /// Applies `change` and persists the result if it differs.
    ///
    /// Returns whether anything was written.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) -> Result<bool, SettingsError> {
        let mut next = self.current;
        change(&mut next);
        if next.encode() == self.current.encode() {
            return Ok(false);
        }
        self.current = next;
        self.persist()?;
        Ok(true)
    }

    /// Restores factory defaults and persists them.
    pub fn factory_reset(&mut self) -> Result<(), SettingsError> {
        self.current = Settings::default();
        self.persist()
    }

    /// Re-reads the backing file (used on device reset).
    pub fn reload(&mut self) {
        if let Some(path) = self.path.clone() {
            *self = Self::open(path);
        }
    }

    fn persist(&self) -> Result<(), SettingsError> {
        if let Some(path) = &self.path {
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, self.current.encode())?;
            fs::rename(&tmp, path)?;
            debug!(path = %path.display(), "Settings written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.uart.baud, 115_200);
        assert_eq!(s.uart.data_bits, 8);
        assert_eq!(s.dhcp_mode, 3);
        assert!(s.autoconnect);
        assert_eq!(s.net.ip, Ipv4Addr::UNSPECIFIED);
        assert_eq!(s.max_certificates, 5);
    }

    #[test]
    fn test_encode_decode() {
        let s = Settings {
            dhcp_mode: 1,
            autoconnect: false,
            net: NetConfig {
                ip: Ipv4Addr::new(192, 168, 1, 50),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
            },
            max_certificates: 8,
            ..Settings::default()
        };
        assert_eq!(Settings::decode(&s.encode()).unwrap(), s);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut bytes = Settings::default().encode();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Settings::decode(&bytes),
            Err(SettingsError::Checksum { .. })
        ));
        assert!(matches!(
            Settings::decode(&bytes[..10]),
            Err(SettingsError::Length(10))
        ));
    }

    #[test]
    fn test_store_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.bin");

        let mut store = SettingsStore::open(&path);
        assert_eq!(store.get(), &Settings::default());
        assert!(!path.exists());

        assert!(store.update(|s| s.max_certificates = 9).unwrap());
        assert!(path.exists());

        let reopened = SettingsStore::open(&path);
        assert_eq!(reopened.get().max_certificates, 9);
    }

    #[test]
    fn test_store_skips_unchanged_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.bin");

        let mut store = SettingsStore::open(&path);
        assert!(!store.update(|s| s.dhcp_mode = 3).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_store_resets_on_bad_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.bin");
        let mut bytes = Settings {
            max_certificates: 2,
            ..Settings::default()
        }
        .encode();
        bytes[33] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        let store = SettingsStore::open(&path);
        assert_eq!(store.get(), &Settings::default());
    }

    #[test]
    fn test_factory_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.bin");

        let mut store = SettingsStore::open(&path);
        store.update(|s| s.uart.baud = 9600).unwrap();
        store.factory_reset().unwrap();
        assert_eq!(SettingsStore::open(&path).get(), &Settings::default());
    }

    #[test]
    fn test_in_memory_store() {
        let mut store = SettingsStore::in_memory();
        assert!(store.update(|s| s.dns.dns1 = Ipv4Addr::new(8, 8, 8, 8)).unwrap());
        assert_eq!(store.get().dns.dns1, Ipv4Addr::new(8, 8, 8, 8));
        store.reload();
        assert_eq!(store.get().dns.dns1, Ipv4Addr::new(8, 8, 8, 8));
    }
}
