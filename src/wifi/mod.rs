//! Wi-Fi Driver Interface
//!
//! The radio itself is outside this crate. Command handlers talk to it
//! through [`WifiDriver`] using already validated values, and background
//! completions (join result, scan result, link loss) come back as
//! [`WifiEvent`]s that the session loop polls and turns into host output.
//!
//! ```text
//!   AT+CWJAP="net","pw"           poll_event()
//!   ──────────────────> begin_join ─ ─ ─ ─ ─ ─ ─ ─ > WifiEvent::Connected
//!   busy flag set                                   busy flag cleared
//! ```
//!
//! [`SimulatedWifi`] is the in-process implementation used by the binary
//! and the tests.

pub mod simulated;

pub use simulated::{SimNetwork, SimulatedWifi, SIM_FREE_HEAP};

use crate::storage::{DnsConfig, NetConfig};
use std::net::Ipv4Addr;

/// Radio operating mode, numbered as in `AT+CWMODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    Off = 0,
    Station = 1,
    SoftAp = 2,
    StationAndAp = 3,
}

impl WifiMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(WifiMode::Off),
            1 => Some(WifiMode::Station),
            2 => Some(WifiMode::SoftAp),
            3 => Some(WifiMode::StationAndAp),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn has_station(self) -> bool {
        matches!(self, WifiMode::Station | WifiMode::StationAndAp)
    }

    pub fn has_ap(self) -> bool {
        matches!(self, WifiMode::SoftAp | WifiMode::StationAndAp)
    }
}

/// Network interface addressed by the MAC commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Station,
    SoftAp,
}

/// 802.11 PHY mode, numbered as in `AT+RFMODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyMode {
    B = 1,
    G = 2,
    N = 3,
}

impl PhyMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(PhyMode::B),
            2 => Some(PhyMode::G),
            3 => Some(PhyMode::N),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One access point found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub encryption: u8,
    pub ssid: String,
    pub rssi: i32,
    pub bssid: [u8; 6],
    pub channel: u8,
}

/// Details of the current station association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationInfo {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i32,
}

/// Background completions and state changes reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// Associated with the access point
    Connected,
    /// Address assigned; the join is complete
    GotIp(Ipv4Addr),
    /// Join attempt failed with an `AT+CWJAP` error code
    JoinFailed(u8),
    /// Association lost (reason code)
    Disconnected(u8),
    /// Scan finished
    ScanDone(Vec<ScanEntry>),
}

/// Operations the command handlers need from the radio and its chip.
pub trait WifiDriver: Send {
    fn mode(&self) -> WifiMode;

    /// Changes the mode; `persist` marks it as the boot default.
    fn set_mode(&mut self, mode: WifiMode, persist: bool) -> bool;

    fn is_connected(&self) -> bool;

    /// Starts joining an access point. Completion arrives as an event.
    fn begin_join(&mut self, ssid: &str, password: &str, bssid: Option<[u8; 6]>, persist: bool);

    /// Drops the station association.
    fn disconnect(&mut self);

    /// Starts a scan. Completion arrives as [`WifiEvent::ScanDone`].
    fn begin_scan(&mut self);

    fn station_info(&self) -> Option<StationInfo>;

    fn local_ip(&self) -> Ipv4Addr;

    fn gateway(&self) -> Ipv4Addr;

    fn netmask(&self) -> Ipv4Addr;

    fn mac_address(&self, iface: Interface) -> [u8; 6];

    /// Assigns a hardware address. Multicast addresses, or one equal to the
    /// other interface's address, are refused.
    fn set_mac_address(&mut self, iface: Interface, mac: [u8; 6], persist: bool) -> bool;

    fn hostname(&self) -> String;

    fn set_hostname(&mut self, name: &str) -> bool;

    /// Enables the station DHCP client.
    fn enable_dhcp(&mut self);

    /// Applies a static station address.
    fn set_static(&mut self, config: NetConfig) -> bool;

    fn dns(&self) -> DnsConfig;

    fn set_dns(&mut self, dns: DnsConfig);

    fn phy_mode(&self) -> PhyMode;

    fn set_phy_mode(&mut self, mode: PhyMode) -> bool;

    /// CPU clock in MHz.
    fn cpu_freq(&self) -> u32;

    /// Switches the CPU clock; only 80 and 160 MHz exist.
    fn set_cpu_freq(&mut self, mhz: u32) -> bool;

    /// Free heap reported by the chip, in bytes.
    fn free_heap(&self) -> u32;

    /// Returns the next pending event, if any.
    fn poll_event(&mut self) -> Option<WifiEvent>;
}
