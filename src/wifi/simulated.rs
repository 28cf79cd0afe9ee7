//! In-process radio simulation.
//!
//! Access points are configured up front. Joins and scans complete after a
//! configurable delay, observed the next time the session polls for events.
//! Link sockets opened while "connected" use the host machine's network.

use super::{Interface, PhyMode, ScanEntry, StationInfo, WifiDriver, WifiEvent, WifiMode};
use crate::storage::{DnsConfig, NetConfig};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Join failure: wrong password
pub const JOIN_WRONG_PASSWORD: u8 = 2;
/// Join failure: access point not found
pub const JOIN_NOT_FOUND: u8 = 3;
/// Disconnect reason reported when the station leaves on request
pub const REASON_ASSOC_LEAVE: u8 = 8;
/// Heap left over on a freshly booted chip running the AT firmware
pub const SIM_FREE_HEAP: u32 = 46_520;

/// A simulated access point.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    pub password: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i32,
}

impl SimNetwork {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            channel: 6,
            rssi: -55,
        }
    }

    fn encryption(&self) -> u8 {
        // 0 open, 3 WPA2-PSK
        if self.password.is_empty() {
            0
        } else {
            3
        }
    }
}

#[derive(Debug)]
enum Station {
    Idle,
    Joining { network: Option<usize>, password: String, due: Instant },
    Connected { network: usize },
}

/// A deterministic [`WifiDriver`].
#[derive(Debug)]
pub struct SimulatedWifi {
    mode: WifiMode,
    networks: Vec<SimNetwork>,
    station: Station,
    scan_due: Option<Instant>,
    events: VecDeque<WifiEvent>,
    delay: Duration,
    hostname: String,
    mac: [u8; 6],
    ap_mac: [u8; 6],
    phy_mode: PhyMode,
    cpu_freq: u32,
    dhcp: bool,
    static_config: NetConfig,
    dns: DnsConfig,
}

impl SimulatedWifi {
    pub fn new(networks: Vec<SimNetwork>) -> Self {
        Self {
            mode: WifiMode::Station,
            networks,
            station: Station::Idle,
            scan_due: None,
            events: VecDeque::new(),
            delay: Duration::from_millis(200),
            hostname: "atmod".to_string(),
            mac: [0x5c, 0xcf, 0x7f, 0x00, 0x00, 0x01],
            ap_mac: [0x5e, 0xcf, 0x7f, 0x00, 0x00, 0x01],
            phy_mode: PhyMode::N,
            cpu_freq: 80,
            dhcp: true,
            static_config: NetConfig::default(),
            dns: DnsConfig::default(),
        }
    }

    /// Sets how long joins and scans take to complete.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Associates immediately without producing events (boot-time autoconnect).
    pub fn associate(&mut self, ssid: &str) -> bool {
        match self.networks.iter().position(|n| n.ssid == ssid) {
            Some(network) if self.mode.has_station() => {
                self.station = Station::Connected { network };
                true
            }
            _ => false,
        }
    }

    /// Simulates the access point dropping the station.
    pub fn drop_link(&mut self, reason: u8) {
        if matches!(self.station, Station::Connected { .. }) {
            self.station = Station::Idle;
            self.events.push_back(WifiEvent::Disconnected(reason));
        }
    }

    fn dhcp_lease(&self) -> (Ipv4Addr, Ipv4Addr, Ipv4Addr) {
        (
            Ipv4Addr::new(192, 168, 1, 100),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        )
    }

    fn address(&self) -> (Ipv4Addr, Ipv4Addr, Ipv4Addr) {
        if !self.is_connected() {
            return (Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED);
        }
        if self.dhcp || self.static_config.ip.is_unspecified() {
            self.dhcp_lease()
        } else {
            (
                self.static_config.ip,
                self.static_config.gateway,
                self.static_config.netmask,
            )
        }
    }

    fn complete_pending(&mut self) {
        let now = Instant::now();

        if let Station::Joining { network, password, due } = &self.station {
            if *due <= now {
                let outcome = match network {
                    None => Err(JOIN_NOT_FOUND),
                    Some(i) if self.networks[*i].password != *password => Err(JOIN_WRONG_PASSWORD),
                    Some(i) => Ok(*i),
                };
                match outcome {
                    Ok(network) => {
                        self.station = Station::Connected { network };
                        self.events.push_back(WifiEvent::Connected);
                        let (ip, _, _) = self.address();
                        self.events.push_back(WifiEvent::GotIp(ip));
                    }
                    Err(code) => {
                        self.station = Station::Idle;
                        self.events.push_back(WifiEvent::JoinFailed(code));
                    }
                }
            }
        }

        if let Some(due) = self.scan_due {
            if due <= now {
                self.scan_due = None;
                let entries = self
                    .networks
                    .iter()
                    .map(|n| ScanEntry {
                        encryption: n.encryption(),
                        ssid: n.ssid.clone(),
                        rssi: n.rssi,
                        bssid: n.bssid,
                        channel: n.channel,
                    })
                    .collect();
                self.events.push_back(WifiEvent::ScanDone(entries));
            }
        }
    }
}

impl Default for SimulatedWifi {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl WifiDriver for SimulatedWifi {
    fn mode(&self) -> WifiMode {
        self.mode
    }

    fn set_mode(&mut self, mode: WifiMode, persist: bool) -> bool {
        debug!(?mode, persist, "Wi-Fi mode change");
        if !mode.has_station() {
            self.station = Station::Idle;
        }
        self.mode = mode;
        true
    }

    fn is_connected(&self) -> bool {
        matches!(self.station, Station::Connected { .. })
    }

    fn begin_join(&mut self, ssid: &str, password: &str, bssid: Option<[u8; 6]>, persist: bool) {
        let network = self
            .networks
            .iter()
            .position(|n| n.ssid == ssid && bssid.map_or(true, |b| b == n.bssid));
        debug!(ssid, persist, found = network.is_some(), "Joining access point");
        self.station = Station::Joining {
            network,
            password: password.to_string(),
            due: Instant::now() + self.delay,
        };
    }

    fn disconnect(&mut self) {
        self.drop_link(REASON_ASSOC_LEAVE);
        if matches!(self.station, Station::Joining { .. }) {
            self.station = Station::Idle;
        }
    }

    fn begin_scan(&mut self) {
        self.scan_due = Some(Instant::now() + self.delay);
    }

    fn station_info(&self) -> Option<StationInfo> {
        match self.station {
            Station::Connected { network } => {
                let n = &self.networks[network];
                Some(StationInfo {
                    ssid: n.ssid.clone(),
                    bssid: n.bssid,
                    channel: n.channel,
                    rssi: n.rssi,
                })
            }
            _ => None,
        }
    }

    fn local_ip(&self) -> Ipv4Addr {
        self.address().0
    }

    fn gateway(&self) -> Ipv4Addr {
        self.address().1
    }

    fn netmask(&self) -> Ipv4Addr {
        self.address().2
    }

    fn mac_address(&self, iface: Interface) -> [u8; 6] {
        match iface {
            Interface::Station => self.mac,
            Interface::SoftAp => self.ap_mac,
        }
    }

    fn set_mac_address(&mut self, iface: Interface, mac: [u8; 6], persist: bool) -> bool {
        let (target, other) = match iface {
            Interface::Station => (&mut self.mac, self.ap_mac),
            Interface::SoftAp => (&mut self.ap_mac, self.mac),
        };
        // Bit 0 of the first octet marks a multicast address
        if mac[0] & 0x01 != 0 || mac == other {
            return false;
        }
        debug!(?iface, persist, "MAC address change");
        *target = mac;
        true
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn set_hostname(&mut self, name: &str) -> bool {
        if name.is_empty() || name.len() > 32 {
            return false;
        }
        self.hostname = name.to_string();
        true
    }

    fn enable_dhcp(&mut self) {
        self.dhcp = true;
    }

    fn set_static(&mut self, config: NetConfig) -> bool {
        self.dhcp = false;
        self.static_config = config;
        true
    }

    fn dns(&self) -> DnsConfig {
        self.dns
    }

    fn set_dns(&mut self, dns: DnsConfig) {
        self.dns = dns;
    }

    fn phy_mode(&self) -> PhyMode {
        self.phy_mode
    }

    fn set_phy_mode(&mut self, mode: PhyMode) -> bool {
        self.phy_mode = mode;
        true
    }

    fn cpu_freq(&self) -> u32 {
        self.cpu_freq
    }

    fn set_cpu_freq(&mut self, mhz: u32) -> bool {
        if mhz != 80 && mhz != 160 {
            return false;
        }
        self.cpu_freq = mhz;
        true
    }

    fn free_heap(&self) -> u32 {
        SIM_FREE_HEAP
    }

    fn poll_event(&mut self) -> Option<WifiEvent> {
        self.complete_pending();
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio() -> SimulatedWifi {
        SimulatedWifi::new(vec![SimNetwork::new("home", "secret")]).with_delay(Duration::ZERO)
    }

    #[test]
    fn test_join_success() {
        let mut wifi = radio();
        wifi.begin_join("home", "secret", None, false);
        assert!(!wifi.is_connected());

        assert_eq!(wifi.poll_event(), Some(WifiEvent::Connected));
        assert_eq!(
            wifi.poll_event(),
            Some(WifiEvent::GotIp(Ipv4Addr::new(192, 168, 1, 100)))
        );
        assert_eq!(wifi.poll_event(), None);
        assert!(wifi.is_connected());
        assert_eq!(wifi.station_info().unwrap().ssid, "home");
    }

    #[test]
    fn test_join_failures() {
        let mut wifi = radio();
        wifi.begin_join("home", "wrong", None, false);
        assert_eq!(wifi.poll_event(), Some(WifiEvent::JoinFailed(JOIN_WRONG_PASSWORD)));

        wifi.begin_join("elsewhere", "secret", None, false);
        assert_eq!(wifi.poll_event(), Some(WifiEvent::JoinFailed(JOIN_NOT_FOUND)));
        assert!(!wifi.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_waits_for_delay() {
        let mut wifi = radio().with_delay(Duration::from_secs(1));
        wifi.begin_join("home", "secret", None, false);
        assert_eq!(wifi.poll_event(), None);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(wifi.poll_event(), Some(WifiEvent::Connected));
    }

    #[test]
    fn test_scan() {
        let mut wifi = radio();
        wifi.begin_scan();
        match wifi.poll_event() {
            Some(WifiEvent::ScanDone(entries)) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].ssid, "home");
                assert_eq!(entries[0].encryption, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_reports_reason() {
        let mut wifi = radio();
        assert!(wifi.associate("home"));
        wifi.disconnect();
        assert!(!wifi.is_connected());
        assert_eq!(
            wifi.poll_event(),
            Some(WifiEvent::Disconnected(REASON_ASSOC_LEAVE))
        );
    }

    #[test]
    fn test_mac_addresses() {
        let mut wifi = radio();
        let sta = wifi.mac_address(Interface::Station);
        let ap = wifi.mac_address(Interface::SoftAp);
        assert_ne!(sta, ap);

        assert!(!wifi.set_mac_address(Interface::Station, [0x01, 0, 0, 0, 0, 1], false));
        assert!(!wifi.set_mac_address(Interface::Station, ap, false));
        assert_eq!(wifi.mac_address(Interface::Station), sta);

        let new = [0x1a, 0xfe, 0x34, 0x00, 0x00, 0x02];
        assert!(wifi.set_mac_address(Interface::Station, new, true));
        assert_eq!(wifi.mac_address(Interface::Station), new);
    }

    #[test]
    fn test_cpu_freq() {
        let mut wifi = radio();
        assert_eq!(wifi.cpu_freq(), 80);
        assert!(!wifi.set_cpu_freq(120));
        assert!(wifi.set_cpu_freq(160));
        assert_eq!(wifi.cpu_freq(), 160);
    }

    #[test]
    fn test_static_address() {
        let mut wifi = radio();
        wifi.associate("home");
        let config = NetConfig {
            ip: Ipv4Addr::new(10, 0, 0, 5),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
        };
        wifi.set_static(config);
        assert_eq!(wifi.local_ip(), config.ip);
        wifi.enable_dhcp();
        assert_eq!(wifi.local_ip(), Ipv4Addr::new(192, 168, 1, 100));
    }
}
