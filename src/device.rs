//! Device state
//!
//! Everything a command can observe or change lives in one [`Device`]:
//! the link slots, listeners, delivery mode, TLS trust configuration,
//! persisted settings and the radio. The dispatcher owns it exclusively,
//! so every invariant that spans these pieces (no mux change while links
//! are open, trust prerequisites before an SSL open) is checked in one place.

use crate::link::{Registry, ServerConfig, ServerPool, Transfer};
use crate::storage::{NetConfig, SettingsStore, UartConfig};
use crate::tls::TrustManager;
use crate::wifi::WifiDriver;
use tracing::{debug, info};

/// Station DHCP client bit in the DHCP mode byte
pub const DHCP_STATION: u8 = 0b10;

/// SNTP client configuration (`AT+CIPSNTPCFG`). Volatile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SntpConfig {
    pub enabled: bool,
    /// Offset from UTC in whole hours
    pub timezone: i32,
    pub servers: [String; 3],
}

/// A background operation that blocks command processing until it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Join,
    Scan,
}

/// The complete mutable state of one device.
pub struct Device {
    pub registry: Registry,
    pub servers: ServerPool,
    pub transfer: Transfer,
    pub trust: TrustManager,
    pub settings: SettingsStore,
    pub wifi: Box<dyn WifiDriver>,
    /// Echo each command line back to the host (`ATE`)
    pub echo: bool,
    /// Outstanding background operation, if any
    pub busy: Option<Background>,
    /// UART framing in effect (may differ from the persisted one)
    pub uart: UartConfig,
    /// DHCP mode in effect
    pub dhcp_mode: u8,
    /// Station address applied while DHCP is off
    pub static_net: NetConfig,
    pub sntp: SntpConfig,
}

impl Device {
    /// Builds the boot-time state from persisted settings.
    pub fn new(settings: SettingsStore, wifi: Box<dyn WifiDriver>) -> Self {
        let mut device = Self {
            registry: Registry::new(),
            servers: ServerPool::default(),
            transfer: Transfer::default(),
            trust: TrustManager::new(settings.get().max_certificates as usize),
            settings,
            wifi,
            echo: true,
            busy: None,
            uart: UartConfig::default(),
            dhcp_mode: 0,
            static_net: NetConfig::default(),
            sntp: SntpConfig::default(),
        };
        device.apply_settings();
        device
    }

    /// Replaces the listener pool (for binding on a specific address).
    pub fn with_servers(mut self, servers: ServerPool) -> Self {
        self.servers = servers;
        self
    }

    fn apply_settings(&mut self) {
        let settings = *self.settings.get();
        self.uart = settings.uart;
        self.dhcp_mode = settings.dhcp_mode;
        self.static_net = settings.net;
        self.trust = TrustManager::new(settings.max_certificates as usize);
        self.apply_dhcp();
        if !settings.dns.dns1.is_unspecified() {
            self.wifi.set_dns(settings.dns);
        }
    }

    /// Pushes the current DHCP mode and static address to the radio.
    pub fn apply_dhcp(&mut self) {
        if self.dhcp_mode & DHCP_STATION != 0 {
            self.wifi.enable_dhcp();
        } else {
            self.wifi.set_static(self.static_net);
        }
    }

    /// Whether outgoing links can be opened: associated, or running an AP.
    pub fn has_ip(&self) -> bool {
        self.wifi.is_connected() || self.wifi.mode().has_ap()
    }

    /// Closes every open link.
    pub async fn close_all(&mut self) {
        for id in self.registry.open_ids() {
            if let Some(mut link) = self.registry.remove(id) {
                link.stop().await;
            }
        }
    }

    /// Restarts the device: links and listeners are dropped, volatile
    /// configuration returns to its boot values and persisted settings are
    /// re-read.
    pub async fn reset(&mut self) {
        info!("Device reset");
        self.close_all().await;
        for port in self.servers.ports() {
            if self.servers.stop(port).is_err() {
                debug!(port, "Listener already stopped");
            }
        }
        self.servers.config = ServerConfig::default();
        self.registry = Registry::new();
        self.transfer = Transfer::default();
        self.settings.reload();
        self.echo = true;
        self.busy = None;
        self.sntp = SntpConfig::default();
        self.apply_settings();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("registry", &self.registry)
            .field("servers", &self.servers)
            .field("transfer", &self.transfer)
            .field("trust", &self.trust)
            .field("echo", &self.echo)
            .field("busy", &self.busy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MuxMode;
    use crate::wifi::{SimNetwork, SimulatedWifi};
    use std::net::Ipv4Addr;

    fn device() -> Device {
        let mut wifi = SimulatedWifi::new(vec![SimNetwork::new("home", "secret")]);
        wifi.associate("home");
        Device::new(SettingsStore::in_memory(), Box::new(wifi))
    }

    #[test]
    fn test_boot_state() {
        let device = device();
        assert!(device.echo);
        assert!(device.busy.is_none());
        assert_eq!(device.uart.baud, 115_200);
        assert_eq!(device.trust.cap(), 5);
        assert!(device.has_ip());
    }

    #[test]
    fn test_static_address_applied_when_dhcp_off() {
        let mut settings = SettingsStore::in_memory();
        let net = NetConfig {
            ip: Ipv4Addr::new(10, 1, 1, 9),
            gateway: Ipv4Addr::new(10, 1, 1, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
        };
        settings
            .update(|s| {
                s.dhcp_mode = 1;
                s.net = net;
            })
            .unwrap();
        let mut wifi = SimulatedWifi::new(vec![SimNetwork::new("home", "secret")]);
        wifi.associate("home");

        let device = Device::new(settings, Box::new(wifi));
        assert_eq!(device.wifi.local_ip(), net.ip);
    }

    #[tokio::test]
    async fn test_reset_restores_volatile_state() {
        let mut device = device();
        device.echo = false;
        device.registry.set_mux(MuxMode::Multiplex, false).unwrap();
        device.trust.set_fingerprint([1; 20]);

        device.reset().await;
        assert!(device.echo);
        assert_eq!(device.registry.mux(), MuxMode::Single);
        assert!(device.trust.fingerprint().is_none());
    }
}
