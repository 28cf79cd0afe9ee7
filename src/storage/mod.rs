//! Storage Module
//!
//! Persistent device configuration. Everything the firmware keeps across
//! resets lives in one checksummed record managed by [`SettingsStore`].
//!
//! ## Example
//!
//! ```
//! use atmod::storage::SettingsStore;
//!
//! let mut store = SettingsStore::in_memory();
//! assert_eq!(store.get().uart.baud, 115_200);
//!
//! let changed = store.update(|s| s.uart.baud = 9600).unwrap();
//! assert!(changed);
//! assert_eq!(store.get().uart.baud, 9600);
//! ```

pub mod settings;

pub use settings::{
    crc32_ieee, DnsConfig, NetConfig, Settings, SettingsError, SettingsStore, UartConfig,
    RECORD_LEN,
};
