//! Link Registry
//!
//! Five numbered slots hold the open links. In single mode only slot 0 is
//! addressable; multiplex mode exposes 0..=4 and requires every command to
//! name its link.

use super::socket::{Link, Origin};
use crate::protocol::Cursor;
use thiserror::Error;

/// Number of link slots
pub const MAX_LINKS: usize = 5;

/// Link id meaning "every link" in `AT+CIPCLOSE`
pub const ALL_LINKS: usize = 5;

/// Connection multiplexing mode (`AT+CIPMUX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MuxMode {
    #[default]
    Single,
    Multiplex,
}

impl MuxMode {
    pub fn code(self) -> u8 {
        match self {
            MuxMode::Single => 0,
            MuxMode::Multiplex => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("link is builded")]
    LinkActive,

    #[error("CIPSERVER must be 0")]
    ServerActive,

    #[error("link {0} already connected")]
    AlreadyConnected(usize),

    #[error("link {0} is not valid")]
    InvalidLink(usize),
}

/// The link slots plus the mux mode.
#[derive(Debug, Default)]
pub struct Registry {
    slots: [Option<Link>; MAX_LINKS],
    mux: MuxMode,
    was_connected: bool,
    next_serial: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mux(&self) -> MuxMode {
        self.mux
    }

    pub fn is_multiplexed(&self) -> bool {
        self.mux == MuxMode::Multiplex
    }

    /// Changes the mux mode. Refused while links are open, and leaving
    /// multiplex mode is refused while a listener runs.
    pub fn set_mux(&mut self, mode: MuxMode, listening: bool) -> Result<(), RegistryError> {
        if mode == self.mux {
            return Ok(());
        }
        if self.any_open() {
            return Err(RegistryError::LinkActive);
        }
        if mode == MuxMode::Single && listening {
            return Err(RegistryError::ServerActive);
        }
        self.mux = mode;
        Ok(())
    }

    /// Highest addressable link id in the current mode.
    pub fn max_link_id(&self) -> usize {
        match self.mux {
            MuxMode::Single => 0,
            MuxMode::Multiplex => MAX_LINKS - 1,
        }
    }

    pub fn is_open(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(|s| s.is_some())
    }

    pub fn any_open(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Whether any link was ever opened since the last reset.
    pub fn was_connected(&self) -> bool {
        self.was_connected
    }

    /// Lowest empty slot.
    pub fn lowest_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Links accepted by a listener.
    pub fn server_links(&self) -> usize {
        self.iter()
            .filter(|(_, link)| matches!(link.origin(), Origin::Server(_)))
            .count()
    }

    /// Stores a freshly opened link and stamps it with a new serial.
    /// An occupied slot is left unchanged.
    pub fn insert(&mut self, id: usize, mut link: Link) -> Result<(), RegistryError> {
        match self.slots.get_mut(id) {
            None => Err(RegistryError::InvalidLink(id)),
            Some(Some(_)) => Err(RegistryError::AlreadyConnected(id)),
            Some(slot) => {
                self.next_serial += 1;
                link.serial = self.next_serial;
                *slot = Some(link);
                self.was_connected = true;
                Ok(())
            }
        }
    }

    pub fn get(&self, id: usize) -> Option<&Link> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Link> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Empties a slot, handing back its link so the caller can stop it.
    pub fn remove(&mut self, id: usize) -> Option<Link> {
        self.slots.get_mut(id).and_then(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Link)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|link| (id, link)))
    }

    /// Ids of the occupied slots.
    pub fn open_ids(&self) -> Vec<usize> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Prefix for unsolicited link output: `"<id>,"` in multiplex mode.
    pub fn prefix(&self, id: usize) -> String {
        match self.mux {
            MuxMode::Single => String::new(),
            MuxMode::Multiplex => format!("{},", id),
        }
    }
}

/// Reads a leading `<digit>,` link id if present.
///
/// The digit must be at most `max`. Leaves the cursor untouched otherwise.
pub fn read_link_prefix(cursor: &mut Cursor<'_>, max: u8) -> Option<usize> {
    match (cursor.peek(), cursor.peek_at(1)) {
        (Some(d), Some(b',')) if (b'0'..=b'0' + max).contains(&d) => {
            cursor.eat(d);
            cursor.eat(b',');
            Some(usize::from(d - b'0'))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::socket::LinkType;
    use tokio::net::TcpListener;

    async fn open_link() -> (Link, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let link = Link::open(LinkType::Tcp, "127.0.0.1", addr, None).await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        (link, peer)
    }

    #[test]
    fn test_defaults() {
        let registry = Registry::new();
        assert_eq!(registry.mux(), MuxMode::Single);
        assert_eq!(registry.max_link_id(), 0);
        assert_eq!(registry.lowest_free(), Some(0));
        assert!(!registry.was_connected());
        assert_eq!(registry.prefix(3), "");
    }

    #[test]
    fn test_set_mux_rules() {
        let mut registry = Registry::new();
        assert!(registry.set_mux(MuxMode::Multiplex, false).is_ok());
        assert_eq!(registry.max_link_id(), 4);
        assert_eq!(registry.prefix(3), "3,");

        assert_eq!(
            registry.set_mux(MuxMode::Single, true),
            Err(RegistryError::ServerActive)
        );
        assert!(registry.set_mux(MuxMode::Single, false).is_ok());
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let mut registry = Registry::new();
        registry.set_mux(MuxMode::Multiplex, false).unwrap();

        let (a, _peer_a) = open_link().await;
        let (b, _peer_b) = open_link().await;
        registry.insert(2, a).unwrap();
        assert!(registry.was_connected());
        assert_eq!(registry.lowest_free(), Some(0));

        let remote = registry.get(2).unwrap().remote();
        assert_eq!(registry.insert(2, b), Err(RegistryError::AlreadyConnected(2)));
        assert_eq!(registry.get(2).unwrap().remote(), remote);

        assert_eq!(
            registry.set_mux(MuxMode::Single, false),
            Err(RegistryError::LinkActive)
        );
        assert_eq!(registry.open_ids(), vec![2]);

        assert!(registry.remove(2).is_some());
        assert!(!registry.any_open());
        assert!(registry.was_connected());
    }

    #[tokio::test]
    async fn test_reused_slot_gets_new_serial() {
        let mut registry = Registry::new();
        let (a, _peer_a) = open_link().await;
        let (b, _peer_b) = open_link().await;

        registry.insert(0, a).unwrap();
        let first = registry.get(0).unwrap().serial();
        registry.remove(0);
        registry.insert(0, b).unwrap();
        assert_ne!(registry.get(0).unwrap().serial(), first);
    }

    #[test]
    fn test_read_link_prefix() {
        let mut cursor = Cursor::new(b"3,10\r\n", 0);
        assert_eq!(read_link_prefix(&mut cursor, 4), Some(3));
        assert_eq!(cursor.read_number().unwrap(), 10);

        let mut cursor = Cursor::new(b"5,10\r\n", 0);
        assert_eq!(read_link_prefix(&mut cursor, 4), None);
        assert_eq!(cursor.position(), 0);

        let mut cursor = Cursor::new(b"10\r\n", 0);
        assert_eq!(read_link_prefix(&mut cursor, 5), None);
    }
}
