//! Connection table — fixed arena indexed by socket descriptor.
//!
//! Each slot is in one of three states:
//!
//! ```text
//!   Vacant ──reserve──► Loaned ──park──► Parked
//!     ▲                   │  ▲            │
//!     └─────release───────┘  └────take────┘
//! ```
//!
//! `Parked` means the table owns the connection and its descriptor is
//! armed in epoll. `Loaned` means exactly one thread (the reactor or a
//! worker) holds the `Box<Connection>`. Since descriptors are one-shot,
//! an event can only be delivered for a parked connection, and the
//! thread that takes it is its sole owner until it parks it again.
//!
//! Every slot carries a generation, bumped on each `reserve`, so a
//! token from a previous occupant of the same descriptor never
//! matches.

use std::os::fd::RawFd;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::conn::Connection;

/// Descriptor plus slot generation. Encoded into the epoll token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    fd: RawFd,
    generation: u32,
}

impl ConnKey {
    pub fn new(fd: RawFd, generation: u32) -> Self {
        Self { fd, generation }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// `generation << 32 | fd`
    #[inline]
    pub fn token(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.fd as u32 as u64)
    }

    #[inline]
    pub fn from_token(token: u64) -> Self {
        Self {
            fd: (token & 0xFFFF_FFFF) as u32 as RawFd,
            generation: (token >> 32) as u32,
        }
    }
}

enum SlotState {
    Vacant,
    Parked(Box<Connection>),
    Loaned,
}

struct Slot {
    generation: u32,
    state: SlotState,
}

pub struct ConnTable {
    slots: Box<[Mutex<Slot>]>,
}

impl ConnTable {
    /// Table accepting descriptors `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| {
                Mutex::new(Slot {
                    generation: 0,
                    state: SlotState::Vacant,
                })
            })
            .collect();
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, fd: RawFd) -> Option<MutexGuard<'_, Slot>> {
        let index = usize::try_from(fd).ok()?;
        self.slots
            .get(index)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Claim the slot for a freshly accepted descriptor.
    ///
    /// Returns `None` when the descriptor is out of range or the slot is
    /// still occupied.
    pub fn reserve(&self, fd: RawFd) -> Option<ConnKey> {
        let mut slot = self.slot(fd)?;
        if !matches!(slot.state, SlotState::Vacant) {
            error!(fd, "descriptor reused while its slot is occupied");
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = SlotState::Loaned;
        Some(ConnKey::new(fd, slot.generation))
    }

    /// Hand a loaned connection back to the table.
    ///
    /// Must happen before the descriptor is armed. Fails, returning the
    /// connection, if the slot is not on loan under the same key.
    pub fn park(&self, conn: Box<Connection>) -> Result<(), Box<Connection>> {
        let key = conn.key();
        let Some(mut slot) = self.slot(key.fd()) else {
            return Err(conn);
        };
        if slot.generation != key.generation() || !matches!(slot.state, SlotState::Loaned) {
            error!(fd = key.fd(), generation = key.generation(), "park into a slot not on loan");
            return Err(conn);
        }
        slot.state = SlotState::Parked(conn);
        Ok(())
    }

    /// Borrow a parked connection for the event that just fired.
    ///
    /// `None` for stale keys or slots that are not parked.
    pub fn take(&self, key: ConnKey) -> Option<Box<Connection>> {
        let mut slot = self.slot(key.fd())?;
        if slot.generation != key.generation() {
            return None;
        }
        match std::mem::replace(&mut slot.state, SlotState::Loaned) {
            SlotState::Parked(conn) => Some(conn),
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Free a loaned slot whose connection is being destroyed.
    pub fn release(&self, key: ConnKey) -> bool {
        let Some(mut slot) = self.slot(key.fd()) else {
            return false;
        };
        if slot.generation != key.generation() || !matches!(slot.state, SlotState::Loaned) {
            error!(fd = key.fd(), generation = key.generation(), "release of a slot not on loan");
            return false;
        }
        slot.state = SlotState::Vacant;
        true
    }

    /// Slots not vacant.
    #[cfg(test)]
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|m| {
                let slot = m.lock().unwrap_or_else(PoisonError::into_inner);
                !matches!(slot.state, SlotState::Vacant)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::test_support::socket_pair;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_token_round_trip() {
        let key = ConnKey::new(1234, 7);
        assert_eq!(key.token(), (7u64 << 32) | 1234);
        assert_eq!(ConnKey::from_token(key.token()), key);
    }

    #[test]
    fn test_reserve_bounds() {
        let table = ConnTable::new(8);
        assert!(table.reserve(8).is_none());
        assert!(table.reserve(-1).is_none());
        let key = table.reserve(3).unwrap();
        assert_eq!(key.generation(), 1);
        assert!(table.reserve(3).is_none());
        assert!(table.release(key));
        assert_eq!(table.reserve(3).unwrap().generation(), 2);
    }

    #[test]
    fn test_park_take_release() {
        let (server, _client, peer) = socket_pair();
        let fd = server.as_raw_fd();
        let table = ConnTable::new(fd as usize + 1);
        let key = table.reserve(fd).unwrap();
        let conn = Box::new(Connection::new(server, peer, key, 64, 64));

        assert!(table.park(conn).is_ok());
        assert_eq!(table.occupied(), 1);

        let stale = ConnKey::new(fd, key.generation() + 1);
        assert!(table.take(stale).is_none());

        let conn = table.take(key).unwrap();
        assert!(table.take(key).is_none());
        assert!(table.release(key));
        assert!(!table.release(key));
        assert_eq!(table.occupied(), 0);
        drop(conn);
    }
}
