use std::collections::HashMap;
use std::net::SocketAddr;

use crate::net::PeerId;

/// Two-way map between peers and the datagram address each one announced.
/// An address belongs to at most one peer; rebinding moves it.
#[derive(Debug, Default)]
pub struct RoutingTable {
    by_addr: HashMap<SocketAddr, PeerId>,
    by_peer: HashMap<PeerId, SocketAddr>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the address previously bound to `peer_id`, if any.
    pub fn bind(&mut self, peer_id: PeerId, addr: SocketAddr) -> Option<SocketAddr> {
        if let Some(owner) = self.by_addr.insert(addr, peer_id) {
            if owner != peer_id {
                self.by_peer.remove(&owner);
            }
        }

        let previous = self.by_peer.insert(peer_id, addr);
        if let Some(old) = previous {
            if old != addr {
                self.by_addr.remove(&old);
            }
        }
        previous
    }

    pub fn peer_for(&self, addr: &SocketAddr) -> Option<PeerId> {
        self.by_addr.get(addr).copied()
    }

    pub fn addr_for(&self, peer_id: PeerId) -> Option<SocketAddr> {
        self.by_peer.get(&peer_id).copied()
    }

    pub fn remove(&mut self, peer_id: PeerId) -> Option<SocketAddr> {
        let addr = self.by_peer.remove(&peer_id)?;
        self.by_addr.remove(&addr);
        Some(addr)
    }

    pub fn clear(&mut self) {
        self.by_addr.clear();
        self.by_peer.clear();
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }
}
