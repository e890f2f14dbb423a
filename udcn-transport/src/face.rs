//! Face registry for the LinkLayer.
//!
//! A face is created on first reception from a new peer and persists
//! until explicit removal. Face ids are monotonically assigned integers,
//! independent of the `(peer_ip, peer_port)` tuple they currently map to.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use udcn_common::FaceId;

/// Events a face-aware caller may want to react to.
#[derive(Debug, Clone)]
pub enum FaceEvent {
    /// A new peer sent us a datagram for the first time.
    Created(FaceId, SocketAddr),
    /// A face was explicitly removed.
    Removed(FaceId),
}

/// Bidirectional map between face ids and `(peer_ip, peer_port)` tuples.
#[derive(Debug, Default)]
pub struct FaceTable {
    next_id: AtomicU32,
    by_addr: HashMap<SocketAddr, FaceId>,
    by_id: HashMap<FaceId, SocketAddr>,
}

impl FaceTable {
    pub fn new() -> Self {
        // Face id 0 is reserved for the APP pseudo-face.
        Self {
            next_id: AtomicU32::new(1),
            by_addr: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Returns the face id for `addr`, creating one if this is the first
    /// datagram seen from this peer.
    pub fn face_for(&mut self, addr: SocketAddr) -> (FaceId, Option<FaceEvent>) {
        if let Some(&id) = self.by_addr.get(&addr) {
            return (id, None);
        }
        let id = FaceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_addr.insert(addr, id);
        self.by_id.insert(id, addr);
        (id, Some(FaceEvent::Created(id, addr)))
    }

    pub fn addr_of(&self, id: FaceId) -> Option<SocketAddr> {
        self.by_id.get(&id).copied()
    }

    /// Registers a face explicitly (used by the management socket's
    /// `newface` command, which creates a face before any datagram has
    /// arrived from the peer).
    pub fn register(&mut self, addr: SocketAddr) -> FaceId {
        if let Some(&id) = self.by_addr.get(&addr) {
            return id;
        }
        let id = FaceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_addr.insert(addr, id);
        self.by_id.insert(id, addr);
        id
    }

    pub fn remove(&mut self, id: FaceId) -> Option<FaceEvent> {
        let addr = self.by_id.remove(&id)?;
        self.by_addr.remove(&addr);
        Some(FaceEvent::Removed(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
