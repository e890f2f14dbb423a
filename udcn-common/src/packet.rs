//! Packet types exchanged between forwarders: Interest, Content, Nack.

use crate::error::NackReason;
use crate::name::Name;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer identifier for a peer connection, assigned by the LinkLayer
/// on first reception from a new peer. Faces persist until explicit
/// removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face#{}", self.0)
    }
}

/// Pseudo-face used when a packet originates from the local NFN/Chunk
/// stack rather than a peer.
pub const APP_FACE: FaceId = FaceId(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self { name }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub name: Name,
    pub payload: Bytes,
}

impl Content {
    pub fn new(name: Name, payload: impl Into<Bytes>) -> Self {
        Self {
            name,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nack {
    pub name: Name,
    pub reason: NackReason,
    pub originating_interest: Option<Interest>,
}

impl Nack {
    pub fn new(name: Name, reason: NackReason) -> Self {
        Self {
            name,
            reason,
            originating_interest: None,
        }
    }

    pub fn with_originating_interest(mut self, interest: Interest) -> Self {
        self.originating_interest = Some(interest);
        self
    }
}

/// A tagged variant over the three packet kinds the forwarder exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Content(Content),
    Nack(Nack),
}

impl Packet {
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(i) => &i.name,
            Packet::Content(c) => &c.name,
            Packet::Nack(n) => &n.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Interest(_) => "Interest",
            Packet::Content(_) => "Content",
            Packet::Nack(_) => "Nack",
        }
    }
}

impl From<Interest> for Packet {
    fn from(i: Interest) -> Self {
        Packet::Interest(i)
    }
}

impl From<Content> for Packet {
    fn from(c: Content) -> Self {
        Packet::Content(c)
    }
}

impl From<Nack> for Packet {
    fn from(n: Nack) -> Self {
        Packet::Nack(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_name_dispatches_by_variant() {
        let name = Name::from_string("/a/b");
        let interest: Packet = Interest::new(name.clone()).into();
        assert_eq!(interest.name(), &name);
        assert_eq!(interest.kind(), "Interest");

        let content: Packet = Content::new(name.clone(), Bytes::from_static(b"x")).into();
        assert_eq!(content.kind(), "Content");

        let nack: Packet = Nack::new(name.clone(), NackReason::NoRoute).into();
        assert_eq!(nack.kind(), "Nack");
    }
}
