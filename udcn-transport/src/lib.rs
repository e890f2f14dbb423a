//! LinkLayer for the µDCN NFN forwarder.
//!
//! Binds a UDP/IPv4 datagram socket and exchanges `(face_id, raw_bytes)`
//! with the PacketEncodingLayer above, per the forwarder's layered
//! pipeline. Owns the face table; no forwarding state lives here.

pub mod face;
pub mod udp;

pub use face::{FaceEvent, FaceTable};
pub use udp::{LinkInbound, LinkOutbound, UdpLinkLayer};
