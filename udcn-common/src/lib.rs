//! Common types and wire encoding shared by every layer of the NFN
//! forwarder.

pub mod config;
pub mod encoding;
pub mod error;
pub mod metrics;
pub mod name;
pub mod packet;
pub mod tlv;

pub use config::ForwarderConfig;
pub use encoding::{Encoder, TextEncoder, TlvEncoder};
pub use error::{Error, NackReason};
pub use metrics::UdcnMetrics;
pub use name::{Name, NameComponent, KEEPALIVE_MARKER, NFN_MARKER};
pub use packet::{Content, FaceId, Interest, Nack, Packet, APP_FACE};

pub type Result<T> = std::result::Result<T, Error>;
