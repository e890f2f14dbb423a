//! Error types for the NFN forwarder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors that can occur within the forwarder.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to NDN packet processing.
    #[error("NDN packet error: {0}")]
    NdnPacket(String),

    /// Malformed wire data; the packet is dropped, the face is unaffected.
    #[error("decode error: {0}")]
    Decode(String),

    /// No FIB prefix matched an Interest.
    #[error("no route for name")]
    NoRoute,

    /// A PIT entry aged out before Content/Nack arrived.
    #[error("PIT entry timed out")]
    PitTimeout,

    /// A keep-alive arrived for a name with no running computation.
    #[error("computation not running")]
    ComputationNotRunning,

    /// An NFN executor failed or was killed after its deadline expired.
    #[error("executor error: {0}")]
    Executor(String),

    /// The NFN expression grammar failed to parse.
    #[error("parser error: {0}")]
    Parser(String),

    /// Error related to transport (face/link) I/O.
    #[error("transport error: {0}")]
    Transport(String),

    /// Error related to configuration loading.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("other error: {0}")]
    Other(String),
}

/// The reason carried by a Nack packet. Mirrors the subset of [`Error`]
/// variants that are allowed to cross a layer boundary as data instead
/// of being raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NackReason {
    /// The Content Store held nothing for the name and no route exists.
    NoContent = 0,
    /// A keep-alive arrived for a name with no running computation.
    CompNotRunning = 1,
    /// Reason unspecified — used for PIT timeouts and ageing-driven Nacks.
    NotSet = 2,
    /// No FIB prefix matched.
    NoRoute = 3,
}

impl std::fmt::Display for NackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NackReason::NoContent => "NO_CONTENT",
            NackReason::CompNotRunning => "COMP_NOT_RUNNING",
            NackReason::NotSet => "NOT_SET",
            NackReason::NoRoute => "NO_ROUTE",
        };
        write!(f, "{}", s)
    }
}
