//! ICN forwarding core: Content Store, Pending Interest Table,
//! Forwarding Information Base, the ICNLayer that owns them, plus
//! ChunkLayer, TimeoutPreventionLayer, the PacketEncodingLayer/Encoder
//! bridge to the LinkLayer, and the TCP management socket.

pub mod chunk;
pub mod cs;
pub mod fib;
pub mod icn;
pub mod management;
pub mod packet_encoding;
pub mod pit;
pub mod timeout_prevention;

pub use chunk::ChunkLayer;
pub use cs::ContentStore;
pub use fib::ForwardingInformationBase;
pub use icn::{IcnCommand, IcnCommandResponse, IcnConfig, IcnHandle, IcnLayer};
pub use management::ManagementLayer;
pub use packet_encoding::PacketEncodingLayer;
pub use pit::PendingInterestTable;
pub use timeout_prevention::{ComputationLookup, TimeoutPreventionLayer};
