//! Handler module - packet dispatch by id.
//!
//! Provides:
//! - [`PacketHandlerTable`] - id → ordered handler lists
//! - [`DispatchRegistry`] - lock-protected table with typed dispatch for
//!   received ([`InboundRegistry`]) and sent ([`OutboundRegistry`]) packets
//!
//! # Example
//!
//! ```
//! use shardwire::handler::{InboundRegistry, OutboundRegistry};
//!
//! let inbound = InboundRegistry::new();
//! inbound.register(0x1B, |reader| {
//!     let _serial = reader.read_u32();
//! });
//!
//! // Drop outgoing 0x73 pings
//! let outbound = OutboundRegistry::new();
//! outbound.register(0x73, |packet| packet.filter());
//! ```

mod registry;

pub use registry::{
    DispatchRegistry, HandlerId, InboundHandler, InboundRegistry, OutboundHandler,
    OutboundRegistry, PacketHandlerTable,
};
