//! Transport module - address resolution and TCP socket handling.

mod socket;

pub use socket::{resolve_host, SocketStream};
