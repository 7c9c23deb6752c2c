//! # shardwire
//!
//! Client-side TCP transport for one-byte-id, length-prefixed game
//! protocols.
//!
//! ## Architecture
//!
//! - **Inbound**: a reader task pushes raw (optionally decompressed) bytes
//!   into a growable ring buffer; [`TransportSession::update`] slices
//!   complete packets out of it and dispatches them by id.
//! - **Outbound**: sent packets are coalesced into 512-byte grams under a
//!   hard byte cap and written by a dedicated writer task, one gram at a
//!   time.
//! - **Lifecycle**: every fatal condition (socket error, remote close,
//!   queue overflow, framing desync) ends in a single disconnect that
//!   fires [`TransportEvent::Disconnected`].
//!
//! ## Example
//!
//! ```ignore
//! use shardwire::protocol::PacketLengthTable;
//! use shardwire::TransportSession;
//!
//! #[tokio::main]
//! async fn main() -> shardwire::Result<()> {
//!     let session = TransportSession::new(PacketLengthTable::new().with_fixed(0x73, 2))?;
//!     session.on_packet(0x73, |reader| {
//!         println!("ping {:?}", reader.read_u8());
//!     });
//!
//!     session.connect("127.0.0.1", 2593).await?;
//!     session.send(&[0x73, 0x01])?;
//!     session.update()?;
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod send_queue;
pub mod stats;
pub mod transport;

mod session;
mod writer;

pub use compression::ChunkDecompressor;
pub use config::TransportConfig;
pub use error::{Result, TransportError};
pub use events::{DisconnectReason, SubscriptionId, TransportEvent};
pub use session::{SessionState, TransportBuilder, TransportSession};
pub use stats::StatisticsSnapshot;
