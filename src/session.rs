//! Transport session builder and runtime.
//!
//! The [`TransportBuilder`] configures pools, the packet length table and
//! transport settings. The [`TransportSession`] manages the lifecycle:
//! 1. Resolve the host and open the TCP connection
//! 2. Spawn the writer task and the reader task
//! 3. Reader pushes raw (optionally decompressed) bytes into the ring
//! 4. [`update`](TransportSession::update) frames packets and dispatches them
//!    on the caller's thread, then flushes trailing outbound bytes
//! 5. Any fatal condition funnels into a single idempotent disconnect
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ─► Disconnecting ─► Disconnected
//! ```
//!
//! # Example
//!
//! ```ignore
//! use shardwire::protocol::{PacketLengthTable, PacketWriter};
//! use shardwire::{TransportEvent, TransportSession};
//!
//! #[tokio::main]
//! async fn main() -> shardwire::Result<()> {
//!     let session = TransportSession::builder()
//!         .packet_lengths(PacketLengthTable::new().with_fixed(0x73, 2))
//!         .build()?;
//!
//!     session.subscribe(|event| {
//!         if let TransportEvent::Disconnected(reason) = event {
//!             eprintln!("disconnected: {}", reason);
//!         }
//!     });
//!     session.on_packet(0x73, |reader| {
//!         let _seq = reader.read_u8();
//!     });
//!
//!     session.connect("127.0.0.1", 2593).await?;
//!     session.send_packet(PacketWriter::fixed(0x73).write_u8(1))?;
//!
//!     loop {
//!         session.update()?;
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::compression::{ChunkDecompressor, DecompressionStage};
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::events::{DisconnectReason, EventObservers, SubscriptionId, TransportEvent};
use crate::handler::{HandlerId, InboundRegistry, OutboundRegistry};
use crate::pool::{BufferPool, PooledSegment, SegmentPool};
use crate::protocol::{
    hex_dump, Packet, PacketFramer, PacketLengthTable, PacketLengths, PacketReader, PacketWriter,
    RingBuffer,
};
use crate::send_queue::{SendQueue, GRAM_SIZE};
use crate::stats::{NetStatistics, StatisticsSnapshot};
use crate::transport::{resolve_host, SocketStream};
use crate::writer::{run_writer, SendPipeline};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Resolving or connecting.
    Connecting,
    /// Socket open, tasks running.
    Connected,
    /// Teardown in progress.
    Disconnecting,
}

fn shared_pool(segment_size: usize, initial: usize) -> Arc<dyn BufferPool> {
    Arc::new(SegmentPool::new(segment_size, initial))
}

/// Builder for configuring and creating a [`TransportSession`].
pub struct TransportBuilder {
    config: TransportConfig,
    lengths: Option<Arc<dyn PacketLengths>>,
    receive_pool: Option<Arc<dyn BufferPool>>,
    packet_pool: Option<Arc<dyn BufferPool>>,
    gram_pool: Option<Arc<dyn BufferPool>>,
}

impl TransportBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
            lengths: None,
            receive_pool: None,
            packet_pool: None,
            gram_pool: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Packet id → length table.
    ///
    /// Default: every id is dynamic.
    pub fn packet_lengths<L>(mut self, lengths: L) -> Self
    where
        L: PacketLengths + 'static,
    {
        let lengths: Arc<dyn PacketLengths> = Arc::new(lengths);
        self.lengths = Some(lengths);
        self
    }

    /// Use an already shared length table.
    pub fn packet_lengths_shared(mut self, lengths: Arc<dyn PacketLengths>) -> Self {
        self.lengths = Some(lengths);
        self
    }

    /// Pool for receive and decompression staging segments.
    ///
    /// Default: a private pool of `receive_segment_size` segments.
    pub fn receive_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.receive_pool = Some(pool);
        self
    }

    /// Pool for received packet buffers.
    pub fn packet_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.packet_pool = Some(pool);
        self
    }

    /// Pool for outbound grams. Its segment size is the gram size.
    pub fn gram_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.gram_pool = Some(pool);
        self
    }

    /// Hard cap on queued outbound bytes.
    ///
    /// Default: 256 KiB
    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.send_queue_capacity = capacity;
        self
    }

    /// Largest declared packet length accepted by the framer.
    ///
    /// Default: 65535
    pub fn max_packet_length(mut self, max: usize) -> Self {
        self.config.max_packet_length = max;
        self
    }

    /// Set `TCP_NODELAY`.
    ///
    /// Default: true
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Timeout for writing one gram.
    ///
    /// Default: 30 seconds
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Hex-dump every packet at `trace` level.
    pub fn log_packets(mut self, enabled: bool) -> Self {
        self.config.log_packets = enabled;
        self
    }

    /// Validate the configuration and build the session.
    pub fn build(self) -> Result<TransportSession> {
        let config = self.config;
        config.validate()?;

        let lengths = self
            .lengths
            .unwrap_or_else(|| Arc::new(PacketLengthTable::new()) as Arc<dyn PacketLengths>);
        let receive_pool = self
            .receive_pool
            .unwrap_or_else(|| shared_pool(config.receive_segment_size, config.pool_segments));
        let packet_pool = self
            .packet_pool
            .unwrap_or_else(|| shared_pool(config.packet_segment_size, config.pool_segments));
        let gram_pool = self
            .gram_pool
            .unwrap_or_else(|| shared_pool(GRAM_SIZE, config.pool_segments));

        let framer = PacketFramer::new(Arc::clone(&lengths), packet_pool)
            .with_max_packet_length(config.max_packet_length);

        Ok(TransportSession {
            inner: Arc::new(SessionInner {
                config,
                lengths,
                framer,
                receive_pool,
                gram_pool,
                inbound: InboundRegistry::new(),
                outbound: OutboundRegistry::new(),
                observers: EventObservers::new(),
                stats: Arc::new(NetStatistics::new()),
                state: Mutex::new(SessionState::Disconnected),
                disposing: AtomicBool::new(true),
                epochs: AtomicU64::new(0),
                connection: Mutex::new(None),
                received: Mutex::new(VecDeque::new()),
                compression: Mutex::new(None),
            }),
        })
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection resources.
struct Connection {
    /// Identifies this connection to its own reader and writer tasks.
    epoch: u64,
    ring: Arc<Mutex<RingBuffer>>,
    pipeline: Arc<SendPipeline>,
    reader: Option<JoinHandle<()>>,
    writer: JoinHandle<()>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

struct SessionInner {
    config: TransportConfig,
    lengths: Arc<dyn PacketLengths>,
    framer: PacketFramer,
    receive_pool: Arc<dyn BufferPool>,
    gram_pool: Arc<dyn BufferPool>,
    inbound: InboundRegistry,
    outbound: OutboundRegistry,
    observers: EventObservers,
    stats: Arc<NetStatistics>,
    state: Mutex<SessionState>,
    /// Set while there is no live connection; checked by both tasks.
    disposing: AtomicBool,
    epochs: AtomicU64,
    connection: Mutex<Option<Connection>>,
    received: Mutex<VecDeque<Packet>>,
    compression: Mutex<Option<DecompressionStage>>,
}

impl SessionInner {
    fn pipeline(&self) -> Option<Arc<SendPipeline>> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| Arc::clone(&c.pipeline))
    }

    /// Push one raw socket chunk into the ring, decompressing if enabled.
    fn receive_chunk(&self, ring: &Mutex<RingBuffer>, chunk: &[u8]) -> Result<()> {
        self.stats.record_received_bytes(chunk.len());

        let mut compression = self.compression.lock();
        match compression.as_mut() {
            Some(stage) => {
                let decoded = stage.process(chunk)?;
                ring.lock().enqueue(decoded);
            }
            None => ring.lock().enqueue(chunk),
        }
        Ok(())
    }

    fn dispatch_received(&self, packet: &Packet) {
        if self.config.log_packets {
            tracing::trace!("\n{}", hex_dump(packet.as_bytes(), false));
        }
        self.observers.emit(&TransportEvent::PacketReceived(packet));
        self.inbound.dispatch(packet);
    }

    /// Whether `epoch` names the live connection.
    fn is_current(&self, epoch: u64) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|c| c.epoch == epoch)
    }

    /// Tear the connection down. Only the first call after a connect does
    /// anything.
    fn disconnect(&self, reason: DisconnectReason) {
        self.disconnect_epoch(None, reason);
    }

    /// Disconnect on behalf of a connection's own task. Ignored once that
    /// connection has been replaced.
    fn disconnect_from(&self, epoch: u64, reason: DisconnectReason) {
        self.disconnect_epoch(Some(epoch), reason);
    }

    fn disconnect_epoch(&self, epoch: Option<u64>, reason: DisconnectReason) {
        let connection = {
            let mut slot = self.connection.lock();
            if let Some(epoch) = epoch {
                if slot.as_ref().map(|c| c.epoch) != Some(epoch) {
                    tracing::debug!(epoch, %reason, "Ignoring failure of a stale connection");
                    return;
                }
            }
            if self.disposing.swap(true, Ordering::AcqRel) {
                return;
            }
            slot.take()
        };
        *self.state.lock() = SessionState::Disconnecting;

        if reason.is_error() {
            tracing::warn!(%reason, "Disconnecting");
        } else {
            tracing::info!("Disconnecting");
        }

        if let Some(conn) = connection {
            conn.pipeline.flush();
            conn.pipeline.shutdown();
            conn.pipeline.clear();
            if let Some(reader) = conn.reader {
                reader.abort();
            }
            conn.ring.lock().clear();
        }

        self.received.lock().clear();
        if let Some(mut stage) = self.compression.lock().take() {
            stage.reset();
        }

        *self.state.lock() = SessionState::Disconnected;
        self.observers.emit(&TransportEvent::Disconnected(&reason));
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.get_mut().take() {
            if let Some(reader) = conn.reader {
                reader.abort();
            }
            conn.writer.abort();
        }
    }
}

/// Reader loop: one read in flight, every chunk pushed into the ring.
async fn run_reader(
    mut reader: OwnedReadHalf,
    session: Weak<SessionInner>,
    epoch: u64,
    ring: Arc<Mutex<RingBuffer>>,
    pool: Arc<dyn BufferPool>,
) {
    let mut segment = PooledSegment::acquire(&pool);

    loop {
        let result = reader.read(segment.buffer_mut()).await;

        let Some(inner) = session.upgrade() else {
            return;
        };
        if inner.disposing.load(Ordering::Acquire) || !inner.is_current(epoch) {
            return;
        }

        match result {
            Ok(0) => {
                tracing::info!("Remote closed the connection");
                inner.disconnect_from(epoch, DisconnectReason::RemoteClosed);
                return;
            }
            Ok(n) => {
                segment.set_len(n);
                if let Err(e) = inner.receive_chunk(&ring, &segment) {
                    tracing::error!(error = %e, "Inbound stream rejected");
                    inner.disconnect_from(epoch, DisconnectReason::from(&e));
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Socket read failed");
                inner.disconnect_from(epoch, DisconnectReason::Io(e.to_string()));
                return;
            }
        }
    }
}

/// A client connection to a game server.
///
/// Cheap to clone; clones share the same connection, handlers and
/// observers.
#[derive(Clone)]
pub struct TransportSession {
    inner: Arc<SessionInner>,
}

impl TransportSession {
    /// Create a new session builder.
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Create a session with default settings and `lengths`.
    pub fn new<L>(lengths: L) -> Result<Self>
    where
        L: PacketLengths + 'static,
    {
        TransportBuilder::new().packet_lengths(lengths).build()
    }

    /// Connect to `host:port`.
    ///
    /// On failure the session fires `Disconnected(ConnectFailed)`, returns
    /// to `Disconnected` and the error is returned.
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::Disconnected {
                return Err(TransportError::InvalidArgument(format!(
                    "cannot connect while {:?}",
                    *state
                )));
            }
            *state = SessionState::Connecting;
        }
        self.inner.disposing.store(false, Ordering::Release);

        tracing::info!(host, port, "Connecting");
        match self.open(host, port).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(host, port, error = %e, "Connect failed");
                self.inner
                    .disconnect(DisconnectReason::ConnectFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn open(&self, host: &str, port: u16) -> Result<()> {
        let inner = &self.inner;

        let addr = resolve_host(host, port).await?;
        let stream = SocketStream::connect(addr, inner.config.nodelay).await?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let ring = Arc::new(Mutex::new(RingBuffer::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = SendQueue::new(Arc::clone(&inner.gram_pool), inner.config.send_queue_capacity);
        let pipeline = Arc::new(SendPipeline::new(queue, tx));
        let epoch = inner.epochs.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut slot = inner.connection.lock();
            if inner.disposing.load(Ordering::Acquire) {
                return Err(TransportError::ConnectionClosed);
            }

            inner.stats.reset();

            let weak = Arc::downgrade(inner);
            let writer = tokio::spawn({
                let pipeline = Arc::clone(&pipeline);
                let stats = Arc::clone(&inner.stats);
                let timeout = inner.config.write_timeout();
                async move {
                    if let Err(e) = run_writer(write_half, rx, pipeline, stats, timeout).await {
                        tracing::error!(epoch, error = %e, "Socket write failed");
                        if let Some(inner) = weak.upgrade() {
                            inner.disconnect_from(epoch, DisconnectReason::from(&e));
                        }
                    }
                }
            });

            *slot = Some(Connection {
                epoch,
                ring: Arc::clone(&ring),
                pipeline,
                reader: None,
                writer,
                local_addr,
                peer_addr,
            });
            *inner.state.lock() = SessionState::Connected;
        }

        tracing::info!(%peer_addr, %local_addr, "Connected");
        inner.observers.emit(&TransportEvent::Connected);

        let reader = tokio::spawn(run_reader(
            read_half,
            Arc::downgrade(inner),
            epoch,
            ring,
            Arc::clone(&inner.receive_pool),
        ));
        match inner.connection.lock().as_mut() {
            Some(conn) if conn.epoch == epoch => conn.reader = Some(reader),
            // Disconnected from inside a Connected observer
            _ => reader.abort(),
        }

        Ok(())
    }

    /// Disconnect. Does nothing when already disconnected.
    pub fn disconnect(&self) {
        self.inner.disconnect(DisconnectReason::Requested);
    }

    /// Frame everything buffered, dispatch received packets, then flush.
    ///
    /// Returns the number of packets dispatched. A framing desync
    /// disconnects the session and is returned as an error.
    pub fn update(&self) -> Result<usize> {
        let inner = &self.inner;

        let ring = inner
            .connection
            .lock()
            .as_ref()
            .map(|c| Arc::clone(&c.ring));

        if let Some(ring) = ring {
            let framed = {
                let mut ring = ring.lock();
                inner.framer.extract_all(&mut ring)
            };
            match framed {
                Ok(packets) => {
                    if !packets.is_empty() {
                        tracing::debug!(count = packets.len(), "Framed packets");
                    }
                    inner.stats.record_received_packets(packets.len());
                    inner.received.lock().extend(packets);
                }
                Err(e) => {
                    inner.disconnect(DisconnectReason::from(&e));
                    return Err(e);
                }
            }
        }

        let mut dispatched = 0;
        loop {
            let packet = inner.received.lock().pop_front();
            let Some(packet) = packet else {
                break;
            };
            inner.dispatch_received(&packet);
            dispatched += 1;
        }

        self.flush();
        Ok(dispatched)
    }

    /// Send one complete packet (header included).
    ///
    /// Outbound handlers for the packet id run first and may filter it;
    /// `PacketSent` fires only once the packet is queued. Exceeding the send
    /// queue cap disconnects the session and returns the error.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(TransportError::InvalidArgument("empty packet".into()));
        }
        let inner = &self.inner;
        if inner.pipeline().is_none() {
            return Err(TransportError::NotConnected);
        }

        let mut packet = Packet::from_slice_with(data, inner.lengths.as_ref());
        inner.outbound.dispatch(&mut packet);
        if packet.is_filtered() {
            tracing::debug!(id = packet.id(), "Outbound packet filtered");
            return Ok(());
        }

        // A handler may have disconnected the session
        let pipeline = match inner.pipeline() {
            Some(pipeline) if !inner.disposing.load(Ordering::Acquire) => pipeline,
            _ => return Err(TransportError::NotConnected),
        };

        match pipeline.enqueue(packet.as_bytes()) {
            Ok(()) => {
                inner.stats.record_sent_packet();
                if inner.config.log_packets {
                    tracing::trace!("\n{}", hex_dump(packet.as_bytes(), true));
                }
                inner.observers.emit(&TransportEvent::PacketSent(&packet));
                Ok(())
            }
            Err(e) => {
                inner.disconnect(DisconnectReason::from(&e));
                Err(e)
            }
        }
    }

    /// Serialize and send a packet built with a [`PacketWriter`].
    pub fn send_packet(&self, writer: &PacketWriter) -> Result<()> {
        let bytes = writer.to_bytes()?;
        self.send(&bytes)
    }

    /// Start writing a trailing partial gram if nothing is in flight.
    pub fn flush(&self) {
        if let Some(pipeline) = self.inner.pipeline() {
            pipeline.flush();
        }
    }

    /// Queue a packet as if it had been received; dispatched on the next
    /// [`update`](Self::update).
    pub fn inject_received(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(TransportError::InvalidArgument("empty packet".into()));
        }
        if !self.is_connected() {
            tracing::error!("Attempt to inject a packet into a dead session");
            return Err(TransportError::NotConnected);
        }

        let packet = Packet::from_slice_with(data, self.inner.lengths.as_ref());
        self.inner.received.lock().push_back(packet);
        self.inner.stats.record_received_packet();
        Ok(())
    }

    /// Decompress all further inbound bytes with `decompressor`.
    ///
    /// Compression ends with the connection.
    pub fn enable_compression(&self, decompressor: Box<dyn ChunkDecompressor>) -> Result<()> {
        if self.inner.connection.lock().is_none() {
            return Err(TransportError::NotConnected);
        }
        let staging = PooledSegment::acquire(&self.inner.receive_pool);
        *self.inner.compression.lock() = Some(DecompressionStage::new(decompressor, staging));
        tracing::debug!("Compression enabled");
        Ok(())
    }

    /// Whether inbound decompression is active.
    pub fn is_compression_enabled(&self) -> bool {
        self.inner.compression.lock().is_some()
    }

    /// Register a handler for received packets with `id`.
    pub fn on_packet<F>(&self, id: u8, handler: F) -> HandlerId
    where
        F: Fn(&mut PacketReader<'_>) + Send + Sync + 'static,
    {
        self.inner.inbound.register(id, handler)
    }

    /// Remove a received-packet handler.
    pub fn remove_packet_handler(&self, id: u8, handler: HandlerId) -> bool {
        self.inner.inbound.unregister(id, handler)
    }

    /// Register a handler for outgoing packets with `id`. It may call
    /// [`Packet::filter`] to stop the packet from being sent.
    pub fn on_packet_sent<F>(&self, id: u8, handler: F) -> HandlerId
    where
        F: Fn(&mut Packet) + Send + Sync + 'static,
    {
        self.inner.outbound.register(id, handler)
    }

    /// Remove an outgoing-packet handler.
    pub fn remove_sent_handler(&self, id: u8, handler: HandlerId) -> bool {
        self.inner.outbound.unregister(id, handler)
    }

    /// Observe lifecycle and packet events.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&TransportEvent<'_>) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(observer)
    }

    /// Stop observing.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Traffic counters of the current (or last) connection.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Live traffic counters.
    pub fn stats(&self) -> &NetStatistics {
        &self.inner.stats
    }

    /// Local socket address while connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.connection.lock().as_ref().map(|c| c.local_addr)
    }

    /// Remote socket address while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.connection.lock().as_ref().map(|c| c.peer_addr)
    }

    /// Outbound bytes counted against the send queue cap.
    pub fn queued_bytes(&self) -> usize {
        self.inner.pipeline().map_or(0, |p| p.queued_bytes())
    }

    /// Whether a gram write is in flight.
    pub fn is_sending(&self) -> bool {
        self.inner.pipeline().is_some_and(|p| p.is_sending())
    }

    /// Active configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("state", &self.state())
            .field("peer_addr", &self.peer_addr())
            .field("compression", &self.is_compression_enabled())
            .finish()
    }
}
