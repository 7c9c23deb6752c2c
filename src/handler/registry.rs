//! Handler registry for dispatching packets by id.
//!
//! Each of the 256 packet ids maps to an insertion-ordered list of
//! handlers. Registration returns a [`HandlerId`] used to remove the
//! handler again.
//!
//! Dispatch copies the handler list for the id under the registry lock and
//! invokes the handlers after releasing it, so a handler may register or
//! unregister handlers (the change applies from the next dispatch on).
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use shardwire::handler::InboundRegistry;
//! use shardwire::protocol::Packet;
//!
//! let registry = InboundRegistry::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let counter = seen.clone();
//! registry.register(0x73, move |reader| {
//!     counter.fetch_add(reader.remaining(), Ordering::SeqCst);
//! });
//!
//! let packet = Packet::from_slice(&[0x73, 1, 2, 3], false);
//! assert_eq!(registry.dispatch(&packet), 1);
//! assert_eq!(seen.load(Ordering::SeqCst), 3);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::{Packet, PacketReader};

/// Handler for received packets. Receives a reader positioned at the payload.
pub type InboundHandler = dyn Fn(&mut PacketReader<'_>) + Send + Sync;

/// Handler for packets about to be sent. May call [`Packet::filter`] to drop it.
pub type OutboundHandler = dyn Fn(&mut Packet) + Send + Sync;

/// Registry for received packets.
pub type InboundRegistry = DispatchRegistry<InboundHandler>;

/// Registry for sent packets.
pub type OutboundRegistry = DispatchRegistry<OutboundHandler>;

/// Token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Packet id → ordered handler list.
pub struct PacketHandlerTable<H: ?Sized> {
    slots: Vec<Vec<(HandlerId, Arc<H>)>>,
    next_id: u64,
}

impl<H: ?Sized> PacketHandlerTable<H> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: (0..256).map(|_| Vec::new()).collect(),
            next_id: 1,
        }
    }

    /// Append a handler for `id`.
    pub fn register(&mut self, id: u8, handler: Arc<H>) -> HandlerId {
        let handle = HandlerId(self.next_id);
        self.next_id += 1;
        self.slots[id as usize].push((handle, handler));
        handle
    }

    /// Remove a handler. Returns false if it was not registered for `id`.
    pub fn unregister(&mut self, id: u8, handle: HandlerId) -> bool {
        let slot = &mut self.slots[id as usize];
        match slot.iter().position(|(h, _)| *h == handle) {
            Some(pos) => {
                slot.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Handlers for `id` in registration order.
    pub fn handlers(&self, id: u8) -> impl Iterator<Item = &Arc<H>> {
        self.slots[id as usize].iter().map(|(_, h)| h)
    }

    /// Number of handlers for `id`.
    #[inline]
    pub fn len(&self, id: u8) -> usize {
        self.slots[id as usize].len()
    }

    /// Whether no handler is registered for any id.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    /// Remove every handler.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(Vec::clear);
    }
}

impl<H: ?Sized> Default for PacketHandlerTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper around a [`PacketHandlerTable`].
pub struct DispatchRegistry<H: ?Sized> {
    table: Mutex<PacketHandlerTable<H>>,
}

impl<H: ?Sized> DispatchRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(PacketHandlerTable::new()),
        }
    }

    /// Register an already shared handler.
    pub fn register_shared(&self, id: u8, handler: Arc<H>) -> HandlerId {
        self.table.lock().register(id, handler)
    }

    /// Remove a handler.
    pub fn unregister(&self, id: u8, handle: HandlerId) -> bool {
        self.table.lock().unregister(id, handle)
    }

    /// Number of handlers for `id`.
    pub fn handler_count(&self, id: u8) -> usize {
        self.table.lock().len(id)
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.table.lock().clear();
    }

    fn snapshot(&self, id: u8) -> Vec<Arc<H>> {
        self.table.lock().handlers(id).cloned().collect()
    }
}

impl DispatchRegistry<InboundHandler> {
    /// Register a handler for received packets with `id`.
    pub fn register<F>(&self, id: u8, handler: F) -> HandlerId
    where
        F: Fn(&mut PacketReader<'_>) + Send + Sync + 'static,
    {
        self.register_shared(id, Arc::new(handler))
    }

    /// Run every handler for the packet's id. Returns how many ran.
    ///
    /// Each handler gets its own reader starting at the payload.
    pub fn dispatch(&self, packet: &Packet) -> usize {
        let handlers = self.snapshot(packet.id());
        for handler in &handlers {
            let mut reader = packet.reader();
            handler(&mut reader);
        }
        handlers.len()
    }
}

impl DispatchRegistry<OutboundHandler> {
    /// Register a handler for sent packets with `id`.
    pub fn register<F>(&self, id: u8, handler: F) -> HandlerId
    where
        F: Fn(&mut Packet) + Send + Sync + 'static,
    {
        self.register_shared(id, Arc::new(handler))
    }

    /// Run every handler for the packet's id. Returns how many ran.
    ///
    /// All handlers run even after one filters the packet.
    pub fn dispatch(&self, packet: &mut Packet) -> usize {
        let handlers = self.snapshot(packet.id());
        for handler in &handlers {
            handler(packet);
        }
        handlers.len()
    }
}

impl<H: ?Sized> Default for DispatchRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for DispatchRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        let registered: usize = table.slots.iter().map(Vec::len).sum();
        f.debug_struct("DispatchRegistry")
            .field("registered", &registered)
            .finish()
    }
}
