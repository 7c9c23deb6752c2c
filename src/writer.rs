//! Dedicated writer task for outbound grams.
//!
//! The session never writes to the socket itself. Ready grams are handed
//! to a per-connection writer task over an mpsc channel; the task writes
//! one gram at a time and, after each completed write, asks the
//! [`SendPipeline`] for the next one.
//!
//! # Architecture
//!
//! ```text
//! send() ─► SendPipeline ─┬─ queue lock ─► SendQueue
//!                         └─ mpsc::UnboundedSender<WriterCommand> ─► Writer Task ─► socket
//!                                                                         │
//!                              next gram (sending lock, then queue lock) ◄┘
//! ```
//!
//! At most one gram is in flight. The sending flag lives behind its own
//! lock, and whenever both locks are held the sending lock is taken first.
//! The queue lock is never held across a socket write.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::send_queue::{Gram, SendQueue};
use crate::stats::NetStatistics;

/// Message to the writer task.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// Write these bytes, then keep pulling grams from the pipeline.
    Transmit(Bytes),
    /// Shut the write half down and stop.
    Shutdown,
}

/// Send-side state of one connection: the queue, the in-flight flag and
/// the channel to the writer task.
pub(crate) struct SendPipeline {
    sending: Mutex<bool>,
    queue: Mutex<SendQueue>,
    tx: mpsc::UnboundedSender<WriterCommand>,
}

#[inline]
fn copy_gram(gram: &Gram) -> Bytes {
    Bytes::copy_from_slice(gram.as_bytes())
}

impl SendPipeline {
    pub(crate) fn new(queue: SendQueue, tx: mpsc::UnboundedSender<WriterCommand>) -> Self {
        Self {
            sending: Mutex::new(false),
            queue: Mutex::new(queue),
            tx,
        }
    }

    /// Copy `data` into the queue and start a write if the writer is idle.
    pub(crate) fn enqueue(&self, data: &[u8]) -> Result<()> {
        let mut sending = self.sending.lock();
        let ready = {
            let mut queue = self.queue.lock();
            queue.enqueue(data)?.map(copy_gram)
        };

        if let Some(bytes) = ready {
            if !*sending {
                *sending = true;
                self.transmit(bytes)?;
            }
        }
        Ok(())
    }

    /// Promote a trailing partial gram and write it if the writer is idle.
    ///
    /// Returns true when a write was started.
    pub(crate) fn flush(&self) -> bool {
        let mut sending = self.sending.lock();
        if *sending {
            return false;
        }

        let ready = self.queue.lock().check_flush_ready().map(copy_gram);
        match ready {
            Some(bytes) => {
                *sending = true;
                self.transmit(bytes).is_ok()
            }
            None => false,
        }
    }

    /// Called by the writer after a gram was written. Releases it and
    /// returns the next gram to write, clearing the sending flag when there
    /// is none.
    pub(crate) fn complete(&self) -> Option<Bytes> {
        let mut sending = self.sending.lock();
        let mut queue = self.queue.lock();

        let next = queue.dequeue().map(copy_gram);
        let next = next.or_else(|| queue.check_flush_ready().map(copy_gram));
        if next.is_none() {
            *sending = false;
        }
        next
    }

    /// Release every queued gram.
    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Ask the writer task to shut the socket down.
    pub(crate) fn shutdown(&self) {
        // The task may already be gone after a write error.
        let _ = self.tx.send(WriterCommand::Shutdown);
    }

    /// Whether a write is in flight.
    pub(crate) fn is_sending(&self) -> bool {
        *self.sending.lock()
    }

    /// Bytes counted against the queue cap.
    pub(crate) fn queued_bytes(&self) -> usize {
        self.queue.lock().queued_bytes()
    }

    fn transmit(&self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(WriterCommand::Transmit(bytes))
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Writer loop. Returns `Ok` on shutdown or when the channel closes,
/// `Err` on the first failed or timed-out write.
pub(crate) async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    pipeline: Arc<SendPipeline>,
    stats: Arc<NetStatistics>,
    write_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Transmit(mut bytes) => loop {
                write_gram(&mut writer, &bytes, write_timeout).await?;
                stats.record_sent_bytes(bytes.len());

                match pipeline.complete() {
                    Some(next) => bytes = next,
                    None => break,
                }
            },
            WriterCommand::Shutdown => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(error = %e, "Socket shutdown failed");
                }
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn write_gram<W>(writer: &mut W, bytes: &[u8], write_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(write_timeout, writer.write_all(bytes)).await {
        Ok(result) => result.map_err(TransportError::from),
        Err(_) => Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("gram write exceeded {:?}", write_timeout),
        ))),
    }
}
