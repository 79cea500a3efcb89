//! SSE session binding: a `/messages` POST's response must reach the
//! right `/sse` stream, and responses must appear on that stream in the
//! order their POSTs were accepted — even though dispatch itself runs
//! them concurrently.
//!
//! Ordering is enforced with a ticket queue: accepting a POST reserves a
//! slot by pushing a `oneshot::Receiver` onto an ordered queue before
//! dispatch even starts; a single writer task drains that queue strictly
//! in order, awaiting each ticket before moving to the next one.

use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

/// One event destined for a session's SSE stream.
#[derive(Debug, Clone)]
pub enum SseEvent {
    Message(serde_json::Value),
    Ping,
    Close(String),
}

struct Ticket {
    receiver: oneshot::Receiver<SseEvent>,
}

/// A live `/sse` stream bound to exactly one connection.
pub struct SseSession {
    pub id: String,
    pub connection_id: String,
    ticket_tx: mpsc::UnboundedSender<Ticket>,
    /// Events ready to be written, already in accepted order.
    stream_tx: mpsc::UnboundedSender<SseEvent>,
    /// Taken exactly once by the `/sse` GET handler that owns this
    /// session's stream.
    stream_rx: Mutex<Option<mpsc::UnboundedReceiver<SseEvent>>>,
}

impl SseSession {
    #[must_use]
    pub fn new(connection_id: String) -> Self {
        let (ticket_tx, mut ticket_rx) = mpsc::unbounded_channel::<Ticket>();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel::<SseEvent>();

        let writer_tx = stream_tx.clone();
        tokio::spawn(async move {
            while let Some(ticket) = ticket_rx.recv().await {
                if let Ok(event) = ticket.receiver.await {
                    if writer_tx.send(event).is_err() {
                        break;
                    }
                }
                // A dropped sender (tool panicked mid-flight) simply
                // skips that slot; ordering for the rest is unaffected.
            }
        });

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id,
            ticket_tx,
            stream_tx,
            stream_rx: Mutex::new(Some(stream_rx)),
        }
    }

    /// Reserve the next slot in accepted order. The returned sender must
    /// eventually be used to deliver the response; dropping it without
    /// sending silently skips that slot.
    pub fn reserve(&self) -> Option<oneshot::Sender<SseEvent>> {
        let (tx, rx) = oneshot::channel();
        self.ticket_tx.send(Ticket { receiver: rx }).ok()?;
        Some(tx)
    }

    /// Send an event that does not need accepted-order sequencing
    /// (keepalive pings, the terminal close marker).
    pub fn push_direct(&self, event: SseEvent) {
        let _ = self.stream_tx.send(event);
    }

    /// Take the receiving half that feeds the actual `/sse` HTTP stream.
    /// Returns `None` if already taken — a session's GET stream can only
    /// be consumed once.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<SseEvent>> {
        self.stream_rx.lock().expect("stream_rx mutex poisoned").take()
    }
}
