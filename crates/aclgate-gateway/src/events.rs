//! Single-consumer FIFO for inbound asynchronous notifications.
//!
//! Producers (transport callbacks, process reapers) never run gateway logic
//! themselves; they push here and one worker applies events in arrival order.
//! The queue exposes when it is empty, so callers can wait for it to settle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use aclgate_core::announce::Announcement;
use aclgate_core::protocol::notify::ConnectionStatus;

use crate::app_state::AppState;

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Announcement(Announcement),
    PeerLost { bus_name: String },
    ConnectionStatus { app_id: String, status: ConnectionStatus },
    ProcessExited { pid: u32 },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::Announcement(_) => "announcement",
            GatewayEvent::PeerLost { .. } => "peer_lost",
            GatewayEvent::ConnectionStatus { .. } => "connection_status",
            GatewayEvent::ProcessExited { .. } => "process_exited",
        }
    }
}

#[derive(Default)]
struct QueueShared {
    pending: AtomicUsize,
    idle: Notify,
}

impl QueueShared {
    fn done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    shared: Arc<QueueShared>,
}

pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
    shared: Arc<QueueShared>,
}

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(QueueShared::default());
    (
        EventSender {
            tx,
            shared: Arc::clone(&shared),
        },
        EventReceiver { rx, shared },
    )
}

impl EventSender {
    /// Enqueue without blocking. Events pushed after the worker is gone are dropped.
    pub fn push(&self, event: GatewayEvent) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(kind = e.0.kind(), "event queue closed, event dropped");
            self.shared.done();
        }
    }

    /// Events pushed but not yet fully handled.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Resolve once every event pushed so far has been handled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Spawn the single consumer. Each event is handled to completion on the
/// blocking pool before the next one is taken.
pub fn spawn_worker(mut rx: EventReceiver, state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.rx.recv().await {
            let kind = event.kind();
            let st = state.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || st.handle_event(event)).await {
                tracing::error!(kind, error = %e, "event handler failed");
            }
            rx.shared.done();
        }
        tracing::debug!("event queue closed");
    })
}
