use crate::control::{AppliedSummary, ApplyUnit};
use crate::error::{LogCtlError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Identifier of a worker link, unique within one controller run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl WorkerId {
    /// The controller's own execution context
    pub const LOCAL: WorkerId = WorkerId(0);

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery of apply units to one remote worker
pub trait WorkerTransport: Send + 'static {
    /// Send the unit and wait for the worker to report what it applied
    fn deliver(&mut self, unit: ApplyUnit) -> impl Future<Output = Result<AppliedSummary>> + Send;
}

enum Outbound {
    Apply(ApplyUnit),
    Drain(oneshot::Sender<()>),
}

/// Handle on a connected worker
///
/// Remote links own a FIFO queue drained by a dedicated task, so units reach
/// each worker in the order they were sent and a slow worker never holds up
/// the sender. The local link has no queue: the controller applies its own
/// configuration directly.
#[derive(Clone)]
pub struct WorkerLink {
    id: WorkerId,
    name: Arc<str>,
    connected_at: SystemTime,
    queue: Option<mpsc::UnboundedSender<Outbound>>,
}

impl WorkerLink {
    /// Link standing for the controller process itself
    pub fn local(name: &str) -> Self {
        Self {
            id: WorkerId::LOCAL,
            name: Arc::from(name),
            connected_at: SystemTime::now(),
            queue: None,
        }
    }

    /// Start the delivery task for a remote worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T: WorkerTransport>(id: WorkerId, name: &str, transport: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let name: Arc<str> = Arc::from(name);
        tokio::spawn(Self::delivery_task(id, Arc::clone(&name), transport, rx));

        Self {
            id,
            name,
            connected_at: SystemTime::now(),
            queue: Some(tx),
        }
    }

    async fn delivery_task<T: WorkerTransport>(
        id: WorkerId,
        name: Arc<str>,
        mut transport: T,
        mut rx: mpsc::UnboundedReceiver<Outbound>,
    ) {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Apply(unit) => {
                    let channel = unit.channel;
                    let generation = unit.generation;
                    match transport.deliver(unit).await {
                        Ok(summary) => debug!(
                            "Worker {} ({}) applied {} generation {}: {} installed, {} reverted",
                            name, id, channel, generation, summary.installed, summary.reverted
                        ),
                        Err(e) => warn!(
                            "Failed to deliver {} generation {} to worker {} ({}): {}",
                            channel, generation, name, id, e
                        ),
                    }
                }
                Outbound::Drain(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Delivery queue for worker {} ({}) closed", name, id);
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn is_local_controller(&self) -> bool {
        self.queue.is_none()
    }

    /// Queue a unit for delivery without waiting for it
    pub fn send(&self, unit: ApplyUnit) -> Result<()> {
        let queue = self.queue.as_ref().ok_or_else(|| {
            LogCtlError::Internal("The local controller link has no delivery queue".to_string())
        })?;

        queue.send(Outbound::Apply(unit)).map_err(|_| {
            LogCtlError::DeliveryError(self.name.to_string(), "worker disconnected".to_string())
        })
    }

    /// Resolve once everything queued before this call was handed to the transport
    pub async fn drain(&self) {
        let Some(queue) = &self.queue else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if queue.send(Outbound::Drain(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.queue.as_ref().map_or(false, |q| q.is_closed())
    }
}

impl std::fmt::Debug for WorkerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLink")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("local", &self.is_local_controller())
            .finish()
    }
}
