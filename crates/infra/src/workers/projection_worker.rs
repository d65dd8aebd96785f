use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use stockledger_core::TenantId;
use stockledger_events::{EventBus, EventEnvelope, Subscription};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic projection worker loop.
///
/// Subscribes to a bus and hands every envelope to an idempotent handler.
/// Handler errors are logged and the loop keeps going.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread. When `tenant_id` is set, other tenants' envelopes are skipped.
    pub fn spawn<P, B, H, E>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        P: Send + 'static,
        B: EventBus<EventEnvelope<P>> + Send + Sync + 'static,
        H: FnMut(EventEnvelope<P>) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;
        info!(worker = name, "projection worker started");

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<P, H, E>(
    name: &'static str,
    sub: Subscription<EventEnvelope<P>>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    H: FnMut(EventEnvelope<P>) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if tenant_id.is_some_and(|t| envelope.tenant_id() != t) {
                    continue;
                }
                let aggregate_id = envelope.aggregate_id();
                if let Err(err) = handler(envelope) {
                    warn!(worker = name, %aggregate_id, error = %err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(worker = name, "projection worker stopped");
}
