//! Pool of message-consuming workers.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::ingress::{BusMessage, Ingress};
use crate::orchestrator::EventHandler;
use crate::services::dead_letter::DeadLetterSink;

/// N tokio tasks pulling from one shared channel.
///
/// Each message is delivered by exactly one worker; different workers run
/// concurrently. The pool winds down once every sender has been dropped and
/// the channel is drained.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks (at least one) on the current runtime.
    pub fn spawn<H, D>(
        ingress: Arc<Ingress<H, D>>,
        receiver: mpsc::Receiver<BusMessage>,
        workers: usize,
    ) -> Self
    where
        H: EventHandler + ?Sized + 'static,
        D: DeadLetterSink + 'static,
    {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|worker| {
                let ingress = Arc::clone(&ingress);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    tracing::debug!(worker, "worker started");
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(message) = next else { break };
                        ingress.deliver(message).await;
                    }
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to finish.
    pub async fn join(self) {
        for result in futures_util::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker task failed");
            }
        }
    }
}
