//! Task ownership and cooperative shutdown for source loops.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receiving side of a source's shutdown signal.
pub(crate) type Shutdown = watch::Receiver<bool>;

/// The set of tasks a source has spawned, plus the signal that stops them.
pub(crate) struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    pub(crate) fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub(crate) fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.subscribe()
    }

    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
    }

    /// Signals every task and waits for all of them to exit.
    ///
    /// The signal is re-armed afterwards so the source can be started again.
    pub(crate) async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "ingestion task panicked");
                }
            }
        }
        self.shutdown.send_replace(false);
    }
}

/// Resolves once shutdown has been requested (or the sender is gone).
pub(crate) async fn requested(shutdown: &mut Shutdown) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleeps for `duration` unless shutdown arrives first.
///
/// Returns `true` if the caller should exit.
pub(crate) async fn sleep_or_shutdown(shutdown: &mut Shutdown, duration: Duration) -> bool {
    tokio::select! {
        () = requested(shutdown) => true,
        () = tokio::time::sleep(duration) => false,
    }
}
