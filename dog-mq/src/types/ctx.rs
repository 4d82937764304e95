use tokio::sync::watch;
use tokio::time::Instant;

/// Context handed to a handler for one delivery
///
/// Carries the call deadline and the queue-wide shutdown signal. Shutdown does
/// not interrupt a running handler; long handlers may poll it and wind down.
#[derive(Debug, Clone)]
pub struct HandlerCtx {
    deadline: Instant,
    shutdown: watch::Receiver<bool>,
}

impl HandlerCtx {
    pub(crate) fn new(deadline: Instant, shutdown: watch::Receiver<bool>) -> Self {
        Self { deadline, shutdown }
    }

    /// Instant after which the call is abandoned and treated as a failure
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Check if the queue is shutting down
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait until the queue starts shutting down
    pub async fn shutdown_requested(&mut self) {
        // A dropped sender also means shutdown
        let _ = self.shutdown.wait_for(|stop| *stop).await;
    }
}
