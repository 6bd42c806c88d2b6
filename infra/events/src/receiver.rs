use crate::bus::Event;
use std::any::type_name;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Lag-tolerant receive for bus subscribers.
pub trait EventReceiverExt<T> {
    /// Waits for the next event, skipping over anything lost to lag.
    ///
    /// Resolves to `None` once the bus is shut down.
    fn next_event(&mut self) -> impl Future<Output = Option<Arc<T>>> + Send;
}

impl<T: Event> EventReceiverExt<T> for broadcast::Receiver<Arc<T>> {
    async fn next_event(&mut self) -> Option<Arc<T>> {
        let mut skipped = 0u64;
        loop {
            match self.recv().await {
                Ok(event) => {
                    if skipped > 0 {
                        warn!(event = type_name::<T>(), skipped, "Subscriber lagged; events lost");
                    }
                    return Some(event);
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    skipped = skipped.saturating_add(n);
                    debug!(event = type_name::<T>(), skipped = n, "Subscriber lagging");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
