use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::trace;

/// Broadcast topic with bounded capacity.
/// `T` must be `Send + Sync` because messages cross from the control thread to the runtime.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send to every current subscriber. Publishing with nobody listening is not an error.
    pub fn publish(&self, msg: T) {
        if self.tx.send(Arc::new(msg)).is_err() {
            trace!("Published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

/// What a non-blocking drain of a receiver found.
#[derive(Debug)]
pub enum Drained<T> {
    /// The newest message; older ones were skipped.
    Latest(Arc<T>),
    Empty,
    /// Every sender is gone and nothing is left to read.
    Closed,
}

/// Read everything queued on `rx` and keep only the newest message.
///
/// Lagging is expected for a slow reader of a fast topic and is skipped over.
pub fn drain_latest<T>(rx: &mut broadcast::Receiver<Arc<T>>) -> Drained<T> {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(msg) => latest = Some(msg),
            Err(TryRecvError::Lagged(skipped)) => trace!(skipped, "Receiver lagged"),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Closed) => {
                if latest.is_none() {
                    return Drained::Closed;
                }
                break;
            }
        }
    }
    latest.map_or(Drained::Empty, Drained::Latest)
}
