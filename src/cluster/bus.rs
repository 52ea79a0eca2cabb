//! Cluster event bus abstraction.
//!
//! Subscription events travel between nodes over a named-channel
//! publish/subscribe bus carrying opaque bytes. The trait keeps the index
//! independent of the transport; deployments plug in Redis pub/sub, NATS or
//! similar, while tests and single-process clusters use [`MemoryBus`].

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Errors publishing to or subscribing on the bus
#[derive(Debug)]
pub enum BusError {
    /// The channel or connection is gone
    Closed(String),
    /// Transport-level publish failure
    Publish(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(e) => write!(f, "bus closed: {}", e),
            Self::Publish(e) => write!(f, "bus publish failed: {}", e),
        }
    }
}

impl std::error::Error for BusError {}

/// Named-channel byte bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload to every subscriber of `channel`. Best-effort:
    /// delivery is not acknowledged.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError>;

    /// Subscribe to `channel`, receiving every payload published after this
    /// call returns.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<Bytes>, BusError>;
}

/// In-process implementation of [`EventBus`].
///
/// Fans out to every subscriber of a channel, including one owned by the
/// publishing node itself. That mirrors an echoing transport, which is the
/// harder case for loop suppression.
pub struct MemoryBus {
    channels: DashMap<String, Vec<mpsc::Sender<Bytes>>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            capacity: 256,
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        // Snapshot the subscriber list so no map shard lock is held across
        // the sends below.
        let senders: Vec<mpsc::Sender<Bytes>> = match self.channels.get_mut(channel) {
            Some(mut entry) => {
                entry.retain(|tx| !tx.is_closed());
                entry.clone()
            }
            None => return Ok(()),
        };

        for tx in senders {
            // A full or dropped receiver only loses the message for that
            // subscriber; the bus contract is best-effort.
            let _ = tx.send(payload.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<Bytes>, BusError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.channels.entry(channel.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_fanout_to_all_subscribers() {
        let bus = MemoryBus::new();
        let mut rx1 = bus.subscribe("events").await.unwrap();
        let mut rx2 = bus.subscribe("events").await.unwrap();

        bus.publish("events", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let m1 = timeout(Duration::from_secs(1), rx1.recv()).await.unwrap();
        let m2 = timeout(Duration::from_secs(1), rx2.recv()).await.unwrap();
        assert_eq!(m1.as_deref(), Some(&b"hello"[..]));
        assert_eq!(m2.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = MemoryBus::new();
        let mut rx = bus.subscribe("a").await.unwrap();

        bus.publish("b", Bytes::from_static(b"other"))
            .await
            .unwrap();
        bus.publish("a", Bytes::from_static(b"mine")).await.unwrap();

        let m = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(m.as_deref(), Some(&b"mine"[..]));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryBus::new();
        bus.publish("nobody", Bytes::from_static(b"x"))
            .await
            .unwrap();
    }
}
