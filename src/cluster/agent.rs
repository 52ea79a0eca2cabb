//! Cluster agent
//!
//! Broadcasts local subscription mutations on the bus and applies inbound
//! peer events to the local indices. Events from this node are filtered out
//! on receipt (they were applied locally before emission), so the agent is
//! correct whether or not the bus echoes to the publisher.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::subscription::{ClientSub, EphemeralIndex, PersistentIndex, QoS};

use super::bus::{BusError, EventBus};
use super::codec::EventCodec;
use super::event::{EventKind, InternalMessage, SubEvent};

pub struct ClusterAgent {
    broker_id: u32,
    channel: String,
    codec: EventCodec,
    bus: Arc<dyn EventBus>,
}

impl ClusterAgent {
    pub fn new(broker_id: u32, channel: String, codec: EventCodec, bus: Arc<dyn EventBus>) -> Self {
        Self {
            broker_id,
            channel,
            codec,
            bus,
        }
    }

    pub fn broker_id(&self) -> u32 {
        self.broker_id
    }

    /// Broadcast a subscription event to the cluster. Fire-and-forget: local
    /// state is already correct, so publish failures are logged and peers
    /// resync on the next event or cache rebuild.
    pub async fn publish_event(&self, event: SubEvent) {
        let msg = InternalMessage::new(event, self.broker_id);
        let bytes = match self.codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode subscription event: {}", e);
                return;
            }
        };
        if let Err(e) = self.bus.publish(&self.channel, Bytes::from(bytes)).await {
            warn!("failed to publish subscription event: {}", e);
        }
    }

    /// Subscribe to the event channel and spawn the inbound apply loop.
    pub async fn spawn_listener(
        self: Arc<Self>,
        ephemeral: Arc<EphemeralIndex>,
        persistent: Arc<PersistentIndex>,
    ) -> Result<(), BusError> {
        let mut rx = self.bus.subscribe(&self.channel).await?;
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                self.apply(&payload, &ephemeral, &persistent).await;
            }
            debug!("subscription event listener stopped");
        });
        Ok(())
    }

    /// Apply one inbound bus payload to the local indices.
    ///
    /// Malformed payloads and unknown event kinds are logged and dropped;
    /// duplicate delivery is harmless because every mutation is idempotent
    /// under record identity.
    pub(crate) async fn apply(
        &self,
        payload: &[u8],
        ephemeral: &EphemeralIndex,
        persistent: &PersistentIndex,
    ) {
        let msg: InternalMessage<SubEvent> = match self.codec.decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                error!("dropping undecodable subscription event: {}", e);
                return;
            }
        };

        // Our own events were applied before emission
        if msg.broker_id == self.broker_id {
            return;
        }

        let event = msg.data;
        match event.event_kind() {
            Some(EventKind::Sub) => {
                let Some(topic) = event.topic else {
                    error!("dropping subscribe event without a topic");
                    return;
                };
                let Some(qos) = QoS::from_u8(event.qos) else {
                    error!("dropping subscribe event with invalid qos {}", event.qos);
                    return;
                };
                debug!(
                    "peer {} subscribe: client='{}' topic='{}'",
                    msg.broker_id, event.client_id, topic
                );
                let sub = ClientSub::new(event.client_id, qos, topic, event.clean_session);
                if event.clean_session {
                    ephemeral.add(sub);
                } else {
                    // The remote store is already authoritative; only the
                    // local mirror needs the update.
                    persistent.cache_subscribe(sub);
                }
            }
            Some(EventKind::Unsub) => {
                debug!(
                    "peer {} unsubscribe: client='{}' topics={:?}",
                    msg.broker_id, event.client_id, event.topics
                );
                if event.clean_session {
                    ephemeral.remove(&event.client_id, &event.topics);
                } else {
                    persistent.cache_unsubscribe(&event.client_id, &event.topics);
                }
            }
            Some(EventKind::DelTopic) => {
                let Some(topic) = event.topic else {
                    error!("dropping topic-deletion event without a topic");
                    return;
                };
                debug!("peer {} topic deletion: '{}'", msg.broker_id, topic);
                ephemeral.remove_topic(&topic);
                persistent.remove_topic(&topic).await;
            }
            None => error!("dropping subscription event with unknown type {}", event.kind),
        }
    }
}
