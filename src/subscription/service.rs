//! Subscription service facade.
//!
//! Composes the three indices and the cluster agent behind one API. The
//! clean-session flag of each record picks the lane: ephemeral subscriptions
//! stay in memory, durable ones go through the remote store. Every local
//! mutation that succeeds is broadcast to the cluster (when enabled).

use std::sync::Arc;

use ahash::AHashSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::cluster::{ClusterAgent, EventBus, EventCodec, SubEvent};
use crate::config::Config;
use crate::store::{RemoteStore, StoreError};

use super::{ClientSub, EphemeralIndex, PersistentIndex, SysTopicIndex};

pub struct SubscriptionService {
    ephemeral: Arc<EphemeralIndex>,
    persistent: Arc<PersistentIndex>,
    sys: SysTopicIndex,
    cluster: Option<Arc<ClusterAgent>>,
}

impl SubscriptionService {
    /// Build the service, load the inner cache when enabled, and start the
    /// cluster listener when clustering is enabled.
    ///
    /// Blocks until the cache holds the full durable topic set: serving
    /// lookups from a half-populated cache would silently drop subscribers.
    pub async fn new(
        config: &Config,
        store: Arc<dyn RemoteStore>,
        bus: Option<Arc<dyn EventBus>>,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let ephemeral = Arc::new(EphemeralIndex::new());
        let persistent = Arc::new(PersistentIndex::new(
            store,
            config.store.clone(),
            config.cache.enabled,
        ));
        persistent.init_cache().await?;

        let cluster = if config.cluster.enabled {
            let bus = bus.ok_or("an event bus is required when clustering is enabled")?;
            let agent = Arc::new(ClusterAgent::new(
                config.broker_id,
                config.cluster.channel.clone(),
                EventCodec::new(config.cluster.codec),
                bus,
            ));
            agent
                .clone()
                .spawn_listener(ephemeral.clone(), persistent.clone())
                .await?;
            Some(agent)
        } else {
            None
        };

        Ok(Arc::new(Self {
            ephemeral,
            persistent,
            sys: SysTopicIndex::new(),
            cluster,
        }))
    }

    async fn broadcast(&self, event: SubEvent) {
        if let Some(agent) = &self.cluster {
            agent.publish_event(event).await;
        }
    }

    /// Record a subscription on the lane picked by its clean-session flag,
    /// then broadcast it to the cluster.
    pub async fn subscribe(&self, sub: ClientSub) -> Result<(), StoreError> {
        debug!(
            "subscribe: client='{}' topic='{}' qos={:?} clean_session={}",
            sub.client_id, sub.topic, sub.qos, sub.clean_session
        );
        if sub.clean_session {
            self.ephemeral.add(sub.clone());
        } else {
            self.persistent.add(&sub).await?;
        }
        self.broadcast(SubEvent::sub(&sub)).await;
        Ok(())
    }

    /// Remove a client's subscriptions to the given topics. No-op on an
    /// empty topic list.
    pub async fn unsubscribe(
        &self,
        client_id: &str,
        clean_session: bool,
        topics: Vec<String>,
    ) -> Result<(), StoreError> {
        if topics.is_empty() {
            return Ok(());
        }
        debug!(
            "unsubscribe: client='{}' clean_session={} topics={:?}",
            client_id, clean_session, topics
        );
        if clean_session {
            self.ephemeral.remove(client_id, &topics);
        } else {
            self.persistent.remove(client_id, &topics).await?;
        }
        self.broadcast(SubEvent::unsub(client_id, clean_session, topics))
            .await;
        Ok(())
    }

    /// Every subscription matching the concrete topic, across both lanes,
    /// with at most one record per `(client, topic)` pair.
    pub async fn search_subscribe_client_list(
        &self,
        topic: &str,
    ) -> Result<SmallVec<[ClientSub; 8]>, StoreError> {
        let ephemeral = self.ephemeral.match_topics(topic);
        let persistent = self.persistent.match_topics(topic).await?;

        let mut seen = AHashSet::with_capacity(ephemeral.len() + persistent.len());
        let mut out = SmallVec::new();
        for sub in ephemeral.into_iter().chain(persistent) {
            if seen.insert((sub.client_id.clone(), sub.topic.clone())) {
                out.push(sub);
            }
        }
        Ok(out)
    }

    /// Drop everything the client subscribes to on one lane, broadcasting
    /// the resulting unsubscribe.
    pub async fn clear_client_subscriptions(
        &self,
        client_id: &str,
        clean_session: bool,
    ) -> Result<(), StoreError> {
        let topics = if clean_session {
            self.ephemeral.clear_client(client_id)
        } else {
            self.persistent.clear_client(client_id).await?
        };
        self.unsubscribe(client_id, clean_session, topics).await
    }

    /// Unsubscribe the client from every topic it holds that is not in the
    /// authorized list, on both lanes.
    ///
    /// The held set is the union of the client's durable topic set in the
    /// store and its ephemeral topics, so only actual subscriptions are
    /// revoked.
    pub async fn clear_unauthorized_subscriptions(
        &self,
        client_id: &str,
        authorized: &[String],
    ) -> Result<(), StoreError> {
        let mut held: AHashSet<String> = self
            .persistent
            .client_topics(client_id)
            .await?
            .into_iter()
            .collect();
        held.extend(self.ephemeral.topics_of(client_id));

        let revoke: Vec<String> = held
            .into_iter()
            .filter(|topic| !authorized.contains(topic))
            .collect();
        if revoke.is_empty() {
            return Ok(());
        }
        debug!(
            "revoking unauthorized subscriptions: client='{}' topics={:?}",
            client_id, revoke
        );
        self.unsubscribe(client_id, false, revoke.clone()).await?;
        self.unsubscribe(client_id, true, revoke).await
    }

    // ========================================================================
    // System topics ($SYS/...): local only, never persisted, never broadcast
    // ========================================================================

    pub fn subscribe_sys(&self, sub: ClientSub) {
        self.sys.add(sub);
    }

    pub fn unsubscribe_sys(&self, client_id: &str, topics: &[String]) {
        self.sys.remove(client_id, topics);
    }

    pub fn search_sys_topic_clients(&self, topic: &str) -> SmallVec<[ClientSub; 8]> {
        self.sys.match_topics(topic)
    }

    pub fn clear_client_sys_subscriptions(&self, client_id: &str) {
        self.sys.clear_client(client_id);
    }
}
