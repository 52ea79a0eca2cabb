//! Store-backed index for durable-session subscriptions.
//!
//! The authoritative state lives in the remote store shared by every node:
//! a global set of topic filters, a per-topic hash of clientId -> qos, and a
//! per-client set of topics. An optional inner cache mirrors the first two
//! locally so the publish hot path never waits on the store.
//!
//! Cache coherency: local mutations update the mirror synchronously once the
//! store writes succeed (before the cluster broadcast, so the next local
//! lookup already sees them); peer mutations arrive through the cluster
//! inbound path and converge through the same cache helpers.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures_util::future::try_join_all;
use smallvec::SmallVec;
use tracing::{error, info, warn};

use crate::config::StoreConfig;
use crate::store::{RemoteStore, StoreError};
use crate::topic::topic_matches_filter;

use super::{ClientSub, QoS};

/// Local mirror of the durable topic set and per-topic subscriber sets.
#[derive(Default)]
struct InnerCache {
    topics: DashSet<Arc<str>>,
    topic_clients: DashMap<Arc<str>, DashSet<ClientSub>>,
}

pub struct PersistentIndex {
    store: Arc<dyn RemoteStore>,
    keys: StoreConfig,
    cache: Option<InnerCache>,
}

impl PersistentIndex {
    pub fn new(store: Arc<dyn RemoteStore>, keys: StoreConfig, enable_cache: bool) -> Self {
        Self {
            store,
            keys,
            cache: enable_cache.then(InnerCache::default),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    fn topic_key(&self, topic: &str) -> String {
        format!("{}{}", self.keys.topic_prefix, topic)
    }

    fn client_key(&self, client_id: &str) -> String {
        format!("{}{}", self.keys.client_topics_prefix, client_id)
    }

    /// Load the full topic set and every per-topic hash into the cache.
    ///
    /// Must complete before lookups are served; a half-populated cache would
    /// silently drop subscribers.
    pub async fn init_cache(&self) -> Result<(), StoreError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let topics = self.store.set_members(&self.keys.topic_set_key).await?;
        let count = topics.len();
        for topic in topics {
            let entries = self.store.hash_entries(&self.topic_key(&topic)).await?;
            let topic: Arc<str> = topic.into();
            cache.topics.insert(topic.clone());
            let subs = cache.topic_clients.entry(topic.clone()).or_default();
            for (client_id, qos) in entries {
                match QoS::from_store_value(&qos) {
                    Some(q) => {
                        subs.insert(ClientSub::new(client_id, q, topic.clone(), false));
                    }
                    None => warn!(
                        "skipping stored subscription '{}' on '{}' with invalid qos '{}'",
                        client_id, topic, qos
                    ),
                }
            }
        }
        info!("inner cache loaded: {} durable topic filters", count);
        Ok(())
    }

    /// Persist one subscription: per-topic hash entry, global topic set
    /// membership, and the client's topic set, written concurrently and
    /// awaited together.
    ///
    /// Any sub-operation failing fails the whole call. Partial state may
    /// remain in the store; a retry is idempotent and heals it.
    pub async fn add(&self, sub: &ClientSub) -> Result<(), StoreError> {
        let qos = (sub.qos as u8).to_string();
        let topic_key = self.topic_key(&sub.topic);
        let client_key = self.client_key(&sub.client_id);

        tokio::try_join!(
            self.store.hash_put(&topic_key, &sub.client_id, &qos),
            self.store.set_add(&self.keys.topic_set_key, &sub.topic),
            self.store.set_add(&client_key, &sub.topic),
        )?;

        self.cache_subscribe(sub.clone());
        Ok(())
    }

    /// Remove the client from each topic's hash, then from the client's
    /// topic set. Emptied topic hashes are left in place; pruning of the
    /// global topic set is driven by the topic-deletion cluster event.
    pub async fn remove(&self, client_id: &str, topics: &[String]) -> Result<(), StoreError> {
        let topic_keys: Vec<String> = topics.iter().map(|t| self.topic_key(t)).collect();
        try_join_all(
            topic_keys
                .iter()
                .map(|key| self.store.hash_remove(key, client_id)),
        )
        .await?;
        self.store
            .set_remove(&self.client_key(client_id), topics)
            .await?;

        self.cache_unsubscribe(client_id, topics);
        Ok(())
    }

    /// Read and delete the client's topic set, returning the topics that
    /// were held so the caller can run the unsubscribe path over them.
    pub async fn clear_client(&self, client_id: &str) -> Result<Vec<String>, StoreError> {
        let client_key = self.client_key(client_id);
        let topics = self.store.set_members(&client_key).await?;
        self.store.set_delete(&client_key).await?;
        Ok(topics)
    }

    /// All durable subscriptions whose filter matches the concrete topic.
    ///
    /// Served entirely from the inner cache when enabled; otherwise the
    /// global topic set is enumerated from the store and each surviving
    /// filter's hash fetched.
    pub async fn match_topics(&self, topic: &str) -> Result<SmallVec<[ClientSub; 8]>, StoreError> {
        if let Some(cache) = &self.cache {
            let mut out = SmallVec::new();
            for filter in cache.topics.iter() {
                if !topic_matches_filter(topic, filter.key()) {
                    continue;
                }
                if let Some(subs) = cache.topic_clients.get(filter.key().as_ref()) {
                    for sub in subs.iter() {
                        out.push(sub.key().clone());
                    }
                }
            }
            return Ok(out);
        }

        let mut out = SmallVec::new();
        let filters = self.store.set_members(&self.keys.topic_set_key).await?;
        for filter in filters {
            if !topic_matches_filter(topic, &filter) {
                continue;
            }
            let entries = self.store.hash_entries(&self.topic_key(&filter)).await?;
            let filter: Arc<str> = filter.into();
            for (client_id, qos) in entries {
                match QoS::from_store_value(&qos) {
                    Some(q) => out.push(ClientSub::new(client_id, q, filter.clone(), false)),
                    None => warn!(
                        "skipping stored subscription '{}' on '{}' with invalid qos '{}'",
                        client_id, filter, qos
                    ),
                }
            }
        }
        Ok(out)
    }

    /// Topics the client holds in the store.
    pub async fn client_topics(&self, client_id: &str) -> Result<Vec<String>, StoreError> {
        self.store.set_members(&self.client_key(client_id)).await
    }

    /// Prune a topic from the global topic set (best-effort) and evict it
    /// from the cache. Driven by the topic-deletion cluster event.
    pub async fn remove_topic(&self, topic: &str) {
        let members = [topic.to_string()];
        if let Err(e) = self
            .store
            .set_remove(&self.keys.topic_set_key, &members)
            .await
        {
            error!("failed to prune topic '{}' from the topic set: {}", topic, e);
        }
        if let Some(cache) = &self.cache {
            cache.topics.remove(topic);
            cache.topic_clients.remove(topic);
        }
    }

    /// Mirror a subscription into the cache (no-op when disabled).
    pub(crate) fn cache_subscribe(&self, sub: ClientSub) {
        let Some(cache) = &self.cache else { return };
        cache.topics.insert(sub.topic.clone());
        let subs = cache.topic_clients.entry(sub.topic.clone()).or_default();
        subs.remove(&sub);
        subs.insert(sub);
    }

    /// Mirror an unsubscribe into the cache (no-op when disabled).
    pub(crate) fn cache_unsubscribe(&self, client_id: &str, topics: &[String]) {
        let Some(cache) = &self.cache else { return };
        for topic in topics {
            if let Some(subs) = cache.topic_clients.get(topic.as_str()) {
                subs.remove(&ClientSub::probe(client_id, topic.as_str()));
            }
        }
    }
}
