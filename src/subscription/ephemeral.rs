//! In-memory index for clean-session subscriptions.
//!
//! Clean sessions trade durability for speed: everything lives in sharded
//! concurrent maps, nothing touches the remote store, and every operation is
//! infallible. The whole index is discarded on process restart.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use smallvec::SmallVec;

use crate::topic::topic_matches_filter;

use super::ClientSub;

/// Concurrent three-way index for ephemeral subscriptions:
/// topic set, topic -> subscribers, client -> topics.
///
/// `topics` may briefly contain a filter whose subscriber set has been
/// emptied; matching tolerates empty sets rather than requiring eager
/// pruning.
#[derive(Default)]
pub struct EphemeralIndex {
    topics: DashSet<Arc<str>>,
    topic_clients: DashMap<Arc<str>, DashSet<ClientSub>>,
    client_topics: DashMap<Arc<str>, DashSet<Arc<str>>>,
}

impl EphemeralIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription, replacing any prior record for the same
    /// `(client, topic)` pair.
    pub fn add(&self, sub: ClientSub) {
        let topic = sub.topic.clone();
        let client = sub.client_id.clone();

        {
            let subs = self.topic_clients.entry(topic.clone()).or_default();
            subs.remove(&sub);
            subs.insert(sub);
        }
        self.topics.insert(topic.clone());
        self.client_topics.entry(client).or_default().insert(topic);
    }

    /// Remove a client's subscriptions to the given topics.
    pub fn remove(&self, client_id: &str, topics: &[String]) {
        for topic in topics {
            if let Some(subs) = self.topic_clients.get(topic.as_str()) {
                subs.remove(&ClientSub::probe(client_id, topic.as_str()));
            }
        }
        if let Some(owned) = self.client_topics.get(client_id) {
            for topic in topics {
                owned.remove(topic.as_str());
            }
        }
    }

    /// Take every topic the client subscribes to and remove the
    /// subscriptions, returning the topics that were held.
    pub fn clear_client(&self, client_id: &str) -> Vec<String> {
        let topics: Vec<String> = match self.client_topics.remove(client_id) {
            Some((_, owned)) => owned.into_iter().map(|t| t.to_string()).collect(),
            None => return Vec::new(),
        };
        self.remove(client_id, &topics);
        topics
    }

    /// All subscriptions whose filter matches the concrete topic.
    pub fn match_topics(&self, topic: &str) -> SmallVec<[ClientSub; 8]> {
        let mut out = SmallVec::new();
        for filter in self.topics.iter() {
            if !topic_matches_filter(topic, filter.key()) {
                continue;
            }
            if let Some(subs) = self.topic_clients.get(filter.key().as_ref()) {
                for sub in subs.iter() {
                    out.push(sub.key().clone());
                }
            }
        }
        out
    }

    /// Drop a topic entirely: the topic set entry, its subscriber set, and
    /// the reverse client -> topic links of every subscriber.
    pub fn remove_topic(&self, topic: &str) {
        self.topics.remove(topic);
        if let Some((_, subs)) = self.topic_clients.remove(topic) {
            for sub in subs {
                if let Some(owned) = self.client_topics.get(sub.client_id.as_ref()) {
                    owned.remove(topic);
                }
            }
        }
    }

    /// Topics the client currently subscribes to.
    pub fn topics_of(&self, client_id: &str) -> Vec<String> {
        self.client_topics
            .get(client_id)
            .map(|owned| owned.iter().map(|t| t.key().to_string()).collect())
            .unwrap_or_default()
    }

    /// Whether the topic set contains the filter.
    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Subscriber count for one filter (zero if absent).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topic_clients
            .get(topic)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}
