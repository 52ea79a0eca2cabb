//! Index for `$SYS/...` subscriptions.
//!
//! System topics are a broker-local concern: subscriptions here are never
//! written to the remote store and never broadcast to peers, so the index is
//! a single concurrent map of filter -> subscriber set.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use smallvec::SmallVec;

use crate::topic::topic_matches_filter;

use super::ClientSub;

#[derive(Default)]
pub struct SysTopicIndex {
    clients: DashMap<Arc<str>, DashSet<ClientSub>>,
}

impl SysTopicIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription, replacing any prior record for the same
    /// `(client, topic)` pair.
    pub fn add(&self, sub: ClientSub) {
        let subs = self.clients.entry(sub.topic.clone()).or_default();
        subs.remove(&sub);
        subs.insert(sub);
    }

    /// Remove a client's subscriptions to the given filters.
    pub fn remove(&self, client_id: &str, topics: &[String]) {
        for topic in topics {
            if let Some(subs) = self.clients.get(topic.as_str()) {
                subs.remove(&ClientSub::probe(client_id, topic.as_str()));
            }
        }
    }

    /// Remove the client from every filter entry.
    pub fn clear_client(&self, client_id: &str) {
        for entry in self.clients.iter() {
            entry
                .value()
                .remove(&ClientSub::probe(client_id, entry.key().clone()));
        }
    }

    /// All subscriptions whose filter matches the concrete topic.
    pub fn match_topics(&self, topic: &str) -> SmallVec<[ClientSub; 8]> {
        let mut out = SmallVec::new();
        for entry in self.clients.iter() {
            if topic_matches_filter(topic, entry.key()) {
                for sub in entry.value().iter() {
                    out.push(sub.key().clone());
                }
            }
        }
        out
    }
}
