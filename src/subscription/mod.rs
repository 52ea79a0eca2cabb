//! Subscription index
//!
//! Maps between topic filters and subscribing clients and answers the
//! topic-matching query behind every PUBLISH. Subscriptions live in two
//! lanes with different lifetimes:
//! - clean-session subscriptions are held in memory and die with the process
//! - durable-session subscriptions live in the shared remote store and
//!   survive restarts
//!
//! A third, fully local index holds `$SYS/...` subscriptions, which are never
//! persisted and never gossiped to peers.

mod ephemeral;
mod persistent;
mod service;
mod sys;


pub use ephemeral::EphemeralIndex;
pub use persistent::PersistentIndex;
pub use service::SubscriptionService;
pub use sys::SysTopicIndex;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Quality of Service levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    /// Parse the decimal ASCII form used in the remote store
    pub fn from_store_value(v: &str) -> Option<Self> {
        v.parse::<u8>().ok().and_then(Self::from_u8)
    }
}

/// A client's subscription to one topic filter.
///
/// Identity is `(client_id, topic)`; QoS and the clean-session flag are
/// mutable metadata. Re-subscribing an equal record with a different QoS
/// replaces the stored record.
#[derive(Debug, Clone)]
pub struct ClientSub {
    /// Client ID
    pub client_id: Arc<str>,
    /// Requested QoS
    pub qos: QoS,
    /// Topic filter
    pub topic: Arc<str>,
    /// Whether the owning session is clean (ephemeral)
    pub clean_session: bool,
}

impl ClientSub {
    pub fn new(
        client_id: impl Into<Arc<str>>,
        qos: QoS,
        topic: impl Into<Arc<str>>,
        clean_session: bool,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            qos,
            topic: topic.into(),
            clean_session,
        }
    }

    /// A record carrying only identity, for removal by equality
    pub(crate) fn probe(client_id: impl Into<Arc<str>>, topic: impl Into<Arc<str>>) -> Self {
        Self::new(client_id, QoS::AtMostOnce, topic, false)
    }
}

impl PartialEq for ClientSub {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id && self.topic == other.topic
    }
}

impl Eq for ClientSub {}

impl Hash for ClientSub {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client_id.hash(state);
        self.topic.hash(state);
    }
}
