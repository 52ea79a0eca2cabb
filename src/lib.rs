//! meshmq - Clustered MQTT subscription index
//!
//! The subscription index of an MQTT broker, built to span a cluster of
//! nodes sharing a remote key-value store. Clean-session subscriptions live
//! in sharded in-memory maps; durable-session subscriptions live in the
//! shared store with an optional local read cache; nodes keep each other
//! coherent by gossiping subscription events over an abstract bus.

pub mod cluster;
pub mod config;
pub mod store;
pub mod subscription;
pub mod topic;

pub use cluster::{ClusterAgent, EventBus, EventCodec, MemoryBus, SubEvent};
pub use config::Config;
pub use store::{MemoryStore, RemoteStore, StoreError};
pub use subscription::{
    ClientSub, EphemeralIndex, PersistentIndex, QoS, SubscriptionService, SysTopicIndex,
};
pub use topic::{is_sys_topic, topic_matches_filter, validate_topic_filter, validate_topic_name};
