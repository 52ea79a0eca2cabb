//! Subscription event messages.
//!
//! Every local subscription mutation is broadcast to the cluster as a
//! `SubEvent` wrapped in an `InternalMessage` envelope. The event kind is
//! numeric on the wire so both the JSON and binary codecs agree on it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::subscription::ClientSub;

/// Kind of subscription event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// A client subscribed to a topic
    Sub = 1,
    /// A client unsubscribed from one or more topics
    Unsub = 2,
    /// A topic has no subscribers anywhere and should be pruned
    DelTopic = 3,
}

impl EventKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(EventKind::Sub),
            2 => Some(EventKind::Unsub),
            3 => Some(EventKind::DelTopic),
            _ => None,
        }
    }
}

/// A subscription state change, as carried on the cluster bus.
///
/// Field usage varies by kind: SUB carries `qos` and `topic`, UNSUB carries
/// `topics`, DEL_TOPIC carries `topic`. Unused fields hold their defaults so
/// the binary codec sees a fixed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEvent {
    #[serde(rename = "type")]
    pub kind: u8,
    pub client_id: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub clean_session: bool,
}

impl SubEvent {
    /// Event for a successful subscribe
    pub fn sub(sub: &ClientSub) -> Self {
        Self {
            kind: EventKind::Sub as u8,
            client_id: sub.client_id.to_string(),
            qos: sub.qos as u8,
            topic: Some(sub.topic.to_string()),
            topics: Vec::new(),
            clean_session: sub.clean_session,
        }
    }

    /// Event for a successful unsubscribe
    pub fn unsub(client_id: &str, clean_session: bool, topics: Vec<String>) -> Self {
        Self {
            kind: EventKind::Unsub as u8,
            client_id: client_id.to_string(),
            qos: 0,
            topic: None,
            topics,
            clean_session,
        }
    }

    /// Topic-pruning event. Never emitted by the index itself; originates
    /// from an administrative path.
    pub fn del_topic(topic: &str) -> Self {
        Self {
            kind: EventKind::DelTopic as u8,
            client_id: String::new(),
            qos: 0,
            topic: Some(topic.to_string()),
            topics: Vec::new(),
            clean_session: false,
        }
    }

    /// The event kind, if the numeric tag is known
    pub fn event_kind(&self) -> Option<EventKind> {
        EventKind::from_u8(self.kind)
    }
}

/// Envelope for messages on the cluster bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalMessage<T> {
    pub data: T,
    /// Milliseconds since the Unix epoch at emission
    pub timestamp: u64,
    /// Originating node, for loop suppression
    pub broker_id: u32,
}

impl<T> InternalMessage<T> {
    pub fn new(data: T, broker_id: u32) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            data,
            timestamp,
            broker_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::QoS;

    #[test]
    fn test_event_kind_round_trip() {
        assert_eq!(EventKind::from_u8(1), Some(EventKind::Sub));
        assert_eq!(EventKind::from_u8(2), Some(EventKind::Unsub));
        assert_eq!(EventKind::from_u8(3), Some(EventKind::DelTopic));
        assert_eq!(EventKind::from_u8(0), None);
        assert_eq!(EventKind::from_u8(4), None);
    }

    #[test]
    fn test_sub_event_fields() {
        let sub = ClientSub::new("c1", QoS::AtLeastOnce, "a/+/c", true);
        let event = SubEvent::sub(&sub);
        assert_eq!(event.event_kind(), Some(EventKind::Sub));
        assert_eq!(event.client_id, "c1");
        assert_eq!(event.qos, 1);
        assert_eq!(event.topic.as_deref(), Some("a/+/c"));
        assert!(event.topics.is_empty());
        assert!(event.clean_session);
    }

    #[test]
    fn test_numeric_kind_on_the_wire() {
        let event = SubEvent::del_topic("t");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], 3);
    }
}
