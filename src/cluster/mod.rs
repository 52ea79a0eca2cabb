//! Cluster Module
//!
//! Keeps the subscription index coherent across broker nodes. Every local
//! mutation is encoded as a subscription event and published on a named bus
//! channel; every node applies inbound peer events to its own indices.
//!
//! The transport is abstract: any named-channel publish/subscribe system
//! carrying opaque bytes works. Delivery is best-effort with no
//! acknowledgement; per-originator FIFO order is assumed, duplicates are
//! tolerated.

mod agent;
mod bus;
mod codec;
mod event;

pub use agent::ClusterAgent;
pub use bus::{BusError, EventBus, MemoryBus};
pub use codec::{CodecKind, DecodeError, EncodeError, EventCodec};
pub use event::{EventKind, InternalMessage, SubEvent};

// Re-export cluster config
pub use crate::config::ClusterConfig;
