//! Serialization for cluster bus messages.
//!
//! Two codecs are supported: JSON for interoperability and a bincode binary
//! form for compactness. The choice is configuration-driven and must match
//! across the cluster.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::event::InternalMessage;

/// Encoding errors
#[derive(Debug)]
pub enum EncodeError {
    Json(serde_json::Error),
    Binary(bincode::error::EncodeError),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "JSON encode error: {}", e),
            Self::Binary(e) => write!(f, "binary encode error: {}", e),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Decoding errors for inbound bus payloads
#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    Binary(bincode::error::DecodeError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "JSON decode error: {}", e),
            Self::Binary(e) => write!(f, "binary decode error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Wire format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Json,
    Binary,
}

/// Codec for `InternalMessage` envelopes on the cluster bus.
#[derive(Debug, Clone, Copy)]
pub struct EventCodec {
    kind: CodecKind,
}

impl EventCodec {
    pub fn new(kind: CodecKind) -> Self {
        Self { kind }
    }

    pub fn encode<T: Serialize>(&self, msg: &InternalMessage<T>) -> Result<Vec<u8>, EncodeError> {
        match self.kind {
            CodecKind::Json => serde_json::to_vec(msg).map_err(EncodeError::Json),
            CodecKind::Binary => {
                bincode::serde::encode_to_vec(msg, bincode::config::standard())
                    .map_err(EncodeError::Binary)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<InternalMessage<T>, DecodeError> {
        match self.kind {
            CodecKind::Json => serde_json::from_slice(bytes).map_err(DecodeError::Json),
            CodecKind::Binary => {
                bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                    .map(|(msg, _)| msg)
                    .map_err(DecodeError::Binary)
            }
        }
    }
}
