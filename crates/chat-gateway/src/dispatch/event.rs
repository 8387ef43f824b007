//! Decoded dispatch events

use super::GatewayEventType;
use crate::protocol::{GatewayMessage, OpCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A dispatch (op 0) as handed to the dispatch queue
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    /// Event name from `t`
    pub name: String,

    /// Sequence number from `s`
    pub sequence: Option<u64>,

    /// Raw event data from `d`
    pub data: Value,
}

impl DispatchEvent {
    pub fn new(name: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            name: name.into(),
            sequence,
            data,
        }
    }

    /// Extract the dispatch carried by a gateway message
    pub fn from_message(message: GatewayMessage) -> Option<Self> {
        if message.op != OpCode::Dispatch {
            return None;
        }
        Some(Self {
            name: message.t?,
            sequence: message.s,
            data: message.d.unwrap_or(Value::Null),
        })
    }

    /// Known event type, if the name is one
    pub fn event_type(&self) -> Option<GatewayEventType> {
        GatewayEventType::from_str(&self.name)
    }

    /// Deserialize the event data into a domain type
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
