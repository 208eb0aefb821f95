//! Wire frames exchanged with the host, one JSON object per line.

use inkpad_editor_core::{CallResult, CapabilitySet, HostCall, HostNotification, HostRequest, HostResponse, Outgoing};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Bumped whenever a frame changes shape.
pub const PROTOCOL_VERSION: u32 = 1;

/// Kernel to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "camelCase")]
pub enum Outbound {
    Hello { version: String, protocol: u32 },
    Notify { notification: HostNotification },
    Request { id: u64, request: HostRequest },
    #[serde(rename_all = "camelCase")]
    Reply { call_id: u64, result: CallResult },
}

impl Outbound {
    pub fn hello() -> Self {
        Outbound::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: PROTOCOL_VERSION,
        }
    }
}

impl From<Outgoing> for Outbound {
    fn from(outgoing: Outgoing) -> Self {
        match outgoing {
            Outgoing::Notify(notification) => Outbound::Notify { notification },
            Outgoing::Request { id, request } => Outbound::Request { id, request },
        }
    }
}

/// Host to kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "camelCase")]
pub enum Inbound {
    Capabilities { capabilities: CapabilitySet },
    Response { id: u64, response: HostResponse },
    #[serde(rename_all = "camelCase")]
    Call { call_id: u64, call: HostCall },
}

pub fn encode<T: Serialize>(frame: &T) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line.trim())?)
}
