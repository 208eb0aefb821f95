//! inkpad-host-bridge: runs an [`EditorSession`] against a host process.
//!
//! This crate provides:
//! - `protocol` - the JSON frames both sides exchange
//! - `transport` - in-process and TCP frame channels
//! - `HostBridge` - handshake, then call/notify dispatch until the host leaves
//! - `telemetry` - console tracing setup for the kernel binary
//!
//! [`EditorSession`]: inkpad_editor_core::EditorSession

pub mod bridge;
pub mod config;
pub mod error;
pub mod protocol;
pub mod telemetry;
pub mod transport;

pub use bridge::{HostBridge, RunSummary};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use protocol::{Inbound, Outbound, PROTOCOL_VERSION};
pub use transport::{ChannelTransport, TcpTransport, Transport};
