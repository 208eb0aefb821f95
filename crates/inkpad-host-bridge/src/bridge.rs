//! Drives an [`EditorSession`] from frames arriving over a [`Transport`].

use std::collections::VecDeque;

use inkpad_editor_core::{CapabilitySet, EditorSession};
use tokio::time::{Instant, timeout_at};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{self, Inbound, Outbound};
use crate::transport::{TcpTransport, Transport};

/// Counters for one [`HostBridge::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub malformed: usize,
    pub sent: usize,
}

pub struct HostBridge<T> {
    transport: T,
    config: BridgeConfig,
    /// Frames that arrived before the handshake finished.
    early: VecDeque<Inbound>,
}

impl HostBridge<TcpTransport> {
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        match TcpTransport::connect(&config.endpoint).await {
            Ok(transport) => {
                tracing::info!(target: "inkpad::bridge", endpoint = %config.endpoint, "connected to host");
                Ok(Self::new(transport, config))
            }
            Err(e) => {
                tracing::error!(target: "inkpad::bridge", endpoint = %config.endpoint, error = %e, "host unreachable");
                Err(e)
            }
        }
    }
}

impl<T: Transport> HostBridge<T> {
    pub fn new(transport: T, config: BridgeConfig) -> Self {
        Self {
            transport,
            config,
            early: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn send(&mut self, frame: &Outbound) -> Result<()> {
        let line = protocol::encode(frame)?;
        self.transport.send(line).await
    }

    /// Say hello and wait for the host's capability set, then bind it to
    /// `session`. Anything else the host sends first is held for [`run`].
    ///
    /// [`run`]: HostBridge::run
    pub async fn handshake(&mut self, session: &mut EditorSession) -> Result<CapabilitySet> {
        self.send(&Outbound::hello()).await?;
        let deadline = Instant::now() + self.config.handshake_timeout();
        loop {
            let line = match timeout_at(deadline, self.transport.recv()).await {
                Ok(received) => received?.ok_or(BridgeError::Closed)?,
                Err(_) => {
                    tracing::error!(
                        target: "inkpad::bridge",
                        timeout_ms = self.config.handshake_timeout_ms,
                        "handshake timed out"
                    );
                    return Err(BridgeError::HandshakeTimeout(self.config.handshake_timeout_ms));
                }
            };
            match protocol::decode::<Inbound>(&line) {
                Ok(Inbound::Capabilities { capabilities }) => {
                    tracing::info!(
                        target: "inkpad::bridge",
                        capabilities = capabilities.len(),
                        early = self.early.len(),
                        "handshake complete"
                    );
                    session.connect_host(capabilities.clone());
                    return Ok(capabilities);
                }
                Ok(frame) => self.early.push_back(frame),
                Err(e) => tracing::warn!(target: "inkpad::bridge", error = %e, "skipping malformed frame"),
            }
        }
    }

    async fn next_frame(&mut self, summary: &mut RunSummary) -> Result<Option<Inbound>> {
        if let Some(frame) = self.early.pop_front() {
            return Ok(Some(frame));
        }
        loop {
            let Some(line) = self.transport.recv().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match protocol::decode(&line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    summary.malformed += 1;
                    tracing::warn!(target: "inkpad::bridge", error = %e, "skipping malformed frame");
                }
            }
        }
    }

    async fn dispatch(&mut self, session: &mut EditorSession, frame: Inbound, summary: &mut RunSummary) -> Result<()> {
        match frame {
            Inbound::Capabilities { capabilities } => {
                tracing::info!(target: "inkpad::bridge", capabilities = capabilities.len(), "host rebound capabilities");
                session.connect_host(capabilities);
            }
            Inbound::Response { id, response } => {
                if let Err(e) = session.handle_response(id, response) {
                    tracing::warn!(target: "inkpad::bridge", id, error = %e, "host response not applied");
                }
            }
            Inbound::Call { call_id, call } => {
                tracing::debug!(target: "inkpad::bridge", call_id, call = call.name(), "host call");
                let result = session.handle_call(call);
                self.send(&Outbound::Reply { call_id, result }).await?;
                summary.sent += 1;
            }
        }
        Ok(())
    }

    async fn flush(&mut self, session: &mut EditorSession, summary: &mut RunSummary) -> Result<()> {
        for outgoing in session.drain_outgoing() {
            self.send(&Outbound::from(outgoing)).await?;
            summary.sent += 1;
        }
        Ok(())
    }

    /// Serve the host until it closes the channel. The session loses its
    /// capabilities on the way out, whether the channel closed cleanly or
    /// failed.
    pub async fn run(&mut self, session: &mut EditorSession) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let outcome = self.serve(session, &mut summary).await;
        session.disconnect_host();
        match &outcome {
            Ok(()) => tracing::info!(
                target: "inkpad::bridge",
                frames = summary.frames,
                malformed = summary.malformed,
                sent = summary.sent,
                "host closed channel"
            ),
            Err(e) => tracing::error!(target: "inkpad::bridge", error = %e, "host channel failed"),
        }
        outcome.map(|()| summary)
    }

    async fn serve(&mut self, session: &mut EditorSession, summary: &mut RunSummary) -> Result<()> {
        // Anything queued while connecting goes out first.
        self.flush(session, summary).await?;
        while let Some(frame) = self.next_frame(summary).await? {
            summary.frames += 1;
            self.dispatch(session, frame, summary).await?;
            self.flush(session, summary).await?;
        }
        Ok(())
    }
}
