use inkpad_editor_core::{EditorConfig, EditorSession};
use inkpad_host_bridge::telemetry::{self, TelemetryConfig};
use inkpad_host_bridge::{BridgeConfig, HostBridge};

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    telemetry::init(TelemetryConfig::from_env("inkpad-kernel"));

    let editor_config = EditorConfig::from_env();
    let bridge_config = BridgeConfig::from_env();
    tracing::info!(?editor_config, ?bridge_config, "starting kernel");

    let mut session = EditorSession::new(editor_config);
    let mut bridge = HostBridge::connect(bridge_config).await?;
    bridge.handshake(&mut session).await?;
    let summary = bridge.run(&mut session).await?;
    tracing::info!(frames = summary.frames, sent = summary.sent, "kernel exiting");
    Ok(())
}
