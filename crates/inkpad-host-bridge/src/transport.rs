//! Line-oriented channels to the host.

use std::future::Future;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};

/// Carries whole frames, one JSON document each.
pub trait Transport {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<()>>;

    /// The next frame, or `None` once the peer has closed the channel.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>>>;
}

/// In-process transport over a pair of unbounded channels.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    /// Two connected ends. Whatever one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }
}

impl Transport for ChannelTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.tx.send(frame).map_err(|_| BridgeError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

/// Newline-delimited JSON over TCP.
#[derive(Debug)]
pub struct TcpTransport {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TcpTransport {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|source| BridgeError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }
}

impl Transport for TcpTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}
