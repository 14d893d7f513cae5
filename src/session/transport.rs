//! # Wire Transport
//!
//! The session core never touches the websocket actor directly. It reads
//! frames through a [`WireReceiver`] and writes through a [`WireSender`];
//! the channel implementations here connect both to the actix actor that owns
//! the socket.

use crate::error::{BridgeError, BridgeResult};
use crate::wire::WireFrame;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Read half of a session's wire connection.
#[async_trait]
pub trait WireReceiver: Send {
    /// Next inbound frame, or `None` once the peer is gone.
    async fn recv(&mut self) -> Option<WireFrame>;
}

/// Write half of a session's wire connection.
#[async_trait]
pub trait WireSender: Send + Sync {
    async fn send(&self, text: String) -> BridgeResult<()>;

    /// Close the connection. The session manager calls this exactly once.
    async fn close(&self);
}

/// Instructions for the socket owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCommand {
    Text(String),
    Close,
}

pub struct ChannelWireReceiver {
    rx: mpsc::Receiver<WireFrame>,
}

impl ChannelWireReceiver {
    pub fn new(rx: mpsc::Receiver<WireFrame>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl WireReceiver for ChannelWireReceiver {
    async fn recv(&mut self) -> Option<WireFrame> {
        self.rx.recv().await
    }
}

pub struct ChannelWireSender {
    tx: mpsc::UnboundedSender<WireCommand>,
}

impl ChannelWireSender {
    pub fn new(tx: mpsc::UnboundedSender<WireCommand>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl WireSender for ChannelWireSender {
    async fn send(&self, text: String) -> BridgeResult<()> {
        self.tx
            .send(WireCommand::Text(text))
            .map_err(|_| BridgeError::Transport("websocket is closed".to_string()))
    }

    async fn close(&self) {
        // The socket may already be gone; closing is then a no-op.
        let _ = self.tx.send(WireCommand::Close);
    }
}
