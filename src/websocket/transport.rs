//! Duplex transport seam between the connection driver and the socket.
//!
//! The driver only needs an ordered frame sink and an ordered frame stream.
//! [`Transport::from_websocket`] adapts an upgraded axum socket;
//! [`Transport::memory`] pairs the driver with an in-process peer.

use std::pin::Pin;

use axum::extract::ws::WebSocket;
use futures::channel::mpsc;
use futures::{future, Sink, SinkExt, Stream, StreamExt};

use crate::error::{AppError, Result};

use super::message::Message;

pub type FrameSink = Pin<Box<dyn Sink<Message, Error = AppError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// An upgraded duplex connection, split into its write and read halves
pub struct Transport {
    pub(crate) sink: FrameSink,
    pub(crate) stream: FrameStream,
}

impl Transport {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Message, Error = AppError> + Send + 'static,
        R: Stream<Item = Result<Message>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    pub fn from_websocket(socket: WebSocket) -> Self {
        let (ws_sender, ws_receiver) = socket.split();

        let sink = ws_sender
            .sink_map_err(AppError::from)
            .with(|message: Message| future::ready(message.into_ws()));
        let stream = ws_receiver.map(|frame| frame.map(Message::from).map_err(AppError::from));

        Self::new(sink, stream)
    }

    /// In-process transport. The returned peer sees every frame the driver
    /// writes and can inject inbound frames or failures.
    pub fn memory() -> (Self, MemoryPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded::<Message>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded::<Result<Message>>();

        let transport = Self::new(outbound_tx.sink_map_err(AppError::transport), inbound_rx);
        let peer = MemoryPeer {
            received: outbound_rx,
            sender: inbound_tx,
        };

        (transport, peer)
    }
}

/// Remote end of a [`Transport::memory`] pair
pub struct MemoryPeer {
    received: mpsc::UnboundedReceiver<Message>,
    sender: mpsc::UnboundedSender<Result<Message>>,
}

impl MemoryPeer {
    /// Deliver a frame to the driver's reader. Returns false once the
    /// reader side is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.unbounded_send(Ok(message)).is_ok()
    }

    /// Make the driver's next read fail
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.sender
            .unbounded_send(Err(AppError::Transport(reason.into())))
            .is_ok()
    }

    /// Next frame written by the driver; `None` once the driver closed its sink
    pub async fn recv(&mut self) -> Option<Message> {
        self.received.next().await
    }

    /// End the inbound stream, as a peer hanging up would
    pub fn hang_up(&self) {
        self.sender.close_channel();
    }

    /// Split into the receiving half and a sending handle
    pub fn split(self) -> (mpsc::UnboundedReceiver<Message>, MemoryPeerSender) {
        (self.received, MemoryPeerSender(self.sender))
    }
}

#[derive(Clone)]
pub struct MemoryPeerSender(mpsc::UnboundedSender<Result<Message>>);

impl MemoryPeerSender {
    pub fn send(&self, message: Message) -> bool {
        self.0.unbounded_send(Ok(message)).is_ok()
    }
}
