//! Duplex channel abstraction.
//!
//! A [`ChannelConnector`] opens one physical connection per call and hands
//! back a [`Channel`]. The connection's lifecycle callbacks (open, message,
//! close, error) arrive as [`ChannelEvent`]s in order; outbound text goes
//! through [`Channel::send`]. Connector implementations drive the other end
//! through a [`ChannelPeer`].
//!
//! No retry happens at this layer.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle notification from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The connection is ready for `send`.
    Open,
    /// One raw text frame from the server.
    Message(String),
    /// The connection was closed.
    Closed,
    /// The connection failed.
    Error(String),
}

/// Client end of one duplex connection.
#[derive(Debug)]
pub struct Channel {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    open: Arc<AtomicBool>,
}

/// Transport end of one duplex connection.
#[derive(Debug)]
pub struct ChannelPeer {
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    open: Arc<AtomicBool>,
}

impl Channel {
    /// Creates a connected channel/peer pair. The channel starts closed until
    /// the peer emits [`ChannelEvent::Open`] and it has been received.
    pub fn pair() -> (Channel, ChannelPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        let channel = Channel {
            outbound: outbound_tx,
            events: events_rx,
            open: Arc::clone(&open),
        };
        let peer = ChannelPeer {
            outbound: outbound_rx,
            events: events_tx,
            open,
        };
        (channel, peer)
    }

    /// Returns true between `Open` and `Closed`/`Error`.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queues one raw frame for the server.
    pub fn send(&self, raw: impl Into<String>) -> ClientResult<()> {
        if !self.is_open() {
            return Err(ClientError::ChannelClosed);
        }
        self.outbound
            .send(raw.into())
            .map_err(|_| ClientError::ChannelClosed)
    }

    /// Waits for the next lifecycle event.
    ///
    /// Returns `None` once the transport end has gone away.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        let event = self.events.recv().await;
        match &event {
            Some(ChannelEvent::Open) => self.open.store(true, Ordering::SeqCst),
            Some(ChannelEvent::Closed) | Some(ChannelEvent::Error(_)) | None => {
                self.open.store(false, Ordering::SeqCst)
            }
            Some(ChannelEvent::Message(_)) => {}
        }
        event
    }

    /// Closes the channel. The transport end observes the outbound queue
    /// ending and tears the connection down.
    pub fn close(self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl ChannelPeer {
    /// Delivers a lifecycle event to the client end.
    ///
    /// Returns false if the client end has been dropped.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Delivers a text frame to the client end.
    pub fn deliver(&self, raw: impl Into<String>) -> bool {
        self.emit(ChannelEvent::Message(raw.into()))
    }

    /// Waits for the next frame the client sent.
    ///
    /// Returns `None` once the client end has been closed or dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Returns a frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Returns true while the client end still exists.
    pub fn is_connected(&self) -> bool {
        !self.events.is_closed()
    }

    /// Returns true if the client end currently considers the channel open.
    pub fn client_sees_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Opens duplex connections to the device.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Opens one new physical connection.
    async fn connect(&self) -> ClientResult<Channel>;
}

#[async_trait]
impl<C: ChannelConnector + ?Sized> ChannelConnector for Arc<C> {
    async fn connect(&self) -> ClientResult<Channel> {
        (**self).connect().await
    }
}

/// A scripted connector for testing.
///
/// Every successful `connect` hands the transport end of the new channel to
/// the test through the receiver returned by [`MockConnector::new`]. Connect
/// failures can be queued in advance.
#[derive(Debug)]
pub struct MockConnector {
    peers: mpsc::UnboundedSender<ChannelPeer>,
    failures: Mutex<VecDeque<ClientError>>,
    attempts: Mutex<u32>,
}

impl MockConnector {
    /// Creates a connector and the receiver of its peers.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            failures: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(0),
        };
        (connector, rx)
    }

    /// Makes the next `count` connect attempts fail with a network error.
    pub fn fail_next(&self, count: usize) {
        let mut failures = self.failures.lock();
        for _ in 0..count {
            failures.push_back(ClientError::Network("connection refused".into()));
        }
    }

    /// Number of connect attempts so far.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl ChannelConnector for MockConnector {
    async fn connect(&self) -> ClientResult<Channel> {
        *self.attempts.lock() += 1;
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }

        let (channel, peer) = Channel::pair();
        self.peers
            .send(peer)
            .map_err(|_| ClientError::Network("mock peer receiver dropped".into()))?;
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_requires_open() {
        let (mut channel, mut peer) = Channel::pair();
        assert!(matches!(
            channel.send("early"),
            Err(ClientError::ChannelClosed)
        ));

        peer.emit(ChannelEvent::Open);
        assert_eq!(channel.next_event().await, Some(ChannelEvent::Open));
        assert!(channel.is_open());
        assert!(peer.client_sees_open());

        channel.send("hello").unwrap();
        assert_eq!(peer.try_recv().as_deref(), Some("hello"));
        assert_eq!(peer.try_recv(), None);
    }

    #[tokio::test]
    async fn close_event_closes_channel() {
        let (mut channel, peer) = Channel::pair();
        peer.emit(ChannelEvent::Open);
        peer.deliver("frame");
        peer.emit(ChannelEvent::Closed);

        assert_eq!(channel.next_event().await, Some(ChannelEvent::Open));
        assert_eq!(
            channel.next_event().await,
            Some(ChannelEvent::Message("frame".into()))
        );
        assert_eq!(channel.next_event().await, Some(ChannelEvent::Closed));
        assert!(!channel.is_open());
        assert!(matches!(channel.send("late"), Err(ClientError::ChannelClosed)));
    }

    #[tokio::test]
    async fn dropped_peer_ends_events() {
        let (mut channel, peer) = Channel::pair();
        peer.emit(ChannelEvent::Open);
        drop(peer);

        assert_eq!(channel.next_event().await, Some(ChannelEvent::Open));
        assert_eq!(channel.next_event().await, None);
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn closing_channel_ends_peer_outbound() {
        let (channel, mut peer) = Channel::pair();
        channel.close();
        assert_eq!(peer.recv().await, None);
        assert!(!peer.is_connected());
    }

    #[tokio::test]
    async fn mock_connector_failures_then_success() {
        let (connector, mut peers) = MockConnector::new();
        connector.fail_next(2);

        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_err());
        let _channel = connector.connect().await.unwrap();

        assert_eq!(connector.attempts(), 3);
        assert!(peers.try_recv().is_ok());
    }
}
