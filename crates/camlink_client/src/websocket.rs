//! WebSocket implementation of [`ChannelConnector`].

use crate::error::{ClientError, ClientResult};
use crate::transport::{Channel, ChannelConnector, ChannelEvent, ChannelPeer};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Opens the device event channel over WebSocket.
///
/// Each `connect` dials once and spawns a pump task that owns the socket for
/// the lifetime of the returned [`Channel`].
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Creates a connector for a `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self) -> ClientResult<Channel> {
        debug!(url = %self.url, "connecting to event channel");
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Network(format!("{}: {e}", self.url)))?;
        info!(url = %self.url, "event channel connected");

        let (channel, peer) = Channel::pair();
        tokio::spawn(pump(stream, peer));
        Ok(channel)
    }
}

/// Moves frames between the socket and the channel until either side ends.
async fn pump<S>(stream: tokio_tungstenite::WebSocketStream<S>, mut peer: ChannelPeer)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = stream.split();

    if !peer.emit(ChannelEvent::Open) {
        let _ = write.close().await;
        return;
    }

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !peer.deliver(text.as_str()) {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if !peer.deliver(text) {
                            break;
                        }
                    }
                    Err(_) => warn!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "event channel closed by server");
                    peer.emit(ChannelEvent::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "event channel failed");
                    peer.emit(ChannelEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    peer.emit(ChannelEvent::Closed);
                    return;
                }
            },
            outbound = peer.recv() => match outbound {
                Some(raw) => {
                    if let Err(e) = write.send(Message::Text(raw.into())).await {
                        warn!(error = %e, "event channel write failed");
                        peer.emit(ChannelEvent::Error(e.to_string()));
                        return;
                    }
                }
                None => break,
            },
        }
    }

    // Client end closed or dropped.
    let _ = write.close().await;
    debug!("event channel closed by client");
}
