//! HTTP and WebSocket front of the emulated camera.

use crate::config::EmulatorConfig;
use crate::device::Device;
use crate::error::EmulatorResult;
use crate::handler::RequestHandler;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use camlink_protocol::{CodecFormat, SystemInfo, VideoFormat};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The emulated camera.
///
/// Cloning is cheap; clones share one device.
#[derive(Debug, Clone)]
pub struct Emulator {
    config: EmulatorConfig,
    handler: RequestHandler,
}

impl Emulator {
    /// Creates an emulator at its power-on state.
    pub fn new(config: EmulatorConfig) -> Self {
        let handler = RequestHandler::new(Arc::new(Device::new()), config.properties.clone());
        Self { config, handler }
    }

    /// The emulated device.
    pub fn device(&self) -> &Arc<Device> {
        self.handler.device()
    }

    /// Emulator configuration.
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/system", get(system))
            .route(
                "/video/autoExposure",
                get(get_auto_exposure).put(put_auto_exposure),
            )
            .route("/video/whiteBalance/doAuto", put(auto_white_balance))
            .route("/event/websocket", get(event_websocket))
            .with_state(self.handler.clone());

        let base = self.config.base_path.trim_end_matches('/');
        if base.is_empty() {
            Router::new().merge(api)
        } else {
            Router::new().nest(base, api)
        }
    }

    /// Binds the listener and starts serving in the background.
    pub async fn start(&self) -> EmulatorResult<EmulatorHandle> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let serve = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let task = tokio::spawn(async move { serve.await });

        info!(addr = %local_addr, base = %self.config.base_path, "emulator listening");
        Ok(EmulatorHandle {
            local_addr,
            base_path: self.config.base_path.clone(),
            device: Arc::clone(self.device()),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new(EmulatorConfig::default())
    }
}

/// A running emulator.
///
/// Dropping the handle stops the server.
#[derive(Debug)]
pub struct EmulatorHandle {
    local_addr: SocketAddr,
    base_path: String,
    device: Arc<Device>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl EmulatorHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL of the HTTP resources, e.g. `http://127.0.0.1:8000/control/api/v1`.
    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.base_path)
    }

    /// The emulated device.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Stops accepting connections, drops live WebSockets, and waits for the
    /// server to finish.
    pub async fn shutdown(mut self) -> EmulatorResult<()> {
        self.device.disconnect_all();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(e) => warn!(error = %e, "emulator task ended abnormally"),
            }
        }
        info!(addr = %self.local_addr, "emulator stopped");
        Ok(())
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            self.device.disconnect_all();
            let _ = tx.send(());
        }
    }
}

async fn system() -> Json<SystemInfo> {
    Json(SystemInfo {
        codec_format: CodecFormat {
            codec: "H.264".into(),
            container: "MPEG2-TS".into(),
        },
        video_format: VideoFormat {
            name: "1080p30".into(),
            frame_rate: "30.00".into(),
            width: 1920,
            height: 1080,
            interlaced: false,
        },
    })
}

async fn get_auto_exposure(State(handler): State<RequestHandler>) -> Response {
    match handler.device().get("/video/autoExposure") {
        Some(value) => Json(Value::Object(value)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_auto_exposure(
    State(handler): State<RequestHandler>,
    Json(body): Json<Value>,
) -> Response {
    let Value::Object(partial) = body else {
        return (StatusCode::BAD_REQUEST, "expected a JSON object").into_response();
    };
    match handler.device().merge("/video/autoExposure", &partial) {
        Ok(merged) => Json(Value::Object(merged)).into_response(),
        Err(e) => {
            warn!(error = %e, "auto exposure update failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn auto_white_balance(State(handler): State<RequestHandler>) -> StatusCode {
    let runs = handler.device().run_auto_white_balance();
    debug!(runs, "auto white balance triggered");
    StatusCode::NO_CONTENT
}

async fn event_websocket(
    State(handler): State<RequestHandler>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_client(socket, handler))
}

/// Pumps one client: direct replies to its requests, plus every broadcast
/// change, until either side closes or [`Device::disconnect_all`] fires.
async fn serve_client(socket: WebSocket, handler: RequestHandler) {
    let device = Arc::clone(handler.device());
    let mut events = device.subscribe_events();
    let mut disconnect = device.subscribe_disconnects();
    let (mut sender, mut receiver) = socket.split();

    device.connection_opened();
    info!(clients = device.connection_count(), "client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let mut failed = false;
                    for reply in handler.handle_frame(text.as_str()) {
                        if sender.send(Message::Text(reply.into())).await.is_err() {
                            failed = true;
                            break;
                        }
                    }
                    if failed {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "client read failed");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(raw) => {
                    if sender.send(Message::Text(raw.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client fell behind; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = disconnect.changed() => {
                debug!("dropping client on request");
                break;
            }
        }
    }

    let _ = sender.close().await;
    device.connection_closed();
    info!(clients = device.connection_count(), "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_protocol::{decode, encode, Envelope, Request};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn serves_system_and_auto_exposure() {
        let handle = Emulator::new(EmulatorConfig::ephemeral())
            .start()
            .await
            .unwrap();
        let client = reqwest::Client::new();

        let system: SystemInfo = client
            .get(format!("{}/system", handle.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(system.video_format.width, 1920);

        let updated: Value = client
            .put(format!("{}/video/autoExposure", handle.base_url()))
            .json(&serde_json::json!({"mode": "Continuous"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["mode"], "Continuous");

        let status = client
            .put(format!("{}/video/whiteBalance/doAuto", handle.base_url()))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::NO_CONTENT);
        assert_eq!(handle.device().auto_white_balance_runs(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn websocket_lists_properties_and_drops_on_request() {
        let handle = Emulator::new(EmulatorConfig::ephemeral())
            .start()
            .await
            .unwrap();
        let url = format!(
            "ws://{}/control/api/v1/event/websocket",
            handle.local_addr()
        );
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let list = encode(&Request::list_properties().into()).unwrap();
        ws.send(tungstenite::Message::Text(list.into())).await.unwrap();

        let reply = tokio::time::timeout(WAIT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = reply.into_text().unwrap();
        assert!(matches!(decode(text.as_str()).unwrap(), Envelope::Response(_)));

        handle.device().disconnect_all();
        let end = tokio::time::timeout(WAIT, async {
            loop {
                match ws.next().await {
                    Some(Ok(tungstenite::Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(end.is_ok());

        handle.shutdown().await.unwrap();
    }
}
