//! Session driver: owns the event channel and runs the subscription manager.
//!
//! A [`Session`] spawns one task that dials the channel, feeds the manager,
//! and reconnects with backoff until shut down. The channel is owned by that
//! task alone; callers reach it only through [`Session::request_property_set`].

use crate::bindings::BindingHandle;
use crate::config::ClientConfig;
use crate::error::{CallbackError, ClientError, ClientResult};
use crate::http::HttpTransport;
use crate::mirror::PropertyMirror;
use crate::state::{SessionStats, SubscriptionManager, SubscriptionState};
use crate::transport::{Channel, ChannelConnector, ChannelEvent};
use crate::websocket::WebSocketConnector;
use camlink_protocol::{decode_lines, encode, Envelope, PropertyValue, Request};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work handed from the session handle to the driver task.
#[derive(Debug)]
enum Command {
    Send(Request),
}

/// Handle to a running mirror session.
///
/// Dropping the handle stops the driver task.
pub struct Session {
    mirror: Arc<PropertyMirror>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SubscriptionState>,
    stats: Arc<RwLock<SessionStats>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    http: Option<HttpTransport>,
}

impl Session {
    /// Connects to the device described by `config` over WebSocket, with an
    /// HTTP transport for bulk requests.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: ClientConfig) -> ClientResult<Self> {
        let connector = WebSocketConnector::new(config.websocket_url()?);
        let http = HttpTransport::new(config.clone())?;
        let mut session = Self::spawn(&config, connector);
        session.http = Some(http);
        Ok(session)
    }

    /// Starts a session over any connector.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C>(config: &ClientConfig, connector: C) -> Self
    where
        C: ChannelConnector + 'static,
    {
        let mirror = Arc::new(PropertyMirror::new());
        let manager = SubscriptionManager::new(Arc::clone(&mirror), config.reconnect.clone());
        let state = manager.watch_state();
        let stats = manager.stats_handle();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            connector,
            manager,
            commands: commands_rx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            mirror,
            commands: commands_tx,
            state,
            stats,
            shutdown: shutdown_tx,
            task: Some(task),
            http: None,
        }
    }

    /// The local property mirror.
    pub fn mirror(&self) -> &Arc<PropertyMirror> {
        &self.mirror
    }

    /// Bulk request transport, when the session was built with [`Session::connect`].
    pub fn http(&self) -> Option<&HttpTransport> {
        self.http.as_ref()
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.mirror.get(name)
    }

    /// Registers a change callback. The current value, if any, is delivered
    /// before this returns.
    pub fn on_property_changed<F>(&self, name: &str, callback: F) -> BindingHandle
    where
        F: Fn(&PropertyValue) + Send + Sync + 'static,
    {
        self.mirror.on_change(name, callback)
    }

    /// Registers a fallible change callback.
    pub fn bind<F>(&self, name: &str, callback: F) -> BindingHandle
    where
        F: Fn(&PropertyValue) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.mirror.bind(name, callback)
    }

    /// Removes a change callback.
    pub fn unbind(&self, handle: BindingHandle) -> bool {
        self.mirror.unbind(handle)
    }

    /// Asks the device to change a property. Fire-and-forget: the mirror
    /// updates when the device pushes the resulting change event.
    pub fn request_property_set(&self, name: &str, value: PropertyValue) -> ClientResult<()> {
        if self.task_finished() {
            return Err(ClientError::Shutdown);
        }
        if !self.state().is_connected() {
            return Err(ClientError::ChannelClosed);
        }
        self.commands
            .send(Command::Send(Request::set_property(name, value)))
            .map_err(|_| ClientError::Shutdown)
    }

    /// Current bootstrap state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    /// Waits until the session reaches `target`.
    pub async fn wait_for_state(
        &self,
        target: SubscriptionState,
        timeout: Duration,
    ) -> ClientResult<()> {
        let mut rx = self.state.clone();
        let reached = tokio::time::timeout(timeout, async move {
            rx.wait_for(|state| *state == target).await.map(|_| ())
        })
        .await;
        match reached {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ClientError::Shutdown),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Copy of the session counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Stops the driver, cancelling any pending reconnect, and waits for it.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
    }

    fn task_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Lost,
    Shutdown,
}

struct Driver<C> {
    connector: C,
    manager: SubscriptionManager,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl<C: ChannelConnector> Driver<C> {
    async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.manager.start_connecting();
            let connected = tokio::select! {
                result = self.connector.connect() => result,
                _ = self.shutdown.changed() => break,
            };

            match connected {
                Ok(channel) => {
                    if self.serve(channel).await == Flow::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to open event channel");
                    self.manager.record_error(&e);
                }
            }

            let Some(delay) = self.manager.on_channel_lost() else {
                break;
            };
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }

        self.manager.shutdown();
        info!("session stopped");
    }

    async fn serve(&mut self, mut channel: Channel) -> Flow {
        loop {
            tokio::select! {
                event = channel.next_event() => match event {
                    Some(ChannelEvent::Open) => {
                        let requests = self.manager.on_open();
                        self.send_all(&channel, requests);
                    }
                    Some(ChannelEvent::Message(raw)) => self.handle_frame(&channel, &raw),
                    Some(ChannelEvent::Closed) | None => {
                        info!("event channel closed");
                        return Flow::Lost;
                    }
                    Some(ChannelEvent::Error(message)) => {
                        let error = ClientError::Network(message);
                        warn!(error = %error, "event channel failed");
                        self.manager.record_error(&error);
                        return Flow::Lost;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(request)) => self.send(&channel, request),
                    None => {
                        channel.close();
                        return Flow::Shutdown;
                    }
                },
                _ = self.shutdown.changed() => {
                    channel.close();
                    return Flow::Shutdown;
                }
            }
        }
    }

    fn handle_frame(&mut self, channel: &Channel, raw: &str) {
        for decoded in decode_lines(raw) {
            let envelope = match decoded {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "discarding malformed message");
                    self.manager.record_protocol_error(&e);
                    continue;
                }
            };

            match self.manager.on_envelope(envelope) {
                Ok(requests) if requests.is_empty() => {}
                Ok(requests) => {
                    self.send_all(channel, requests);
                    self.manager.subscriptions_issued();
                }
                Err(e) => {
                    warn!(error = %e, "discarding malformed message");
                    self.manager.record_protocol_error(&e);
                }
            }
        }
    }

    fn send_all(&self, channel: &Channel, requests: Vec<Request>) {
        for request in requests {
            self.send(channel, request);
        }
    }

    fn send(&self, channel: &Channel, request: Request) {
        let action = request.action.clone();
        let raw = match encode(&Envelope::Request(request)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(action = %action, error = %e, "failed to encode request");
                return;
            }
        };
        match channel.send(raw) {
            Ok(()) => debug!(action = %action, "request sent"),
            Err(e) => warn!(action = %action, error = %e, "dropping request"),
        }
    }
}
