//! Subscription state machine.
//!
//! The manager performs no I/O. The session driver feeds it channel
//! lifecycle events and decoded envelopes, and sends whatever requests it
//! hands back.
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingPropertyList -> Subscribing -> Synced
//!                     ^                                                  |
//!                     +----------------- channel lost (backoff) ---------+
//! ```
//!
//! Every state except `Disconnected` returns to `Connecting` when the channel
//! is lost. Shutdown moves any state to `Disconnected`.

use crate::config::{Backoff, ReconnectConfig};
use crate::error::ClientError;
use crate::mirror::PropertyMirror;
use camlink_protocol::{actions, Envelope, Event, PropertyName, ProtocolResult, Request, Response};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where the session is in the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// No session, or shut down.
    Disconnected,
    /// Opening the channel (including the backoff wait before it).
    Connecting,
    /// `listProperties` sent, waiting for the response.
    AwaitingPropertyList,
    /// Subscribe requests are being issued.
    Subscribing,
    /// Every advertised property has been subscribed.
    Synced,
}

impl SubscriptionState {
    /// Returns true while the channel is open.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SubscriptionState::AwaitingPropertyList
                | SubscriptionState::Subscribing
                | SubscriptionState::Synced
        )
    }

    /// Returns true while the bootstrap sequence is running.
    pub fn is_bootstrapping(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Connecting
                | SubscriptionState::AwaitingPropertyList
                | SubscriptionState::Subscribing
        )
    }
}

/// Counters describing a session's history.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Times the channel was dialed.
    pub connection_attempts: u64,
    /// Times the bootstrap reached `Synced`.
    pub syncs_completed: u64,
    /// Times the channel was lost and a reconnect scheduled.
    pub reconnects: u64,
    /// Change events merged into the mirror.
    pub events_applied: u64,
    /// Change events for untracked names.
    pub events_ignored: u64,
    /// Messages discarded as malformed.
    pub protocol_errors: u64,
    /// Last backoff delay handed out.
    pub last_backoff: Option<Duration>,
    /// Time the last bootstrap completed.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives the list-then-subscribe bootstrap and routes change events.
pub struct SubscriptionManager {
    mirror: Arc<PropertyMirror>,
    state: watch::Sender<SubscriptionState>,
    stats: Arc<RwLock<SessionStats>>,
    backoff: Backoff,
    stable_after: Duration,
    synced_at: Option<Instant>,
    properties: Vec<PropertyName>,
}

impl SubscriptionManager {
    /// Creates a manager in `Disconnected`.
    pub fn new(mirror: Arc<PropertyMirror>, reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Disconnected);
        Self {
            mirror,
            state,
            stats: Arc::new(RwLock::new(SessionStats::default())),
            stable_after: reconnect.stable_after,
            backoff: Backoff::new(reconnect),
            synced_at: None,
            properties: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Shared handle to the counters.
    pub fn stats_handle(&self) -> Arc<RwLock<SessionStats>> {
        Arc::clone(&self.stats)
    }

    /// Copy of the counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Property names from the most recent `listProperties` response.
    pub fn properties(&self) -> &[PropertyName] {
        &self.properties
    }

    /// The mirror events are routed into.
    pub fn mirror(&self) -> &Arc<PropertyMirror> {
        &self.mirror
    }

    /// Enters `Connecting` ahead of dialing the channel.
    pub fn start_connecting(&mut self) {
        self.stats.write().connection_attempts += 1;
        self.set_state(SubscriptionState::Connecting);
    }

    /// The channel reported open: ask for the property list.
    pub fn on_open(&mut self) -> Vec<Request> {
        if self.state() != SubscriptionState::Connecting {
            warn!(state = ?self.state(), "channel opened outside Connecting; restarting bootstrap");
        }
        self.set_state(SubscriptionState::AwaitingPropertyList);
        vec![Request::list_properties()]
    }

    /// Handles one decoded envelope and returns the requests to send.
    ///
    /// Change events are applied in every state. A malformed payload is
    /// returned as an error and changes nothing.
    pub fn on_envelope(&mut self, envelope: Envelope) -> ProtocolResult<Vec<Request>> {
        match envelope {
            Envelope::Event(event) => {
                self.on_event(&event)?;
                Ok(Vec::new())
            }
            Envelope::Response(response) => self.on_response(&response),
            Envelope::Request(request) => {
                debug!(action = %request.action, "ignoring request from device");
                Ok(Vec::new())
            }
        }
    }

    /// Every subscribe request handed out has been sent.
    ///
    /// The device does not acknowledge subscriptions, so this completes the
    /// bootstrap.
    pub fn subscriptions_issued(&mut self) {
        if self.state() != SubscriptionState::Subscribing {
            return;
        }
        self.complete_sync();
    }

    /// The channel closed, failed, or could not be opened.
    ///
    /// Returns the delay to wait before reconnecting, or `None` when the
    /// manager is `Disconnected`. The backoff starts over only if the lost
    /// connection had stayed synced for at least `stable_after`.
    pub fn on_channel_lost(&mut self) -> Option<Duration> {
        if self.state() == SubscriptionState::Disconnected {
            return None;
        }

        if let Some(synced_at) = self.synced_at.take() {
            if synced_at.elapsed() >= self.stable_after {
                self.backoff.reset();
            } else {
                debug!(attempt = self.backoff.attempt(), "connection dropped soon after sync");
            }
        }

        let delay = self.backoff.next_delay();
        {
            let mut stats = self.stats.write();
            stats.reconnects += 1;
            stats.last_backoff = Some(delay);
        }
        info!(
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "event channel lost; scheduling reconnect"
        );
        self.set_state(SubscriptionState::Connecting);
        Some(delay)
    }

    /// Records a connection-level failure.
    pub fn record_error(&self, error: &ClientError) {
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Records a discarded malformed message.
    pub fn record_protocol_error(&self, error: &camlink_protocol::ProtocolError) {
        let mut stats = self.stats.write();
        stats.protocol_errors += 1;
        stats.last_error = Some(error.to_string());
    }

    /// Enters `Disconnected`. Later channel losses are ignored.
    pub fn shutdown(&mut self) {
        self.set_state(SubscriptionState::Disconnected);
    }

    fn on_event(&mut self, event: &Event) -> ProtocolResult<()> {
        if event.action != actions::PROPERTY_VALUE_CHANGED {
            debug!(action = %event.action, "ignoring event");
            return Ok(());
        }

        let change = event.as_property_change()?;
        let applied = self.mirror.apply_update(&change.property, &change.value);

        let mut stats = self.stats.write();
        if applied.is_some() {
            stats.events_applied += 1;
        } else {
            stats.events_ignored += 1;
        }
        Ok(())
    }

    fn on_response(&mut self, response: &Response) -> ProtocolResult<Vec<Request>> {
        match response.action.as_str() {
            actions::LIST_PROPERTIES => {
                if self.state() != SubscriptionState::AwaitingPropertyList {
                    debug!(state = ?self.state(), "ignoring stale property list");
                    return Ok(Vec::new());
                }

                let names = response.property_names()?;
                for name in &names {
                    self.mirror.track(name);
                }
                let dropped: Vec<_> = self
                    .properties
                    .iter()
                    .filter(|name| !names.contains(name))
                    .collect();
                for name in &dropped {
                    self.mirror.untrack(name);
                }
                if !dropped.is_empty() {
                    info!(count = dropped.len(), "device no longer lists some properties");
                }
                info!(count = names.len(), "received property list");

                let requests: Vec<Request> = names
                    .iter()
                    .map(|name| Request::subscribe([name.as_str()]))
                    .collect();
                self.properties = names;

                if requests.is_empty() {
                    self.complete_sync();
                } else {
                    self.set_state(SubscriptionState::Subscribing);
                }
                Ok(requests)
            }
            actions::SUBSCRIBE => {
                debug!("subscribe acknowledged");
                Ok(Vec::new())
            }
            other => {
                debug!(action = %other, "ignoring response");
                Ok(Vec::new())
            }
        }
    }

    fn complete_sync(&mut self) {
        let now = Instant::now();
        self.synced_at = Some(now);
        {
            let mut stats = self.stats.write();
            stats.syncs_completed += 1;
            stats.last_sync_time = Some(now);
        }
        info!(properties = self.properties.len(), "property mirror synced");
        self.set_state(SubscriptionState::Synced);
    }

    fn set_state(&self, state: SubscriptionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "subscription state changed");
        }
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("state", &self.state())
            .field("properties", &self.properties.len())
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reconnect() -> ReconnectConfig {
        ReconnectConfig::new(Duration::from_millis(10), Duration::from_millis(80))
    }

    fn manager() -> SubscriptionManager {
        manager_with(reconnect())
    }

    fn manager_with(config: ReconnectConfig) -> SubscriptionManager {
        SubscriptionManager::new(Arc::new(PropertyMirror::new()), config)
    }

    fn value(v: serde_json::Value) -> camlink_protocol::PropertyValue {
        v.as_object().cloned().unwrap()
    }

    fn change(name: &str, v: serde_json::Value) -> Envelope {
        Event::property_changed(name, value(v)).into()
    }

    fn bootstrap(manager: &mut SubscriptionManager, names: &[&str]) -> Vec<Request> {
        manager.start_connecting();
        manager.on_open();
        let requests = manager
            .on_envelope(Response::property_list(names.iter().copied()).into())
            .unwrap();
        manager.subscriptions_issued();
        requests
    }

    #[test]
    fn state_checks() {
        assert!(SubscriptionState::Synced.is_connected());
        assert!(SubscriptionState::AwaitingPropertyList.is_connected());
        assert!(!SubscriptionState::Connecting.is_connected());
        assert!(!SubscriptionState::Disconnected.is_connected());

        assert!(SubscriptionState::Connecting.is_bootstrapping());
        assert!(!SubscriptionState::Synced.is_bootstrapping());
    }

    #[test]
    fn bootstrap_sequence() {
        let mut manager = manager();
        assert_eq!(manager.state(), SubscriptionState::Disconnected);

        manager.start_connecting();
        assert_eq!(manager.state(), SubscriptionState::Connecting);

        let requests = manager.on_open();
        assert_eq!(requests, vec![Request::list_properties()]);
        assert_eq!(manager.state(), SubscriptionState::AwaitingPropertyList);

        let requests = manager
            .on_envelope(Response::property_list(["/video/gain", "/video/shutter"]).into())
            .unwrap();
        assert_eq!(
            requests,
            vec![
                Request::subscribe(["/video/gain"]),
                Request::subscribe(["/video/shutter"]),
            ]
        );
        assert_eq!(manager.state(), SubscriptionState::Subscribing);
        assert!(manager.mirror().is_tracked("/video/gain"));

        manager.subscriptions_issued();
        assert_eq!(manager.state(), SubscriptionState::Synced);
        assert_eq!(manager.stats().syncs_completed, 1);
        assert_eq!(manager.properties(), ["/video/gain", "/video/shutter"]);
    }

    #[test]
    fn empty_property_list_syncs_immediately() {
        let mut manager = manager();
        let requests = bootstrap(&mut manager, &[]);
        assert!(requests.is_empty());
        assert_eq!(manager.state(), SubscriptionState::Synced);
    }

    #[test]
    fn events_apply_in_any_state() {
        let mut manager = manager();
        manager.mirror().track("/video/gain");

        manager.start_connecting();
        manager
            .on_envelope(change("/video/gain", json!({"gain": 4})))
            .unwrap();
        assert_eq!(
            manager.mirror().get("/video/gain"),
            Some(value(json!({"gain": 4})))
        );
        assert_eq!(manager.stats().events_applied, 1);
    }

    #[test]
    fn events_for_untracked_names_are_ignored() {
        let mut manager = manager();
        bootstrap(&mut manager, &["/video/gain"]);

        manager
            .on_envelope(change("/video/shutter", json!({"shutterSpeed": 500})))
            .unwrap();
        assert_eq!(manager.mirror().get("/video/shutter"), None);
        assert_eq!(manager.stats().events_ignored, 1);
    }

    #[test]
    fn malformed_event_is_an_error() {
        let mut manager = manager();
        let mut event = Event::new(actions::PROPERTY_VALUE_CHANGED);
        event.payload.insert("value".into(), json!({"gain": 1}));

        assert!(manager.on_envelope(event.into()).is_err());
    }

    #[test]
    fn stale_property_list_is_ignored() {
        let mut manager = manager();
        bootstrap(&mut manager, &["/video/gain"]);

        let requests = manager
            .on_envelope(Response::property_list(["/video/shutter"]).into())
            .unwrap();
        assert!(requests.is_empty());
        assert_eq!(manager.state(), SubscriptionState::Synced);
        assert!(!manager.mirror().is_tracked("/video/shutter"));
    }

    #[test]
    fn subscribe_response_is_ignored() {
        let mut manager = manager();
        bootstrap(&mut manager, &["/video/gain"]);
        let requests = manager
            .on_envelope(Response::new(actions::SUBSCRIBE).into())
            .unwrap();
        assert!(requests.is_empty());
        assert_eq!(manager.state(), SubscriptionState::Synced);
    }

    #[test]
    fn channel_loss_reenters_connecting_with_growing_backoff() {
        let mut manager = manager();
        bootstrap(&mut manager, &["/video/gain"]);

        let mut delays = Vec::new();
        for _ in 0..6 {
            delays.push(manager.on_channel_lost().unwrap());
            assert_eq!(manager.state(), SubscriptionState::Connecting);
            manager.start_connecting();
        }

        assert_eq!(delays[0], Duration::from_millis(10));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(80)));
        assert_eq!(*delays.last().unwrap(), Duration::from_millis(80));
        assert_eq!(manager.stats().reconnects, 6);
    }

    #[test]
    fn resync_resets_backoff_and_reissues_bootstrap() {
        let mut manager = manager_with(reconnect().with_stable_after(Duration::ZERO));
        bootstrap(&mut manager, &["/video/gain", "/video/shutter"]);

        manager.on_channel_lost();
        manager.on_channel_lost();
        let requests = bootstrap(&mut manager, &["/video/gain", "/video/shutter"]);
        assert_eq!(requests.len(), 2);
        assert_eq!(manager.state(), SubscriptionState::Synced);
        assert_eq!(manager.stats().syncs_completed, 2);

        assert_eq!(manager.on_channel_lost(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn flapping_connection_keeps_growing_backoff() {
        let mut manager = manager_with(reconnect().with_stable_after(Duration::from_secs(60)));

        let mut delays = Vec::new();
        for _ in 0..4 {
            bootstrap(&mut manager, &["/video/gain"]);
            delays.push(manager.on_channel_lost().unwrap());
        }

        assert_eq!(manager.stats().syncs_completed, 4);
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
    }

    #[test]
    fn stable_connection_resets_backoff() {
        let mut manager = manager_with(reconnect().with_stable_after(Duration::from_millis(50)));
        bootstrap(&mut manager, &["/video/gain"]);
        manager.on_channel_lost();
        bootstrap(&mut manager, &["/video/gain"]);
        assert_eq!(manager.on_channel_lost(), Some(Duration::from_millis(20)));

        bootstrap(&mut manager, &["/video/gain"]);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(manager.on_channel_lost(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn names_dropped_from_list_are_untracked() {
        let mut manager = manager();
        bootstrap(&mut manager, &["/video/gain", "/video/shutter"]);
        manager
            .on_envelope(change("/video/shutter", json!({"shutterSpeed": 50})))
            .unwrap();

        manager.on_channel_lost();
        let requests = bootstrap(&mut manager, &["/video/gain"]);
        assert_eq!(requests.len(), 1);
        assert!(manager.mirror().is_tracked("/video/gain"));
        assert!(!manager.mirror().is_tracked("/video/shutter"));

        manager
            .on_envelope(change("/video/shutter", json!({"shutterSpeed": 25})))
            .unwrap();
        assert_eq!(manager.mirror().get("/video/shutter"), None);
        assert_eq!(manager.mirror().names(), vec!["/video/gain"]);
    }

    #[test]
    fn shutdown_stops_reconnects() {
        let mut manager = manager();
        bootstrap(&mut manager, &[]);
        manager.shutdown();
        assert_eq!(manager.state(), SubscriptionState::Disconnected);
        assert_eq!(manager.on_channel_lost(), None);
    }

    #[test]
    fn watch_observes_transitions() {
        let mut manager = manager();
        let rx = manager.watch_state();
        manager.start_connecting();
        assert_eq!(*rx.borrow(), SubscriptionState::Connecting);
    }

    #[test]
    fn values_survive_reconnect() {
        let mut manager = manager();
        bootstrap(&mut manager, &["/video/gain"]);
        manager
            .on_envelope(change("/video/gain", json!({"gain": 9})))
            .unwrap();

        manager.on_channel_lost();
        manager.start_connecting();
        assert_eq!(
            manager.mirror().get("/video/gain"),
            Some(value(json!({"gain": 9})))
        );
    }
}
