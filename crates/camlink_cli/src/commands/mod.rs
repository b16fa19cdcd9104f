//! CLI command implementations.

pub mod emulate;
pub mod get;
pub mod set;
pub mod system;
pub mod watch;

use camlink_client::{ClientConfig, Session, SubscriptionState};
use camlink_protocol::PropertyValue;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Connects and waits until every advertised property is subscribed.
pub async fn synced_session(config: ClientConfig, timeout: Duration) -> CommandResult<Session> {
    let session = Session::connect(config)?;
    session
        .wait_for_state(SubscriptionState::Synced, timeout)
        .await
        .map_err(|e| format!("camera did not become ready: {e}"))?;
    Ok(session)
}

/// Fails unless the camera advertised `name`.
pub fn ensure_tracked(session: &Session, name: &str) -> CommandResult<()> {
    if session.mirror().is_tracked(name) {
        Ok(())
    } else {
        Err(format!("camera does not expose {name}").into())
    }
}

/// Forwards every value delivered to a binding on `name` into a channel.
pub fn changes(session: &Session, name: &str) -> mpsc::UnboundedReceiver<PropertyValue> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.on_property_changed(name, move |value| {
        let _ = tx.send(value.clone());
    });
    rx
}

/// One output line: `{"property": ..., "value": ...}`.
pub fn change_line(name: &str, value: &PropertyValue) -> String {
    serde_json::json!({ "property": name, "value": value }).to_string()
}
