//! Set command implementation.

use super::{change_line, changes, ensure_tracked, synced_session, CommandResult};
use camlink_client::ClientConfig;
use camlink_protocol::PropertyValue;
use serde_json::Value;
use std::time::Duration;

/// Sends a property-set intent and waits for the camera to confirm it.
pub async fn run(
    config: ClientConfig,
    name: &str,
    raw_value: &str,
    timeout: Duration,
) -> CommandResult<()> {
    let requested = parse_value(raw_value)?;
    let session = synced_session(config, timeout).await?;
    ensure_tracked(&session, name)?;

    let mut values = changes(&session, name);
    session.request_property_set(name, requested.clone())?;

    let confirmed = tokio::time::timeout(timeout, async {
        while let Some(value) = values.recv().await {
            if applies(&requested, &value) {
                return Some(value);
            }
        }
        None
    })
    .await
    .map_err(|_| format!("camera did not confirm {name} within {timeout:?}"))?
    .ok_or("session ended")?;

    println!("{}", change_line(name, &confirmed));
    session.shutdown().await;
    Ok(())
}

fn parse_value(raw: &str) -> CommandResult<PropertyValue> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("value must be a JSON object, got {other}").into()),
    }
}

/// True once every requested field shows up in `value`.
fn applies(requested: &PropertyValue, value: &PropertyValue) -> bool {
    requested
        .iter()
        .all(|(key, wanted)| value.get(key) == Some(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_must_be_object() {
        assert!(parse_value(r#"{"gain": 6}"#).is_ok());
        assert!(parse_value("6").is_err());
        assert!(parse_value("{oops").is_err());
    }

    #[test]
    fn confirmation_matches_requested_fields() {
        let requested = parse_value(r#"{"whiteBalance": 3200}"#).unwrap();
        let old = json!({"whiteBalance": 5600}).as_object().cloned().unwrap();
        let new = json!({"whiteBalance": 3200, "extra": true})
            .as_object()
            .cloned()
            .unwrap();
        assert!(!applies(&requested, &old));
        assert!(applies(&requested, &new));
    }
}
