//! Get command implementation.

use super::{changes, ensure_tracked, synced_session, CommandResult};
use camlink_client::ClientConfig;
use std::time::Duration;

/// Prints the mirrored value of `name` once it is known.
pub async fn run(config: ClientConfig, name: &str, timeout: Duration) -> CommandResult<()> {
    let session = synced_session(config, timeout).await?;
    ensure_tracked(&session, name)?;

    let mut values = changes(&session, name);
    let value = tokio::time::timeout(timeout, values.recv())
        .await
        .map_err(|_| format!("no value for {name} within {timeout:?}"))?
        .ok_or("session ended")?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    session.shutdown().await;
    Ok(())
}
