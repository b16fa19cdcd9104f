//! Watch command implementation.

use super::{change_line, ensure_tracked, synced_session, CommandResult};
use camlink_client::ClientConfig;
use std::time::Duration;
use tracing::info;

/// Runs the watch command until Ctrl-C.
pub async fn run(config: ClientConfig, properties: &[String], timeout: Duration) -> CommandResult<()> {
    let session = synced_session(config, timeout).await?;

    let names = if properties.is_empty() {
        session.mirror().names()
    } else {
        for name in properties {
            ensure_tracked(&session, name)?;
        }
        properties.to_vec()
    };

    for name in &names {
        let property = name.clone();
        session.on_property_changed(name, move |value| {
            println!("{}", change_line(&property, value));
        });
    }
    info!(count = names.len(), "watching properties; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    session.shutdown().await;
    Ok(())
}
