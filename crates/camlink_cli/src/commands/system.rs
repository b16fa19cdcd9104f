//! System command implementation.

use super::CommandResult;
use camlink_client::{ClientConfig, HttpTransport};

/// Fetches and prints `/system`.
pub async fn run(config: ClientConfig) -> CommandResult<()> {
    let transport = HttpTransport::new(config)?;
    let info = transport.system().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
