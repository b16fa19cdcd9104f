//! Emulate command implementation.

use super::CommandResult;
use camlink_emulator::{Emulator, EmulatorConfig};
use std::net::SocketAddr;
use tracing::info;

/// Serves an emulated camera until Ctrl-C.
pub async fn run(bind: SocketAddr) -> CommandResult<()> {
    let handle = Emulator::new(EmulatorConfig::new(bind)).start().await?;
    info!(url = %handle.base_url(), "emulated camera ready; press Ctrl-C to stop");
    println!("{}", handle.base_url());

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await?;
    Ok(())
}
