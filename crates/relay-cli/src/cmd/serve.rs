use std::path::Path;

use anyhow::Result;
use relay_core::RelayConfig;

pub fn run(config_path: Option<&Path>, port: Option<u16>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::from_env(),
    };
    if let Some(port) = port {
        config.port = port;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        tokio::select! {
            res = relay_server::serve(config) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
