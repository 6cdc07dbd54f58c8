use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// Default: info for our crates, warn for everything else. Can be overridden with
/// `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,linkdrop=info,linkdrop_core=info,linkdrop_instagram=info,\
             linkdrop_tiktok=info,linkdrop_telegram=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install tracing subscriber: {e}")))
}
