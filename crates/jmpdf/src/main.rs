use std::sync::Arc;

use jmpdf_core::config::Config;
use jmpdf_fetcher::{CommandFetcher, CommandFetcherConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jmpdf_core::logging::init("jmpdf")?;

    let cfg = Arc::new(Config::load()?);
    let fetcher = Arc::new(CommandFetcher::new(CommandFetcherConfig::from(cfg.as_ref())));

    jmpdf_telegram::router::run_polling(cfg, fetcher)
        .await
        .map_err(|e| anyhow::anyhow!("telegram bot failed: {e}"))?;

    Ok(())
}
