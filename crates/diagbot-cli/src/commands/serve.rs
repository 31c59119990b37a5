//! The `diagbot serve` command.

use std::path::PathBuf;

use anyhow::Result;

use diagbot_core::server::serve;
use diagbot_transport::{create_transport, resolve_bot_username};

use super::{build_dispatcher, load_catalog, resolve_config};

pub async fn execute(config_path: Option<PathBuf>, catalog: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path.as_deref(), catalog)?;
    tracing::debug!(?config, "loaded configuration");

    let catalog = load_catalog(&config.catalog)?;
    for warning in catalog.lint() {
        tracing::warn!(test = ?warning.test_id, "{}", warning.message);
    }

    let transport = create_transport(&config.transport)?;
    let mut dispatcher = build_dispatcher(catalog);
    if let Some(username) = resolve_bot_username(transport.as_ref(), &config.transport).await? {
        tracing::info!("answering commands addressed to @{username}");
        dispatcher = dispatcher.with_bot_username(username);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    let stats = serve(
        transport.as_ref(),
        &dispatcher,
        &config.to_serve_config(),
        shutdown,
    )
    .await?;

    tracing::info!(
        "stopped: {} received, {} replied, {} failed sends, {} idle sessions evicted",
        stats.received,
        stats.replied,
        stats.failed_sends,
        stats.evicted
    );
    Ok(())
}
