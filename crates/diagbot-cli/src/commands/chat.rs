//! The `diagbot chat` command.

use std::path::PathBuf;

use anyhow::Result;

use diagbot_core::server::serve;
use diagbot_transport::console::ConsoleTransport;

use super::{build_dispatcher, load_catalog, resolve_config};

pub async fn execute(catalog: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path.as_deref(), catalog)?;
    let dispatcher = build_dispatcher(load_catalog(&config.catalog)?);

    println!("{}\n", dispatcher.welcome_text());

    let transport = ConsoleTransport::stdio("console");
    let mut serve_config = config.to_serve_config();
    serve_config.parallelism = 1;

    serve(&transport, &dispatcher, &serve_config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
