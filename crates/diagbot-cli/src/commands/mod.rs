pub mod chat;
pub mod convert;
pub mod init;
pub mod serve;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use diagbot_core::{Catalog, DiagnosisEngine, Dispatcher};
use diagbot_transport::config::load_config_from;
use diagbot_transport::DiagbotConfig;

/// Load the config, letting an explicit `--catalog` win over the file.
pub fn resolve_config(
    config_path: Option<&Path>,
    catalog_override: Option<PathBuf>,
) -> Result<DiagbotConfig> {
    let mut config = load_config_from(config_path)?;
    if let Some(catalog) = catalog_override {
        config.catalog = catalog;
    }
    Ok(config)
}

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::load(path).with_context(|| format!("failed to load catalog: {}", path.display()))
}

pub fn build_dispatcher(catalog: Catalog) -> Dispatcher {
    Dispatcher::new(Arc::new(DiagnosisEngine::new(Arc::new(catalog))))
}
