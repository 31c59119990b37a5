//! The `diagbot convert` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::load_catalog;

pub fn execute(catalog_path: PathBuf, output: PathBuf) -> Result<()> {
    let catalog = load_catalog(&catalog_path)?;
    catalog
        .save(&output)
        .with_context(|| format!("failed to write catalog: {}", output.display()))?;

    println!(
        "Converted {} test(s) from {} to {}",
        catalog.len(),
        catalog_path.display(),
        output.display()
    );
    Ok(())
}
