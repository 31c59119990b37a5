//! The `diagbot init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("diagbot.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("catalog").context("failed to create catalog directory")?;
    write_if_missing(Path::new("catalog/tests_config.json"), SAMPLE_CATALOG)?;

    println!("\nNext steps:");
    println!("  1. Put your bot token in BOT_TOKEN (or edit diagbot.toml)");
    println!("  2. Run: diagbot validate --catalog catalog/tests_config.json");
    println!("  3. Try it locally: diagbot chat");
    println!("  4. Go live: diagbot serve");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# diagbot configuration

catalog = "catalog/tests_config.json"
parallelism = 4
# Forget unfinished tests after 30 minutes of silence.
session_idle_timeout_secs = 1800

[transport]
type = "telegram"
token = "${BOT_TOKEN}"
username = "${BOT_USERNAME}"
poll_timeout_secs = 30
"#;

const SAMPLE_CATALOG: &str = include_str!("../../../../catalog/tests_config.json");
