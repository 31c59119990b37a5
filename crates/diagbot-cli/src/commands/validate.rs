//! The `diagbot validate` command.

use std::path::PathBuf;

use anyhow::Result;

use super::load_catalog;

pub fn execute(catalog_path: PathBuf) -> Result<()> {
    let catalog = load_catalog(&catalog_path)?;

    println!("Catalog: {} ({} tests)", catalog_path.display(), catalog.len());
    for test in catalog.tests() {
        let domain = test.score_domain();
        println!(
            "  /{} - {} ({} questions, scores {}..={}, {} outcomes)",
            test.id(),
            test.name(),
            test.question_count(),
            domain.start(),
            domain.end(),
            test.evaluation().bands().len()
        );
    }

    let warnings = catalog.lint();
    for w in &warnings {
        let prefix = w
            .test_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Catalog valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
