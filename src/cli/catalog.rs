//! Catalog import command

use anyhow::{Result, bail};
use std::path::Path;

use questlog::config::CatalogFile;
use questlog::progress::ProgressionEngine;

use super::print_json;

/// Validate and store every definition in `file`
pub fn import_command(engine: &ProgressionEngine, file: &Path) -> Result<()> {
    let catalog = CatalogFile::from_file(file)?;
    if catalog.is_empty() {
        bail!("Catalog {} defines nothing to import", file.display());
    }

    let summary = engine.catalog().import(&catalog)?;
    print_json(&summary)
}
