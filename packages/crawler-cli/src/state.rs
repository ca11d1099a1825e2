//! JSON snapshot of the in-memory store, so state survives between commands.

use std::path::Path;

use anyhow::{Context, Result};
use research_crawler::{MemoryStore, Repository, Source};

/// Load the store from `path`, or start empty when the file does not exist.
pub async fn load(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        return Ok(MemoryStore::new());
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state file {}", path.display()))?;
    let sources: Vec<Source> = serde_json::from_str(&contents)
        .with_context(|| format!("State file {} is not valid", path.display()))?;

    let store = MemoryStore::new();
    for source in &sources {
        store
            .save_source(source)
            .await
            .with_context(|| format!("Failed to restore {}", source.url))?;
    }
    Ok(store)
}

pub async fn save(path: &Path, store: &MemoryStore) -> Result<()> {
    let sources = store
        .list_sources()
        .await
        .context("Failed to list sources")?;
    let contents = serde_json::to_string_pretty(&sources)?;

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write state file {}", path.display()))
}
