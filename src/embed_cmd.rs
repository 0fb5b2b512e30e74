//! Embedding backfill for the `kb embed` command.
//!
//! Documents ingested while the provider was disabled (or while it was
//! failing) have chunks without vectors; this fills them in once a
//! provider is available again.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding;
use crate::store::KnowledgeStore;

/// Embed every chunk that is missing its vector.
///
/// Returns `(embedded, failed)` counts. Batches that fail after retries
/// are logged and counted, not fatal — the next run picks them up again.
pub async fn run_embed_pending(
    store: &dyn KnowledgeStore,
    config: &Config,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<(u64, u64)> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pending = store.pending_chunks(limit).await?;

    if dry_run {
        println!("embed (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        return Ok((0, 0));
    }

    if pending.is_empty() {
        println!("embed");
        println!("  all chunks up to date");
        return Ok((0, 0));
    }

    let mut embedded = 0u64;
    let mut failed = 0u64;

    for item in &pending {
        match provider.embed_query(&item.text).await {
            Ok(vector) => {
                store.set_embedding(&item.chunk_id, &vector).await?;
                embedded += 1;
            }
            Err(e) => {
                eprintln!(
                    "Warning: embedding failed for chunk {} of {}: {}",
                    item.chunk_id, item.file_name, e
                );
                failed += 1;
            }
        }
    }

    println!("embed");
    println!(
        "  provider: {} ({} dims)",
        provider.model_name(),
        provider.dims()
    );
    println!("  total pending: {}", pending.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    Ok((embedded, failed))
}
