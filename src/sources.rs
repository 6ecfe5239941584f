use anyhow::Result;

use crate::config::Config;
use crate::hash_cache::HashCache;

/// One line of `docuchat sources`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub collection: String,
    pub path: String,
    pub ok: bool,
    pub cached_files: usize,
}

pub fn source_statuses(config: &Config) -> Result<Vec<SourceStatus>> {
    let cache = HashCache::new(config.storage.cache_file());
    config
        .sources
        .iter()
        .map(|s| {
            let collection = s.collection_name();
            Ok(SourceStatus {
                cached_files: cache.cached_file_count(&collection)?,
                path: s.path.display().to_string(),
                ok: s.path.is_dir(),
                collection,
            })
        })
        .collect()
}

pub fn list_sources(config: &Config) -> Result<()> {
    let statuses = source_statuses(config)?;
    if statuses.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!("{:<20} {:<10} {:>8}  PATH", "COLLECTION", "STATUS", "CACHED");
    for s in &statuses {
        let status = if s.ok { "OK" } else { "MISSING" };
        println!(
            "{:<20} {:<10} {:>8}  {}",
            s.collection, status, s.cached_files, s.path
        );
    }
    Ok(())
}
