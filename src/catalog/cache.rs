// src/catalog/cache.rs

use crate::{error::AppResult, models::CatalogSnapshot};
use log::{debug, warn};
use std::{fs, io::Write, path::Path};
use tempfile::NamedTempFile;

/// 缓存缺失或损坏都视为未命中
pub fn load(path: &Path) -> Option<CatalogSnapshot> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("目录缓存 {:?} 不可用: {}", path, e);
            return None;
        }
    };
    match serde_json::from_str::<CatalogSnapshot>(&content) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("目录缓存 {:?} 已损坏，忽略: {}", path, e);
            None
        }
    }
}

pub fn save(path: &Path, snapshot: &CatalogSnapshot) -> AppResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, snapshot)?;
    tmp.flush()?;
    tmp.persist(path)?;
    debug!("目录缓存已写入 {:?} ({} 项)", path, snapshot.entries.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogCandidate;

    #[test]
    fn test_corrupt_or_missing_cache_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery_cache.json");
        assert!(load(&path).is_none());
        fs::write(&path, "[1, 2").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn test_saved_snapshot_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery_cache.json");
        let snapshot = CatalogSnapshot {
            scanned_at: None,
            entries: vec![CatalogCandidate {
                product_id: "093-22004".into(),
                artifact_url: "https://swcdn.apple.com/093-22004/BaseSystem.dmg".into(),
                signature_url: None,
                metadata_url: None,
                distribution_url: None,
                published_date: None,
                resolved_name: "macOS 13: Ventura".into(),
                is_full_installer: false,
            }],
            stale: false,
        };
        save(&path, &snapshot).unwrap();
        assert_eq!(load(&path), Some(snapshot));
    }
}
