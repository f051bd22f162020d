// src/models/catalog.rs

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// 目录扫描中发现的一个可下载镜像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCandidate {
    pub product_id: String,
    pub artifact_url: String,
    #[serde(default)]
    pub signature_url: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub distribution_url: Option<String>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_name: String,
    #[serde(default)]
    pub is_full_installer: bool,
}

impl CatalogCandidate {
    pub fn fallback_name(product_id: &str) -> String {
        format!("Installer ({})", product_id)
    }

    /// 列表展示用的名称，如 "macOS 14: Sonoma (Full Installer) (2024-06-01)"
    pub fn display_label(&self) -> String {
        let mut label = self.resolved_name.clone();
        if self.is_full_installer {
            label.push_str(" (Full Installer)");
        }
        match self.published_date {
            Some(date) => label.push_str(&format!(" ({})", date.format("%Y-%m-%d"))),
            None => label.push_str(&format!(" ({})", self.product_id)),
        }
        label
    }

    pub fn default_file_name(&self) -> String {
        if !self.is_full_installer {
            return format!("{}_BaseSystem.dmg", self.product_id);
        }
        let last_segment = self
            .artifact_url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().to_string())
            .unwrap_or_else(|| "InstallAssistant.pkg".to_string());
        format!("{}_{}", self.product_id, last_segment)
    }
}

/// 一次扫描的排序、去重结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub scanned_at: Option<DateTime<Utc>>,
    pub entries: Vec<CatalogCandidate>,
    /// 本次扫描未能访问任何目录，返回的是缓存内容
    #[serde(skip)]
    pub stale: bool,
}

impl CatalogSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, product_id: &str) -> Option<&CatalogCandidate> {
        self.entries.iter().find(|c| c.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(full: bool, url: &str) -> CatalogCandidate {
        CatalogCandidate {
            product_id: "093-37385".into(),
            artifact_url: url.into(),
            signature_url: None,
            metadata_url: None,
            distribution_url: None,
            published_date: None,
            resolved_name: "macOS 12: Monterey".into(),
            is_full_installer: full,
        }
    }

    #[test]
    fn test_default_file_name() {
        let recovery = candidate(false, "https://swcdn.apple.com/a/RecoveryImage/BaseSystem.dmg");
        assert_eq!(recovery.default_file_name(), "093-37385_BaseSystem.dmg");

        let full = candidate(true, "https://swcdn.apple.com/a/Install%20Assistant.pkg?x=1");
        assert_eq!(full.default_file_name(), "093-37385_Install Assistant.pkg");
    }

    #[test]
    fn test_display_label() {
        let mut c = candidate(true, "https://x/InstallAssistant.pkg");
        assert_eq!(c.display_label(), "macOS 12: Monterey (Full Installer) (093-37385)");
        c.published_date = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        c.is_full_installer = false;
        assert_eq!(c.display_label(), "macOS 12: Monterey (2024-06-01)");
    }
}
