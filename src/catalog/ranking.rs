// src/catalog/ranking.rs

use crate::models::CatalogCandidate;
use itertools::Itertools;
use regex::Regex;
use std::{cmp::Ordering, collections::HashMap, sync::LazyLock};

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"macOS (\d+)(?:\.(\d+))?").unwrap());

const CODENAMES: &[(&str, (u32, u32))] = &[
    ("Tahoe", (26, 0)),
    ("Sequoia", (15, 0)),
    ("Sonoma", (14, 0)),
    ("Ventura", (13, 0)),
    ("Monterey", (12, 0)),
    ("Big Sur", (11, 0)),
    ("Catalina", (10, 15)),
    ("Mojave", (10, 14)),
    ("High Sierra", (10, 13)),
];

/// 从名称中提取 (主版本, 次版本)，无法识别时为 (0, 0)
pub fn version_key(name: &str) -> (u32, u32) {
    if let Some(caps) = VERSION_RE.captures(name) {
        let major = caps[1].parse().unwrap_or(0);
        let minor = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        return (major, minor);
    }
    CODENAMES
        .iter()
        .find(|(codename, _)| name.contains(codename))
        .map(|(_, key)| *key)
        .unwrap_or((0, 0))
}

/// 同名只保留发布日期最新的一项 (缺失日期视为最旧，相同时先出现者胜出)，
/// 再按版本号、日期降序排列。
pub fn rank(candidates: Vec<CatalogCandidate>) -> Vec<CatalogCandidate> {
    let mut kept: Vec<CatalogCandidate> = Vec::with_capacity(candidates.len());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        match by_name.get(&candidate.resolved_name) {
            Some(&idx) => {
                // Option 的顺序中 None 小于任何 Some
                if candidate.published_date > kept[idx].published_date {
                    kept[idx] = candidate;
                }
            }
            None => {
                by_name.insert(candidate.resolved_name.clone(), kept.len());
                kept.push(candidate);
            }
        }
    }

    kept.into_iter().sorted_by(compare).collect()
}

fn compare(a: &CatalogCandidate, b: &CatalogCandidate) -> Ordering {
    version_key(&b.resolved_name)
        .cmp(&version_key(&a.resolved_name))
        .then_with(|| b.published_date.cmp(&a.published_date))
        .then_with(|| a.resolved_name.cmp(&b.resolved_name))
}
