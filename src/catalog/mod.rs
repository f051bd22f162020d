// src/catalog/mod.rs

pub mod cache;
pub mod names;
pub mod parser;
pub mod ranking;

use crate::{client::RobustClient, config::AppConfig, models::CatalogCandidate, models::CatalogSnapshot};
use chrono::Utc;
use futures::{StreamExt, stream};
use log::{debug, error, info, warn};
use std::{collections::HashSet, sync::Arc};

/// 扫描阶段的文字状态回调
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// 目录解析器：抓取目录索引，提取候选项，解析名称，排序并写入缓存。
#[derive(Clone)]
pub struct CatalogResolver {
    client: Arc<RobustClient>,
    config: Arc<AppConfig>,
}

/// 一次扫描的去重状态，随扫描创建和销毁
#[derive(Default)]
struct ScanState {
    seen_products: HashSet<String>,
    seen_urls: HashSet<String>,
    candidates: Vec<CatalogCandidate>,
    reachable: usize,
}

impl ScanState {
    fn admit(&mut self, candidate: CatalogCandidate) {
        if self.seen_products.contains(&candidate.product_id) {
            debug!("产品 {} 已出现过，跳过", candidate.product_id);
            return;
        }
        if !self.seen_urls.insert(candidate.artifact_url.clone()) {
            debug!(
                "产品 {} 指向已出现的镜像 {}，跳过",
                candidate.product_id, candidate.artifact_url
            );
            return;
        }
        self.seen_products.insert(candidate.product_id.clone());
        self.candidates.push(candidate);
    }
}

impl CatalogResolver {
    pub fn new(client: Arc<RobustClient>, config: Arc<AppConfig>) -> Self {
        Self { client, config }
    }

    pub fn load_cached(&self) -> Option<CatalogSnapshot> {
        cache::load(&self.config.catalog_cache_file())
    }

    /// 完整扫描。单个目录的失败只会让它的候选项缺席；
    /// 所有目录都无法访问时返回缓存 (或空列表) 并标记为过期。
    pub async fn scan(&self, on_status: &StatusCallback) -> CatalogSnapshot {
        let mut state = ScanState::default();
        let total = self.config.catalog_urls.len();

        for (idx, url) in self.config.catalog_urls.iter().enumerate() {
            on_status(&format!("正在扫描目录 {}/{}...", idx + 1, total));
            let data = match self.client.fetch_bytes(url).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("目录 {} 获取失败，跳过: {}", url, e);
                    continue;
                }
            };
            state.reachable += 1;

            let root = match parser::parse_document(url, &data) {
                Ok(root) => root,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            let found = parser::extract_candidates(&root);
            debug!("目录 {} 包含 {} 个候选项", url, found.len());
            for candidate in found {
                state.admit(candidate);
            }
        }

        if state.reachable == 0 && total > 0 {
            error!("无法访问任何目录 (共 {} 个)", total);
            on_status("无法访问任何目录，显示缓存的列表");
            let mut snapshot = self.load_cached().unwrap_or_default();
            snapshot.stale = true;
            return snapshot;
        }

        on_status(&format!("正在解析 {} 个版本的名称...", state.candidates.len()));
        let resolved = self.resolve_names(state.candidates).await;
        let snapshot = CatalogSnapshot {
            scanned_at: Some(Utc::now()),
            entries: ranking::rank(resolved),
            stale: false,
        };

        if let Err(e) = cache::save(&self.config.catalog_cache_file(), &snapshot) {
            warn!("目录缓存写入失败: {}", e);
        }
        info!("目录扫描完成，共 {} 个版本", snapshot.entries.len());
        on_status(&format!("扫描完成，共 {} 个版本", snapshot.entries.len()));
        snapshot
    }

    /// 有界并发地解析名称；结果按输入顺序汇合
    async fn resolve_names(&self, candidates: Vec<CatalogCandidate>) -> Vec<CatalogCandidate> {
        stream::iter(candidates)
            .map(|mut candidate| {
                let client = self.client.clone();
                async move {
                    candidate.resolved_name = names::resolve_name(&client, &candidate).await;
                    candidate
                }
            })
            .buffered(self.config.resolver_workers)
            .collect()
            .await
    }
}
