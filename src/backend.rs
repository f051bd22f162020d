// src/backend.rs

use crate::{
    catalog::{CatalogResolver, StatusCallback},
    client::RobustClient,
    config::AppConfig,
    downloader::{EventReceiver, TransferEngine},
    error::*,
    models::{CatalogCandidate, CatalogSnapshot, DownloadTask, TaskId},
    utils,
};
use log::debug;
use std::{path::Path, sync::Arc};
use tokio::task::JoinHandle;

/// 对界面/命令行暴露的全部后端调用
#[derive(Clone)]
pub struct Backend {
    engine: TransferEngine,
    resolver: CatalogResolver,
    config: Arc<AppConfig>,
}

impl Backend {
    pub async fn new(config: Arc<AppConfig>) -> AppResult<(Self, EventReceiver)> {
        let client = Arc::new(RobustClient::new(config.clone())?);
        let (engine, events) = TransferEngine::start(config.clone(), client.clone()).await?;
        let resolver = CatalogResolver::new(client, config.clone());
        Ok((
            Self {
                engine,
                resolver,
                config,
            },
            events,
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn start_or_resume_download(
        &self,
        url: &str,
        destination: &Path,
        display_name: &str,
    ) -> AppResult<TaskId> {
        self.engine
            .start_or_resume_download(url, destination, display_name)
            .await
    }

    /// 以候选项的默认文件名下载到 `dest_dir`
    pub async fn download_candidate(
        &self,
        candidate: &CatalogCandidate,
        dest_dir: &Path,
    ) -> AppResult<TaskId> {
        let file_name = utils::sanitize_filename(&candidate.default_file_name());
        let destination = dest_dir.join(file_name);
        debug!("下载 {} -> {:?}", candidate.product_id, destination);
        self.start_or_resume_download(&candidate.artifact_url, &destination, &candidate.display_label())
            .await
    }

    pub async fn pause(&self, id: TaskId) -> AppResult<()> {
        self.engine.pause(id).await
    }

    pub async fn cancel(&self, id: TaskId) -> AppResult<()> {
        self.engine.cancel(id).await
    }

    pub async fn resume(&self, id: TaskId) -> AppResult<()> {
        self.engine.resume(id).await
    }

    pub async fn retry(&self, id: TaskId) -> AppResult<()> {
        self.engine.retry(id).await
    }

    pub fn tasks(&self) -> Vec<DownloadTask> {
        self.engine.tasks()
    }

    pub fn task(&self, id: TaskId) -> Option<DownloadTask> {
        self.engine.task(id)
    }

    pub async fn scan_catalog(&self, on_status: StatusCallback) -> CatalogSnapshot {
        self.resolver.scan(&on_status).await
    }

    pub fn cached_catalog(&self) -> Option<CatalogSnapshot> {
        self.resolver.load_cached()
    }

    /// 立即返回缓存 (可能没有)，同时在后台重新扫描
    pub fn scan_catalog_cached_first(
        &self,
        on_status: StatusCallback,
    ) -> (Option<CatalogSnapshot>, JoinHandle<CatalogSnapshot>) {
        let cached = self.cached_catalog().filter(|s| !s.is_empty());
        let resolver = self.resolver.clone();
        let handle = tokio::spawn(async move { resolver.scan(&on_status).await });
        (cached, handle)
    }
}
