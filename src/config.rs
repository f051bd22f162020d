// src/config.rs

pub mod file;

use self::file::{load_or_create_external_config, resolve_config_dir};
use crate::{cli::Cli, constants, error::AppResult};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    /// 对所有主机关闭证书校验，仅用于被中间人代理拦截的网络环境
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// 只对这些主机关闭证书校验 (旧目录端点的证书链经常无法通过校验)
    pub insecure_hosts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    pub catalog_urls: Option<Vec<String>>,
    pub resolver_workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
}

impl ExternalConfig {
    pub(crate) fn default_app_config() -> Self {
        let network = NetworkConfig {
            connect_timeout_secs: Some(10),
            timeout_secs: Some(30),
            read_timeout_secs: Some(30),
            max_retries: Some(2),
            accept_invalid_certs: false,
            insecure_hosts: Some(
                constants::catalog::LEGACY_TLS_HOSTS
                    .iter()
                    .map(|h| h.to_string())
                    .collect(),
            ),
        };
        let catalog = CatalogConfig {
            catalog_urls: Some(default_catalog_urls()),
            resolver_workers: Some(constants::DEFAULT_RESOLVER_WORKERS),
        };
        Self {
            network,
            catalog,
            download_dir: None,
        }
    }
}

/// 新旧两代系统的目录分别发布，按主版本号从新到旧生成全部索引地址
pub fn default_catalog_urls() -> Vec<String> {
    use constants::catalog::*;

    let mut urls = Vec::new();
    for major in (OLDEST_MAJOR..=NEWEST_MAJOR).rev() {
        let chain = (OLDEST_MAJOR..=major)
            .rev()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("-");
        for seed in SEED_TYPES {
            urls.push(format!("{BASE_URL}{major}{seed}-{chain}{LEGACY_SUFFIX}"));
        }
    }
    urls.extend(LEGACY_CATALOGS.iter().map(|tail| format!("{BASE_URL}{tail}")));
    urls
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub download_dir: PathBuf,
    pub catalog_user_agent: String,
    pub download_user_agent: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub accept_invalid_certs: bool,
    pub insecure_hosts: Vec<String>,
    pub catalog_urls: Vec<String>,
    pub resolver_workers: usize,
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let config_dir = resolve_config_dir(args.config_dir.as_deref())?;
        let external_config = load_or_create_external_config(&config_dir)?;
        Ok(Self::from_external(config_dir, external_config))
    }

    fn from_external(config_dir: PathBuf, external: ExternalConfig) -> Self {
        let network = external.network;
        let workers = external
            .catalog
            .resolver_workers
            .unwrap_or(constants::DEFAULT_RESOLVER_WORKERS)
            .clamp(constants::MIN_RESOLVER_WORKERS, constants::MAX_RESOLVER_WORKERS);
        Self {
            download_dir: external
                .download_dir
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_SAVE_DIR)),
            config_dir,
            catalog_user_agent: constants::CATALOG_USER_AGENT.into(),
            download_user_agent: constants::DOWNLOAD_USER_AGENT.into(),
            connect_timeout: Duration::from_secs(network.connect_timeout_secs.unwrap_or(10)),
            timeout: Duration::from_secs(network.timeout_secs.unwrap_or(30)),
            read_timeout: Duration::from_secs(network.read_timeout_secs.unwrap_or(30)),
            max_retries: network.max_retries.unwrap_or(2),
            accept_invalid_certs: network.accept_invalid_certs,
            insecure_hosts: network.insecure_hosts.unwrap_or_default(),
            catalog_urls: external
                .catalog
                .catalog_urls
                .unwrap_or_else(default_catalog_urls),
            resolver_workers: workers,
        }
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.config_dir.join(constants::TASKS_FILE_NAME)
    }

    pub fn catalog_cache_file(&self) -> PathBuf {
        self.config_dir.join(constants::CATALOG_CACHE_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.config_dir.join(constants::LOG_FILE_NAME)
    }
}

#[cfg(any(test, feature = "testing"))]
impl AppConfig {
    /// 测试用配置：不读取用户目录，不配置任何目录地址，超时较短
    pub fn for_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            download_dir: config_dir.join(constants::DEFAULT_SAVE_DIR),
            config_dir,
            catalog_user_agent: "test-agent/1.0".to_string(),
            download_user_agent: "test-agent/1.0".to_string(),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            max_retries: 0,
            accept_invalid_certs: false,
            insecure_hosts: Vec::new(),
            catalog_urls: Vec::new(),
            resolver_workers: constants::MIN_RESOLVER_WORKERS,
        }
    }
}
