// src/config/file.rs

use crate::{
    config::ExternalConfig,
    constants,
    error::{AppError, AppResult},
};
use anyhow::Context;
use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// 配置根目录: 命令行参数 > 环境变量 > 平台配置目录
pub(crate) fn resolve_config_dir(cli_dir: Option<&Path>) -> AppResult<PathBuf> {
    let dir = if let Some(dir) = cli_dir {
        debug!("使用来自命令行参数的配置目录");
        dir.to_path_buf()
    } else if let Ok(dir) = std::env::var(constants::CONFIG_DIR_ENV) && !dir.is_empty() {
        debug!("使用来自环境变量 {} 的配置目录", constants::CONFIG_DIR_ENV);
        PathBuf::from(dir)
    } else {
        dirs::config_dir()
            .ok_or_else(|| AppError::Config("无法获取平台配置目录".to_string()))?
            .join(constants::CONFIG_DIR_NAME)
    };

    fs::create_dir_all(&dir)
        .map_err(|e| AppError::Config(format!("无法创建配置目录 '{}': {}", dir.display(), e)))?;
    Ok(dir)
}

pub(crate) fn load_or_create_external_config(config_dir: &Path) -> AppResult<ExternalConfig> {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);
    if config_path.is_file() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("读取配置文件 '{}' 失败", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件 '{}' 失败", config_path.display()))
            .map_err(AppError::from)
    } else {
        info!("配置文件 {:?} 不存在，将创建默认配置。", config_path);
        let config = ExternalConfig::default_app_config();
        let json_content = serde_json::to_string_pretty(&config)?;
        fs::write(&config_path, json_content)
            .with_context(|| format!("写入配置文件 '{}' 失败", config_path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let created = load_or_create_external_config(dir.path()).unwrap();
        assert!(dir.path().join(constants::CONFIG_FILE_NAME).is_file());

        let reloaded = load_or_create_external_config(dir.path()).unwrap();
        assert_eq!(
            created.catalog.catalog_urls.map(|u| u.len()),
            reloaded.catalog.catalog_urls.map(|u| u.len())
        );
    }

    #[test]
    fn test_cli_dir_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("cfg");
        let resolved = resolve_config_dir(Some(&nested)).unwrap();
        assert_eq!(resolved, nested);
        assert!(nested.is_dir());
    }
}
