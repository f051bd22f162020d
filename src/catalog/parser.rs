// src/catalog/parser.rs

use crate::{
    constants::catalog::keys,
    error::{AppError, AppResult},
    models::CatalogCandidate,
};
use chrono::{DateTime, Utc};
use log::trace;
use plist::{Dictionary, Value};
use std::{io::Cursor, time::SystemTime};

/// 把目录或元数据文档解析为通用的键值树
pub fn parse_document(url: &str, data: &[u8]) -> AppResult<Value> {
    Value::from_reader(Cursor::new(data)).map_err(|source| AppError::Plist {
        url: url.to_string(),
        source,
    })
}

/// 按目录中的顺序提取候选项。未解析名称，`resolved_name` 为空。
pub fn extract_candidates(root: &Value) -> Vec<CatalogCandidate> {
    let Some(products) = root
        .as_dictionary()
        .and_then(|d| d.get(keys::PRODUCTS))
        .and_then(Value::as_dictionary)
    else {
        return Vec::new();
    };

    products
        .iter()
        .filter_map(|(pid, record)| {
            let candidate = record.as_dictionary().and_then(|r| candidate_from_record(pid, r));
            if candidate.is_none() {
                trace!("产品 {} 不含恢复镜像或完整安装器，跳过", pid);
            }
            candidate
        })
        .collect()
}

fn candidate_from_record(product_id: &str, record: &Dictionary) -> Option<CatalogCandidate> {
    let mut base_system = None;
    let mut installer = None;
    let mut chunklist: Option<&str> = None;

    let urls = record
        .get(keys::PACKAGES)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|pkg| pkg.as_dictionary()?.get(keys::URL)?.as_string());

    for url in urls {
        let lower = url.to_ascii_lowercase();
        if lower.contains("basesystem") && lower.contains(".dmg") {
            base_system.get_or_insert(url);
        } else if lower.contains("installassistant") && lower.contains(".pkg") {
            installer.get_or_insert(url);
        }
        if lower.contains("chunklist") {
            // 优先使用 BaseSystem 的校验清单
            if lower.contains("basesystem") || chunklist.is_none() {
                chunklist = Some(url);
            }
        }
    }

    let (artifact_url, is_full_installer) = match (base_system, installer) {
        (Some(url), _) => (url, false),
        (None, Some(url)) => (url, true),
        (None, None) => return None,
    };

    Some(CatalogCandidate {
        product_id: product_id.to_string(),
        artifact_url: artifact_url.to_string(),
        signature_url: chunklist.map(str::to_string),
        metadata_url: record
            .get(keys::SERVER_METADATA_URL)
            .and_then(Value::as_string)
            .map(str::to_string),
        distribution_url: english_distribution(record),
        published_date: record
            .get(keys::POST_DATE)
            .and_then(Value::as_date)
            .map(|d| DateTime::<Utc>::from(SystemTime::from(d))),
        resolved_name: String::new(),
        is_full_installer,
    })
}

fn english_distribution(record: &Dictionary) -> Option<String> {
    let dists = record.get(keys::DISTRIBUTIONS)?.as_dictionary()?;
    dists
        .get("English")
        .or_else(|| dists.get("en"))
        .and_then(Value::as_string)
        .map(str::to_string)
}

/// 元数据文档中的 `localization.English.title`
pub fn metadata_title(root: &Value) -> Option<String> {
    root.as_dictionary()?
        .get(keys::LOCALIZATION)?
        .as_dictionary()?
        .get("English")?
        .as_dictionary()?
        .get(keys::TITLE)?
        .as_string()
        .map(|s| s.trim().to_string())
}
