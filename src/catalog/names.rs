// src/catalog/names.rs

use super::parser;
use crate::{client::RobustClient, constants::catalog::TITLE_PLACEHOLDER, models::CatalogCandidate};
use log::debug;
use regex::Regex;
use std::sync::LazyLock;

/// 常见版本的产品 ID，命中时无需任何网络请求
const PRODUCT_NAMES: &[(&str, &str)] = &[
    ("089-70987", "macOS 15: Sequoia (2025)"),
    ("093-99065", "macOS 15: Sequoia"),
    ("093-52107", "macOS 15: Sequoia"),
    ("093-34000", "macOS 15: Sequoia"),
    ("089-71265", "macOS 14: Sonoma (2025)"),
    ("093-92756", "macOS 14: Sonoma"),
    ("093-53928", "macOS 14: Sonoma"),
    ("093-33776", "macOS 14: Sonoma"),
    ("062-87588", "macOS 14: Sonoma"),
    ("093-22004", "macOS 13: Ventura"),
    ("042-23155", "macOS 13: Ventura"),
    ("052-60131", "macOS 12: Monterey"),
    ("093-37367", "macOS 12: Monterey"),
    ("042-45246", "macOS 11: Big Sur"),
    ("001-79699", "macOS 11: Big Sur"),
    ("041-88800", "macOS 10.15: Catalina"),
    ("061-26589", "macOS 10.15: Catalina"),
    ("001-68446", "macOS 10.15.7: Catalina"),
    ("001-57224", "macOS 10.15.7: Catalina"),
    ("001-51042", "macOS 10.15.7: Catalina"),
    ("001-36801", "macOS 10.15.6: Catalina"),
    ("001-36735", "macOS 10.15.6: Catalina"),
    ("001-15219", "macOS 10.15.5: Catalina"),
    ("001-04366", "macOS 10.15.4: Catalina"),
    ("061-86291", "macOS 10.14.6: Mojave"),
    ("041-91758", "macOS 10.14.6: Mojave"),
    ("061-26578", "macOS 10.14.6: Mojave"),
];

/// 分发文档标题缺失时按营销名称识别
const KEYWORD_NAMES: &[(&[&str], &str)] = &[
    (&["macOSSequoia", "macOS Sequoia"], "macOS 15: Sequoia"),
    (&["macOSSonoma", "macOS Sonoma"], "macOS 14: Sonoma"),
    (&["macOSVentura", "macOS Ventura"], "macOS 13: Ventura"),
    (&["macOSMonterey", "macOS Monterey"], "macOS 12: Monterey"),
    (&["macOSBigSur", "macOS Big Sur"], "macOS 11: Big Sur"),
];

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<title>(.*?)</title>").unwrap());

pub fn static_name(product_id: &str) -> Option<&'static str> {
    PRODUCT_NAMES
        .iter()
        .find(|(pid, _)| *pid == product_id)
        .map(|(_, name)| *name)
}

fn usable(title: &str) -> bool {
    !title.is_empty() && title != TITLE_PLACEHOLDER
}

/// 从分发文档 (XML 文本) 中提取标题，占位符视为缺失
pub fn title_from_distribution(text: &str) -> Option<String> {
    let from_tag = TITLE_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| usable(t));
    from_tag.or_else(|| {
        KEYWORD_NAMES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| text.contains(n)))
            .map(|(_, name)| name.to_string())
    })
}

/// 名称解析顺序: 静态表 > 分发文档 > 服务器元数据 > 合成名称。
/// 任何一步失败都只影响当前候选项。
pub async fn resolve_name(client: &RobustClient, candidate: &CatalogCandidate) -> String {
    let pid = &candidate.product_id;
    if let Some(name) = static_name(pid) {
        return name.to_string();
    }

    if let Some(url) = &candidate.distribution_url {
        match client.fetch_bytes(url).await {
            Ok(data) => {
                if let Some(name) = title_from_distribution(&String::from_utf8_lossy(&data)) {
                    return name;
                }
            }
            Err(e) => debug!("产品 {} 的分发文档获取失败: {}", pid, e),
        }
    }

    if let Some(url) = &candidate.metadata_url {
        let title = match client.fetch_bytes(url).await {
            Ok(data) => parser::parse_document(url, &data)
                .map(|root| parser::metadata_title(&root))
                .unwrap_or_else(|e| {
                    debug!("产品 {} 的元数据解析失败: {}", pid, e);
                    None
                }),
            Err(e) => {
                debug!("产品 {} 的元数据获取失败: {}", pid, e);
                None
            }
        };
        if let Some(title) = title.filter(|t| usable(t)) {
            return title;
        }
    }

    CatalogCandidate::fallback_name(pid)
}
