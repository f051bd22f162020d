// src/client.rs

use crate::{config::AppConfig, error::*};
use futures::TryStreamExt;
use log::{debug, warn};
use reqwest::{
    StatusCode,
    header::{self, HeaderMap},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::{io, pin::Pin, sync::Arc};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// 流式 GET 的结果。状态码原样交给调用方解释 (403/404 不视为错误)
pub struct TransferResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyReader,
}

impl TransferResponse {
    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers)
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// HTTP 客户端适配层。
///
/// 传输请求不做任何重试，重试策略由传输引擎决定；目录、元数据等小文档
/// 经过带指数退避的中间件获取。
///
/// 不校验证书的客户端默认只用于 `insecure_hosts` 中列出的主机；
/// 设置 `accept_invalid_certs` 后对所有主机生效。
#[derive(Clone)]
pub struct RobustClient {
    transfer: reqwest::Client,
    documents: ClientWithMiddleware,
    relaxed: Option<(reqwest::Client, ClientWithMiddleware)>,
    config: Arc<AppConfig>,
}

impl RobustClient {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let global_relax = config.accept_invalid_certs;
        if global_relax {
            warn!("已对所有主机关闭 TLS 证书校验");
        }
        let transfer = Self::build_transfer_client(&config, global_relax)?;
        let documents = Self::build_document_client(&config, global_relax)?;

        let relaxed = if !global_relax && !config.insecure_hosts.is_empty() {
            debug!("对以下主机关闭 TLS 证书校验: {:?}", config.insecure_hosts);
            Some((
                Self::build_transfer_client(&config, true)?,
                Self::build_document_client(&config, true)?,
            ))
        } else {
            None
        };

        Ok(Self {
            transfer,
            documents,
            relaxed,
            config,
        })
    }

    fn build_transfer_client(config: &AppConfig, relaxed: bool) -> AppResult<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(config.download_user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(relaxed)
            .build()?)
    }

    fn build_document_client(config: &AppConfig, relaxed: bool) -> AppResult<ClientWithMiddleware> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let inner = reqwest::Client::builder()
            .user_agent(config.catalog_user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(relaxed)
            .build()?;
        Ok(ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build())
    }

    fn is_relaxed_host(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .is_some_and(|host| self.config.insecure_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)))
    }

    fn transfer_client(&self, url: &str) -> &reqwest::Client {
        match &self.relaxed {
            Some((client, _)) if self.is_relaxed_host(url) => client,
            _ => &self.transfer,
        }
    }

    fn document_client(&self, url: &str) -> &ClientWithMiddleware {
        match &self.relaxed {
            Some((_, client)) if self.is_relaxed_host(url) => client,
            _ => &self.documents,
        }
    }

    /// 通过 HEAD 获取资源大小；服务器未返回长度或返回非成功状态时为 `None`
    pub async fn head_content_length(&self, url: &str) -> AppResult<Option<u64>> {
        let res = self
            .transfer_client(url)
            .head(url)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| map_timeout(e, url))?;
        if !res.status().is_success() {
            debug!("HEAD '{}' 返回 {}，忽略", url, res.status());
            return Ok(None);
        }
        Ok(content_length(res.headers()))
    }

    /// 发起流式 GET，响应头在 `timeout` 内必须到达
    pub async fn streaming_get(&self, url: &str, headers: HeaderMap) -> AppResult<TransferResponse> {
        let request = self.transfer_client(url).get(url).headers(headers).send();
        let res = tokio::time::timeout(self.config.timeout, request)
            .await
            .map_err(|_| AppError::Timeout(format!("等待 '{}' 的响应超时", url)))?
            .map_err(|e| map_timeout(e, url))?;

        let status = res.status();
        let headers = res.headers().clone();
        let stream = res.bytes_stream().map_err(io::Error::other);
        Ok(TransferResponse {
            status,
            headers,
            body: Box::pin(StreamReader::new(stream)),
        })
    }

    /// 获取目录或元数据文档的完整内容
    pub async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        let res = self.document_client(url).get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus { url: url.to_string(), status });
        }
        Ok(res.bytes().await?.to_vec())
    }
}

fn map_timeout(e: reqwest::Error, url: &str) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(url.to_string())
    } else {
        AppError::Network(e)
    }
}
