// src/error.rs

use crate::models::TaskId;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("网络中间件错误: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),
    #[error("服务器返回错误状态 {status}: {url}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("网络请求超时: {0}")]
    Timeout(String),
    #[error("服务器忽略了续传请求 (请求起点: {requested})")]
    RangeNotHonored { requested: u64 },
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("临时文件持久化失败: {0}")]
    TempFilePersist(#[from] tempfile::PersistError),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("无法解析来自 '{url}' 的 plist 文档: {source}")]
    Plist {
        url: String,
        #[source]
        source: plist::Error,
    },
    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),
    #[error("任务 {0} 已在下载中")]
    StateConflict(TaskId),
    #[error("未找到任务 {0}")]
    TaskNotFound(TaskId),
    #[error("配置错误: {0}")]
    Config(String),
    #[error("用户中断")]
    UserInterrupt,
    #[error("{0}")] // 只打印内部信息，不加任何前缀
    UserInputError(String),
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 网络层面的失败 (DNS/TLS/超时/非成功状态码)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Network(_)
                | AppError::NetworkMiddleware(_)
                | AppError::HttpStatus { .. }
                | AppError::Timeout(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
