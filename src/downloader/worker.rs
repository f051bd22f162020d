// src/downloader/worker.rs

use super::Reporter;
use crate::{
    client::{BodyReader, RobustClient},
    config::AppConfig,
    constants,
    error::*,
    models::{ProgressSnapshot, TaskId},
    utils,
};
use anyhow::anyhow;
use log::{debug, info, warn};
use reqwest::{
    StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
};

/// 暂停/取消信号。界面侧只翻转标志位，传输循环在块边界检查。
#[derive(Clone, Default, Debug)]
pub struct TaskControl {
    pause: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interruption {
    Pause,
    Cancel,
}

impl TaskControl {
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::Relaxed);
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn interruption(&self) -> Option<Interruption> {
        if self.cancel.load(Ordering::Relaxed) {
            Some(Interruption::Cancel)
        } else if self.pause.load(Ordering::Relaxed) {
            Some(Interruption::Pause)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TransferOutcome {
    Finished { total: u64 },
    Paused { downloaded: u64, total: u64 },
    Cancelled,
}

/// 单个任务的一次执行上下文。续传会创建新的 worker。
pub(super) struct TransferWorker {
    pub(super) id: TaskId,
    pub(super) url: String,
    pub(super) destination: PathBuf,
    pub(super) part_path: PathBuf,
    pub(super) total_bytes: u64,
    pub(super) client: Arc<RobustClient>,
    pub(super) config: Arc<AppConfig>,
    pub(super) control: TaskControl,
    pub(super) reporter: Reporter,
}

impl TransferWorker {
    /// 运行到结束。请求过取消时，即使传输以错误结束也按取消处理。
    pub(super) async fn run(mut self) -> AppResult<TransferOutcome> {
        match self.transfer().await {
            Err(e) if self.control.interruption() == Some(Interruption::Cancel) => {
                debug!("任务 {}: 传输以错误结束 ({})，但已请求取消", self.id, e);
                self.interrupt(Interruption::Cancel, 0).await
            }
            result => result,
        }
    }

    async fn transfer(&mut self) -> AppResult<TransferOutcome> {
        let on_disk = utils::file_size(&self.part_path).await?.unwrap_or(0);
        debug!("任务 {}: part 文件已有 {} 字节", self.id, on_disk);

        let url = utils::force_https(&self.url);
        if self.total_bytes == 0 {
            match self.client.head_content_length(&url).await {
                Ok(Some(len)) => self.total_bytes = len,
                Ok(None) => debug!("任务 {}: HEAD 未返回文件大小", self.id),
                Err(e) => warn!("任务 {}: HEAD 请求失败，改用 GET 响应的长度: {}", self.id, e),
            }
        }

        if let Some(parent) = self.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut resume_from = on_disk;
        let mut restarted = false;
        let response = loop {
            let res = self.client.streaming_get(&url, range_headers(resume_from)?).await?;

            if res.status == StatusCode::RANGE_NOT_SATISFIABLE && resume_from > 0 {
                if part_is_complete(resume_from, self.total_bytes) {
                    info!("任务 {}: part 文件已完整，直接完成", self.id);
                    return self.finalize(resume_from).await;
                }
                if restarted {
                    return Err(AppError::HttpStatus { url, status: res.status });
                }
                warn!("任务 {}: 续传点 {} 无效，将从头开始下载", self.id, resume_from);
                utils::remove_file_if_exists(&self.part_path).await?;
                resume_from = 0;
                restarted = true;
                continue;
            }
            if !res.status.is_success() {
                return Err(AppError::HttpStatus { url, status: res.status });
            }
            break res;
        };

        if resume_from > 0 && response.status != StatusCode::PARTIAL_CONTENT {
            let err = AppError::RangeNotHonored { requested: resume_from };
            warn!("任务 {}: {}，丢弃已下载内容并从头开始", self.id, err);
            resume_from = 0;
        }

        if self.total_bytes == 0 && let Some(len) = response.content_length() {
            self.total_bytes = len + resume_from;
        }

        let file = if resume_from > 0 {
            OpenOptions::new().append(true).open(&self.part_path).await?
        } else {
            File::create(&self.part_path).await?
        };

        self.stream_body(response.body, file, resume_from).await
    }

    async fn stream_body(
        &self,
        mut body: BodyReader,
        mut file: File,
        resume_from: u64,
    ) -> AppResult<TransferOutcome> {
        let started = Instant::now();
        let mut downloaded = resume_from;
        // 只统计本次运行传输的字节，之前暂停留下的部分不计入速度
        let mut session_bytes: u64 = 0;
        let mut buf = vec![0u8; constants::CHUNK_SIZE];

        loop {
            if let Some(signal) = self.control.interruption() {
                file.flush().await?;
                drop(file);
                return self.interrupt(signal, downloaded).await;
            }

            let n = tokio::time::timeout(self.config.read_timeout, read_chunk(&mut body, &mut buf))
                .await
                .map_err(|_| AppError::Timeout(format!("读取 '{}' 的数据超时", self.url)))??;
            if n == 0 {
                break;
            }

            file.write_all(&buf[..n]).await?;
            downloaded += n as u64;
            session_bytes += n as u64;

            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { session_bytes as f64 / elapsed } else { 0.0 };
            self.reporter
                .progress(ProgressSnapshot::new(downloaded, self.total_bytes, rate));
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(signal) = self.control.interruption() {
            return self.interrupt(signal, downloaded).await;
        }
        if self.total_bytes > 0 && downloaded < self.total_bytes {
            return Err(AppError::Other(anyhow!(
                "连接提前结束 (已接收 {} / {} 字节)",
                downloaded,
                self.total_bytes
            )));
        }
        self.finalize(downloaded).await
    }

    async fn interrupt(&self, signal: Interruption, downloaded: u64) -> AppResult<TransferOutcome> {
        match signal {
            Interruption::Pause => {
                info!("任务 {}: 已在 {} 字节处暂停", self.id, downloaded);
                Ok(TransferOutcome::Paused {
                    downloaded,
                    total: self.total_bytes,
                })
            }
            Interruption::Cancel => {
                info!("任务 {}: 已取消，删除临时文件和目标文件", self.id);
                utils::remove_file_if_exists(&self.part_path).await?;
                utils::remove_file_if_exists(&self.destination).await?;
                Ok(TransferOutcome::Cancelled)
            }
        }
    }

    /// 用 part 文件替换目标文件
    async fn finalize(&self, downloaded: u64) -> AppResult<TransferOutcome> {
        // Windows 上 rename 不会覆盖已存在的文件
        #[cfg(windows)]
        utils::remove_file_if_exists(&self.destination).await?;
        tokio::fs::rename(&self.part_path, &self.destination).await?;
        info!("任务 {}: 下载完成 -> {:?}", self.id, self.destination);
        Ok(TransferOutcome::Finished { total: downloaded })
    }
}

/// 416 时只有大小恰好等于已知总大小的 part 文件才算完整
fn part_is_complete(on_disk: u64, total: u64) -> bool {
    total > 0 && on_disk == total
}

fn range_headers(resume_from: u64) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if resume_from > 0 {
        let value = HeaderValue::try_from(format!("bytes={}-", resume_from))
            .map_err(|e| anyhow!(e))?;
        headers.insert(header::RANGE, value);
    }
    Ok(headers)
}

/// 尽量填满一个块；返回 0 表示数据流结束
async fn read_chunk(body: &mut BodyReader, buf: &mut [u8]) -> AppResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = body.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_wins_over_pause() {
        let control = TaskControl::default();
        assert_eq!(control.interruption(), None);
        control.request_pause();
        assert_eq!(control.interruption(), Some(Interruption::Pause));
        control.request_cancel();
        assert_eq!(control.interruption(), Some(Interruption::Cancel));
    }

    #[test]
    fn test_only_exact_size_part_counts_as_complete() {
        assert!(part_is_complete(4096, 4096));
        assert!(!part_is_complete(5000, 4096));
        assert!(!part_is_complete(1024, 4096));
        assert!(!part_is_complete(1024, 0));
    }

    #[test]
    fn test_range_header_only_when_resuming() {
        assert!(range_headers(0).unwrap().get(header::RANGE).is_none());
        assert_eq!(
            range_headers(4096).unwrap().get(header::RANGE).unwrap(),
            "bytes=4096-"
        );
    }

    #[tokio::test]
    async fn test_read_chunk_fills_fixed_size_blocks() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut body: BodyReader = Box::pin(std::io::Cursor::new(data.clone()));
        let mut buf = vec![0u8; constants::CHUNK_SIZE];

        assert_eq!(read_chunk(&mut body, &mut buf).await.unwrap(), constants::CHUNK_SIZE);
        assert_eq!(read_chunk(&mut body, &mut buf).await.unwrap(), constants::CHUNK_SIZE);
        let tail = 20_000 - 2 * constants::CHUNK_SIZE;
        assert_eq!(read_chunk(&mut body, &mut buf).await.unwrap(), tail);
        assert_eq!(&buf[..tail], &data[2 * constants::CHUNK_SIZE..]);
        assert_eq!(read_chunk(&mut body, &mut buf).await.unwrap(), 0);
    }
}
