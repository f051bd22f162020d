// src/models/task.rs

use crate::{symbols, utils};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// 任务的稳定句柄，创建时分配并随任务持久化
pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Downloading,
    Paused,
    Finished,
    Error,
    Cancelled,
}

impl TaskStatus {
    /// 可以启动一个新的传输循环 (开始/续传/重试)
    pub fn can_start(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Paused | TaskStatus::Error)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Cancelled)
    }

    pub fn get_display_info(
        &self,
    ) -> (
        &'static ColoredString,
        fn(ColoredString) -> ColoredString,
        &'static str,
    ) {
        match self {
            TaskStatus::Pending => (&symbols::INFO, |s| s.cyan(), "等待开始"),
            TaskStatus::Downloading => (&symbols::INFO, |s| s.cyan(), "下载中"),
            TaskStatus::Paused => (&symbols::WARN, |s| s.yellow(), "已暂停 (可续传)"),
            TaskStatus::Finished => (&symbols::OK, |s| s.green(), "下载完成"),
            TaskStatus::Error => (&symbols::ERROR, |s| s.red(), "下载失败 (可重试)"),
            TaskStatus::Cancelled => (&symbols::ERROR, |s| s.red(), "已取消"),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Downloading => "Downloading",
            TaskStatus::Paused => "Paused",
            TaskStatus::Finished => "Finished",
            TaskStatus::Error => "Error",
            TaskStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// 一次镜像传输。由传输引擎独占，对外只提供副本。
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub id: TaskId,
    pub url: String,
    pub destination_path: PathBuf,
    pub display_name: String,
    pub status: TaskStatus,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    /// 字节/秒，每次运行重新计算，不持久化
    pub transfer_rate: f64,
    pub last_error: Option<String>,
}

impl DownloadTask {
    pub fn new(id: TaskId, url: &str, destination_path: PathBuf, display_name: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
            destination_path,
            display_name: display_name.to_string(),
            status: TaskStatus::Pending,
            total_bytes: 0,
            downloaded_bytes: 0,
            transfer_rate: 0.0,
            last_error: None,
        }
    }

    pub fn part_path(&self) -> PathBuf {
        utils::part_path_for(&self.destination_path)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(self.downloaded_bytes, self.total_bytes, self.transfer_rate)
    }

    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            id: self.id,
            url: self.url.clone(),
            destination_path: self.destination_path.clone(),
            display_name: self.display_name.clone(),
            status: self.status,
            total_bytes: self.total_bytes,
        }
    }
}

/// 任务在 `tasks.json` 中的持久化形式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub url: String,
    pub destination_path: PathBuf,
    pub display_name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// 始终位于 [0, 100]
    pub percent: u8,
    pub rate: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

impl ProgressSnapshot {
    pub fn new(downloaded_bytes: u64, total_bytes: u64, rate: f64) -> Self {
        Self {
            percent: compute_percent(downloaded_bytes, total_bytes),
            rate,
            downloaded_bytes,
            total_bytes,
        }
    }

    pub fn rate_display(&self) -> String {
        utils::format_speed(self.rate)
    }
}

fn compute_percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (downloaded as u128 * 100) / total as u128;
    pct.min(100) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEventKind {
    Progress(ProgressSnapshot),
    StatusChanged(TaskStatus),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub id: TaskId,
    pub kind: TaskEventKind,
}
