// src/downloader/store.rs

use crate::{
    error::*,
    models::{DownloadTask, TaskRecord, TaskStatus},
    utils,
};
use anyhow::Context;
use log::{debug, info, warn};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tokio::sync::Mutex as TokioMutex;

/// 任务列表在磁盘上的序列化。
///
/// 每次写入都是整体替换 (临时文件 + 重命名)，并由一把异步锁串行化，
/// 不存在对文件的局部修改。
pub struct TaskStore {
    path: PathBuf,
    write_lock: TokioMutex<()>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: TokioMutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在表示没有任务。损坏的文件会被移到一旁，从空列表开始。
    pub fn load(&self) -> AppResult<Vec<TaskRecord>> {
        if !self.path.is_file() {
            debug!("任务文件 {:?} 不存在，视为空列表", self.path);
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("读取任务文件 '{}' 失败", self.path.display()))?;
        match serde_json::from_str::<Vec<TaskRecord>>(&content) {
            Ok(records) => {
                info!("从 {:?} 载入 {} 个任务", self.path, records.len());
                Ok(records)
            }
            Err(e) => {
                let backup = self.path.with_extension("json.corrupt");
                warn!("任务文件 {:?} 解析失败 ({})，已备份到 {:?}", self.path, e, backup);
                fs::rename(&self.path, &backup)?;
                Ok(Vec::new())
            }
        }
    }

    /// 在写锁内获取快照并整体写入；已取消的任务不会被持久化。
    pub async fn save<F>(&self, snapshot: F) -> AppResult<()>
    where
        F: FnOnce() -> Vec<TaskRecord>,
    {
        let _guard = self.write_lock.lock().await;
        let records: Vec<TaskRecord> = snapshot()
            .into_iter()
            .filter(|r| r.status != TaskStatus::Cancelled)
            .collect();
        self.write_atomic(&records)?;
        debug!("已保存 {} 个任务到 {:?}", records.len(), self.path);
        Ok(())
    }

    fn write_atomic(&self, records: &[TaskRecord]) -> AppResult<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

/// 以磁盘为准恢复任务状态：目标文件存在即完成，只有 part 文件则暂停，
/// 两者都没有则从零开始暂停。从不自动续传。
pub async fn rehydrate(record: TaskRecord) -> AppResult<DownloadTask> {
    let mut task = DownloadTask::new(
        record.id,
        &record.url,
        record.destination_path,
        &record.display_name,
    );
    task.total_bytes = record.total_bytes;

    if let Some(size) = utils::file_size(&task.destination_path).await? {
        task.status = TaskStatus::Finished;
        task.downloaded_bytes = size;
        task.total_bytes = size;
    } else if let Some(size) = utils::file_size(&task.part_path()).await? {
        task.status = TaskStatus::Paused;
        task.downloaded_bytes = size;
    } else {
        task.status = TaskStatus::Paused;
        task.downloaded_bytes = 0;
    }

    if task.status != record.status {
        debug!(
            "任务 {} 记录状态为 {}，按磁盘内容恢复为 {}",
            task.id, record.status, task.status
        );
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, dest: PathBuf, status: TaskStatus) -> TaskRecord {
        TaskRecord {
            id,
            url: format!("https://swcdn.apple.com/{}.dmg", id),
            destination_path: dest,
            display_name: format!("task {}", id),
            status,
            total_bytes: 100,
        }
    }

    #[tokio::test]
    async fn test_missing_file_means_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path().join("tasks.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_drops_cancelled_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path().join("tasks.json"));
        let records = vec![
            record(1, dir.path().join("a.dmg"), TaskStatus::Paused),
            record(2, dir.path().join("b.dmg"), TaskStatus::Cancelled),
            record(3, dir.path().join("c.dmg"), TaskStatus::Finished),
        ];
        store.save(|| records.clone()).await.unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], records[0]);
        assert_eq!(loaded[1], records[2]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{not json").unwrap();
        let store = TaskStore::new(&path);
        assert!(store.load().unwrap().is_empty());
        assert!(dir.path().join("tasks.json.corrupt").is_file());
    }

    #[tokio::test]
    async fn test_rehydrate_trusts_disk_over_record() {
        let dir = tempfile::tempdir().unwrap();

        // 目标文件存在 -> Finished，即使记录为 Downloading
        let done = dir.path().join("done.dmg");
        fs::write(&done, vec![0u8; 42]).unwrap();
        let task = rehydrate(record(1, done, TaskStatus::Downloading)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.downloaded_bytes, 42);

        // 只有 part 文件 -> Paused，并保留已下载字节数
        let partial = dir.path().join("partial.dmg");
        fs::write(utils::part_path_for(&partial), vec![0u8; 7]).unwrap();
        let task = rehydrate(record(2, partial, TaskStatus::Finished)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Paused);
        assert_eq!(task.downloaded_bytes, 7);
        assert_eq!(task.total_bytes, 100);

        // 两者都没有 -> 从零开始的 Paused
        let task = rehydrate(record(3, dir.path().join("none.dmg"), TaskStatus::Error)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Paused);
        assert_eq!(task.downloaded_bytes, 0);
    }
}
