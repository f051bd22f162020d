// src/downloader/mod.rs

mod store;
mod worker;

pub use store::{TaskStore, rehydrate};
pub use worker::TaskControl;

use self::worker::{TransferOutcome, TransferWorker};
use crate::{
    client::RobustClient,
    config::AppConfig,
    error::*,
    models::{DownloadTask, ProgressSnapshot, TaskEvent, TaskEventKind, TaskId, TaskStatus},
    utils,
};
use log::{debug, error, info, warn};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc;

pub type EventReceiver = mpsc::UnboundedReceiver<TaskEvent>;

struct TaskEntry {
    task: DownloadTask,
    /// 仅在存在活动的传输循环时为 `Some`
    control: Option<TaskControl>,
}

struct EngineInner {
    tasks: Mutex<BTreeMap<TaskId, TaskEntry>>,
    next_id: AtomicU64,
    store: TaskStore,
    client: Arc<RobustClient>,
    config: Arc<AppConfig>,
    events: mpsc::UnboundedSender<TaskEvent>,
}

/// 传输引擎：每个活动任务一个独立的 tokio 任务，任务列表是唯一的状态来源，
/// `tasks.json` 只是它的序列化。
#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<EngineInner>,
}

/// worker 回报进度的通道，只更新计数并转发事件
pub(crate) struct Reporter {
    id: TaskId,
    engine: TransferEngine,
}

impl Reporter {
    pub(crate) fn progress(&self, snapshot: ProgressSnapshot) {
        if let Some(entry) = self.engine.inner.tasks.lock().unwrap().get_mut(&self.id) {
            entry.task.downloaded_bytes = snapshot.downloaded_bytes;
            entry.task.total_bytes = snapshot.total_bytes;
            entry.task.transfer_rate = snapshot.rate;
        }
        self.engine.emit(self.id, TaskEventKind::Progress(snapshot));
    }
}

impl TransferEngine {
    /// 载入并按磁盘内容恢复任务列表。恢复的任务不会自动续传。
    pub async fn start(
        config: Arc<AppConfig>,
        client: Arc<RobustClient>,
    ) -> AppResult<(Self, EventReceiver)> {
        let store = TaskStore::new(config.tasks_file());
        let mut tasks = BTreeMap::new();
        let mut max_id = 0;
        for record in store.load()? {
            let task = rehydrate(record).await?;
            max_id = max_id.max(task.id);
            tasks.insert(task.id, TaskEntry { task, control: None });
        }
        info!("传输引擎启动，恢复了 {} 个任务", tasks.len());

        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                tasks: Mutex::new(tasks),
                next_id: AtomicU64::new(max_id + 1),
                store,
                client,
                config,
                events: tx,
            }),
        };
        engine.persist().await?;
        Ok((engine, rx))
    }

    pub fn tasks(&self) -> Vec<DownloadTask> {
        self.inner
            .tasks
            .lock()
            .unwrap()
            .values()
            .map(|e| e.task.clone())
            .collect()
    }

    pub fn task(&self, id: TaskId) -> Option<DownloadTask> {
        self.inner.tasks.lock().unwrap().get(&id).map(|e| e.task.clone())
    }

    pub fn is_active(&self, id: TaskId) -> bool {
        self.inner
            .tasks
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|e| e.control.is_some())
    }

    /// 同一目标路径已有任务时复用它 (续传)，否则创建新任务并立即开始
    pub async fn start_or_resume_download(
        &self,
        url: &str,
        destination: &Path,
        display_name: &str,
    ) -> AppResult<TaskId> {
        if let Some(id) = self.find_by_destination(destination) {
            debug!("目标 {:?} 已有任务 {}，尝试续传", destination, id);
            self.resume(id).await?;
            return Ok(id);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut task = DownloadTask::new(id, url, destination.to_path_buf(), display_name);
        if let Some(size) = utils::file_size(&task.part_path()).await? {
            task.downloaded_bytes = size;
        }
        info!("创建任务 {} '{}': {} -> {:?}", id, display_name, url, destination);
        self.inner
            .tasks
            .lock()
            .unwrap()
            .insert(id, TaskEntry { task, control: None });
        self.persist().await?;
        self.emit(id, TaskEventKind::StatusChanged(TaskStatus::Pending));

        self.resume(id).await?;
        Ok(id)
    }

    fn find_by_destination(&self, destination: &Path) -> Option<TaskId> {
        self.inner
            .tasks
            .lock()
            .unwrap()
            .values()
            .find(|e| e.task.destination_path == destination)
            .map(|e| e.task.id)
    }

    /// 续传或重试。任务已在下载中时什么也不做。
    pub async fn resume(&self, id: TaskId) -> AppResult<()> {
        let control = match self.activate(id) {
            Ok(Some(control)) => control,
            Ok(None) => return Ok(()),
            Err(AppError::StateConflict(_)) => {
                debug!("任务 {} 已在下载中，忽略续传请求", id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.persist().await?;
        self.emit(id, TaskEventKind::StatusChanged(TaskStatus::Downloading));
        self.spawn_worker(id, control);
        Ok(())
    }

    pub async fn retry(&self, id: TaskId) -> AppResult<()> {
        self.resume(id).await
    }

    /// 把任务切换到 Downloading 并返回新的控制句柄。
    /// 已完成的任务返回 `None`；已有活动循环时返回 `StateConflict`。
    pub(crate) fn activate(&self, id: TaskId) -> AppResult<Option<TaskControl>> {
        let mut tasks = self.inner.tasks.lock().unwrap();
        let entry = tasks.get_mut(&id).ok_or(AppError::TaskNotFound(id))?;
        if entry.control.is_some() || entry.task.status == TaskStatus::Downloading {
            return Err(AppError::StateConflict(id));
        }
        if !entry.task.status.can_start() {
            info!("任务 {} 状态为 {}，无需续传", id, entry.task.status);
            return Ok(None);
        }
        let control = TaskControl::default();
        entry.task.status = TaskStatus::Downloading;
        entry.task.last_error = None;
        entry.task.transfer_rate = 0.0;
        entry.control = Some(control.clone());
        Ok(Some(control))
    }

    fn spawn_worker(&self, id: TaskId, control: TaskControl) {
        let Some(task) = self.task(id) else { return };
        let worker = TransferWorker {
            id,
            part_path: task.part_path(),
            url: task.url,
            destination: task.destination_path,
            total_bytes: task.total_bytes,
            client: self.inner.client.clone(),
            config: self.inner.config.clone(),
            control,
            reporter: Reporter { id, engine: self.clone() },
        };
        let engine = self.clone();
        tokio::spawn(async move {
            let result = worker.run().await;
            engine.complete(id, result).await;
        });
    }

    /// 执行上下文结束：先更新并持久化，再发出最终状态事件
    async fn complete(&self, id: TaskId, result: AppResult<TransferOutcome>) {
        let (status, error_message) = {
            let mut tasks = self.inner.tasks.lock().unwrap();
            match result {
                Ok(TransferOutcome::Cancelled) => {
                    tasks.remove(&id);
                    (TaskStatus::Cancelled, None)
                }
                Ok(TransferOutcome::Finished { total }) => {
                    let Some(task) = settle(&mut tasks, id) else { return };
                    task.status = TaskStatus::Finished;
                    task.downloaded_bytes = total;
                    task.total_bytes = total;
                    (task.status, None)
                }
                Ok(TransferOutcome::Paused { downloaded, total }) => {
                    let Some(task) = settle(&mut tasks, id) else { return };
                    task.status = TaskStatus::Paused;
                    task.downloaded_bytes = downloaded;
                    task.total_bytes = total;
                    (task.status, None)
                }
                Err(e) => {
                    error!("任务 {} 下载失败: {}", id, e);
                    let Some(task) = settle(&mut tasks, id) else { return };
                    task.status = TaskStatus::Error;
                    task.last_error = Some(e.to_string());
                    (task.status, task.last_error.clone())
                }
            }
        };

        if let Err(e) = self.persist().await {
            error!("任务 {} 状态持久化失败: {}", id, e);
        }
        if let Some(message) = error_message {
            self.emit(id, TaskEventKind::Error(message));
        }
        self.emit(id, TaskEventKind::StatusChanged(status));
    }

    /// 只设置标志位，由传输循环在下一个块边界处理
    pub async fn pause(&self, id: TaskId) -> AppResult<()> {
        let tasks = self.inner.tasks.lock().unwrap();
        let entry = tasks.get(&id).ok_or(AppError::TaskNotFound(id))?;
        match &entry.control {
            Some(control) => {
                info!("请求暂停任务 {}", id);
                control.request_pause();
            }
            None => debug!("任务 {} 未在下载，忽略暂停请求", id),
        }
        Ok(())
    }

    /// 破坏性取消：删除 part 文件和目标文件，并从任务列表中移除
    pub async fn cancel(&self, id: TaskId) -> AppResult<()> {
        let removed = {
            let mut tasks = self.inner.tasks.lock().unwrap();
            let entry = tasks.get(&id).ok_or(AppError::TaskNotFound(id))?;
            if let Some(control) = &entry.control {
                info!("请求取消正在下载的任务 {}", id);
                control.request_cancel();
                None
            } else {
                tasks.remove(&id).map(|e| e.task)
            }
        };

        let Some(task) = removed else { return Ok(()) };
        info!("取消任务 {}，删除 {:?}", id, task.destination_path);
        let cleanup = async {
            utils::remove_file_if_exists(&task.part_path()).await?;
            utils::remove_file_if_exists(&task.destination_path).await
        }
        .await;
        if let Err(e) = &cleanup {
            warn!("任务 {} 的文件删除失败: {}", id, e);
        }
        self.persist().await?;
        self.emit(id, TaskEventKind::StatusChanged(TaskStatus::Cancelled));
        cleanup
    }

    async fn persist(&self) -> AppResult<()> {
        let inner = &self.inner;
        inner
            .store
            .save(|| {
                inner
                    .tasks
                    .lock()
                    .unwrap()
                    .values()
                    .map(|e| e.task.to_record())
                    .collect()
            })
            .await
    }

    fn emit(&self, id: TaskId, kind: TaskEventKind) {
        // 接收端被丢弃时不再投递
        let _ = self.inner.events.send(TaskEvent { id, kind });
    }

    pub fn store_path(&self) -> PathBuf {
        self.inner.store.path().to_path_buf()
    }
}

/// 释放执行上下文，返回待更新的任务
fn settle(tasks: &mut BTreeMap<TaskId, TaskEntry>, id: TaskId) -> Option<&mut DownloadTask> {
    let entry = tasks.get_mut(&id)?;
    entry.control = None;
    entry.task.transfer_rate = 0.0;
    Some(&mut entry.task)
}
