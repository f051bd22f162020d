// src/workflows.rs

use crate::{
    Backend,
    catalog::StatusCallback,
    cli::Cli,
    constants,
    downloader::EventReceiver,
    error::{AppError, AppResult},
    models::{CatalogCandidate, CatalogSnapshot, TaskEventKind, TaskId, TaskStatus},
    symbols, ui, utils,
};
use anyhow::anyhow;
use colored::*;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::{debug, info};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

fn scan_spinner() -> ProgressBar {
    let pbar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pbar.enable_steady_tick(Duration::from_millis(120));
    pbar
}

fn status_callback(pbar: &ProgressBar) -> StatusCallback {
    let pbar = pbar.clone();
    Arc::new(move |status: &str| pbar.set_message(status.to_string()))
}

fn print_catalog(snapshot: &CatalogSnapshot) {
    if snapshot.is_empty() {
        ui::warn("没有找到可下载的镜像。");
        return;
    }
    let scanned = snapshot
        .scanned_at
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "未知".to_string());
    let marker = if snapshot.stale { format!(" {}", *symbols::STALE) } else { String::new() };
    ui::print_sub_header(&format!("可下载镜像 (共 {} 个，扫描于 {}){}", snapshot.entries.len(), scanned, marker));
    let pad = snapshot.entries.len().to_string().len();
    for (i, candidate) in snapshot.entries.iter().enumerate() {
        println!(
            "  [{}] {}  {}",
            format!("{:>pad$}", i + 1, pad = pad).yellow(),
            candidate.product_id.cyan(),
            utils::truncate_text(&candidate.display_label(), constants::UI_WIDTH - 20)
        );
    }
}

/// 扫描目录。默认先显示缓存，再显示后台扫描的结果。
pub(crate) async fn run_scan(backend: &Backend, refresh: bool) -> AppResult<()> {
    ui::print_header("扫描软件更新目录");
    let pbar = scan_spinner();

    let snapshot = if refresh {
        backend.scan_catalog(status_callback(&pbar)).await
    } else {
        let (cached, handle) = backend.scan_catalog_cached_first(status_callback(&pbar));
        if let Some(cached) = &cached {
            pbar.suspend(|| {
                ui::info("以下为上次扫描的结果，正在后台刷新...");
                print_catalog(cached);
            });
        }
        handle
            .await
            .map_err(|e| AppError::Other(anyhow!("目录扫描任务异常退出: {}", e)))?
    };
    pbar.finish_and_clear();

    if snapshot.stale {
        ui::warn("无法访问任何目录，显示的是缓存内容。");
    }
    print_catalog(&snapshot);
    ui::plain("");
    ui::info("使用 --download <PRODUCT_ID> 下载指定镜像。");
    Ok(())
}

pub(crate) fn run_list(backend: &Backend) -> AppResult<()> {
    ui::print_header("下载任务");
    let tasks = backend.tasks();
    if tasks.is_empty() {
        ui::info("当前没有任何任务。");
        return Ok(());
    }
    for task in &tasks {
        ui::print_task_line(task);
    }
    ui::plain("");
    ui::info("使用 --resume <TASK_ID> 续传，--cancel <TASK_ID> 取消并删除文件。");
    Ok(())
}

fn output_dir(args: &Cli, backend: &Backend) -> AppResult<PathBuf> {
    let dir = args
        .output
        .clone()
        .unwrap_or_else(|| backend.config().download_dir.clone());
    std::fs::create_dir_all(&dir)?;
    Ok(dunce::canonicalize(&dir).unwrap_or(dir))
}

/// 先在缓存中查找产品，找不到时重新扫描一次
async fn find_candidate(backend: &Backend, product_id: &str, refresh: bool) -> AppResult<CatalogCandidate> {
    if !refresh
        && let Some(found) = backend
            .cached_catalog()
            .and_then(|s| s.find(product_id).cloned())
    {
        debug!("在缓存中找到产品 {}", product_id);
        return Ok(found);
    }

    let pbar = scan_spinner();
    let snapshot = backend.scan_catalog(status_callback(&pbar)).await;
    pbar.finish_and_clear();
    snapshot.find(product_id).cloned().ok_or_else(|| {
        AppError::UserInputError(format!("目录中没有找到产品 '{}'，请先使用 --scan 查看可用列表。", product_id))
    })
}

pub(crate) async fn run_download(
    backend: &Backend,
    events: EventReceiver,
    args: &Cli,
    product_id: &str,
    interrupt: Arc<AtomicBool>,
) -> AppResult<()> {
    if !utils::is_product_id(product_id) {
        ui::warn(&format!("'{}' 看起来不是常见的产品 ID 格式 (例如 093-22004)。", product_id));
    }
    let candidate = find_candidate(backend, product_id, args.refresh).await?;
    let dir = output_dir(args, backend)?;

    ui::print_header(&candidate.display_label());
    if candidate.is_full_installer {
        ui::warn("这是完整安装器，文件较大，下载需要更长时间。");
    }
    let id = backend.download_candidate(&candidate, &dir).await?;
    follow_task(backend, events, id, interrupt).await
}

pub(crate) async fn run_url(
    backend: &Backend,
    events: EventReceiver,
    args: &Cli,
    url: &str,
    interrupt: Arc<AtomicBool>,
) -> AppResult<()> {
    let parsed = url::Url::parse(url)?;
    let file_name = args
        .name
        .clone()
        .or_else(|| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .map(|s| percent_encoding::percent_decode_str(s).decode_utf8_lossy().to_string())
        })
        .ok_or_else(|| AppError::UserInputError("无法从链接推断文件名，请使用 --name 指定。".to_string()))?;
    let destination = output_dir(args, backend)?.join(utils::sanitize_filename(&file_name));

    ui::print_header(&format!("下载 {}", utils::truncate_text(&file_name, constants::NAME_TRUNCATE_LENGTH)));
    let id = backend
        .start_or_resume_download(url, &destination, &file_name)
        .await?;
    follow_task(backend, events, id, interrupt).await
}

pub(crate) async fn run_resume(
    backend: &Backend,
    events: EventReceiver,
    id: TaskId,
    interrupt: Arc<AtomicBool>,
) -> AppResult<()> {
    let task = backend.task(id).ok_or(AppError::TaskNotFound(id))?;
    ui::print_header(&format!("续传任务 #{}: {}", id, task.display_name));
    backend.resume(id).await?;
    follow_task(backend, events, id, interrupt).await
}

pub(crate) async fn run_cancel(backend: &Backend, id: TaskId) -> AppResult<()> {
    let task = backend.task(id).ok_or(AppError::TaskNotFound(id))?;
    backend.cancel(id).await?;
    ui::success(&format!("任务 #{} 已取消，已删除 {}", id, task.destination_path.display()));
    Ok(())
}

/// 显示单个任务的进度直到它停止。中断标志被设置时请求暂停。
async fn follow_task(
    backend: &Backend,
    mut events: EventReceiver,
    id: TaskId,
    interrupt: Arc<AtomicBool>,
) -> AppResult<()> {
    let Some(task) = backend.task(id) else {
        return Err(AppError::TaskNotFound(id));
    };
    if task.status == TaskStatus::Finished {
        ui::success(&format!("文件已存在: {}", task.destination_path.display()));
        return Ok(());
    }

    ui::info(&format!(
        "任务 #{} -> {} (按 {} 暂停)",
        id,
        task.destination_path.display(),
        *symbols::CTRL_C
    ));
    let pbar = ui::new_bytes_progress_bar(task.total_bytes, "下载");
    pbar.enable_steady_tick(Duration::from_millis(200));
    pbar.set_position(task.downloaded_bytes);

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut pause_requested = false;
    let mut last_error = None;

    let final_status = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break TaskStatus::Error };
                if event.id != id {
                    continue;
                }
                match event.kind {
                    TaskEventKind::Progress(p) => {
                        if p.total_bytes > 0 && pbar.length() != Some(p.total_bytes) {
                            pbar.set_length(p.total_bytes);
                        }
                        pbar.set_position(p.downloaded_bytes);
                        pbar.set_message(p.rate_display());
                    }
                    TaskEventKind::Error(message) => last_error = Some(message),
                    TaskEventKind::StatusChanged(status) if status != TaskStatus::Downloading && status != TaskStatus::Pending => {
                        break status;
                    }
                    TaskEventKind::StatusChanged(_) => {}
                }
            }
            _ = ticker.tick() => {
                if !pause_requested && interrupt.load(Ordering::Relaxed) {
                    pause_requested = true;
                    info!("收到中断信号，暂停任务 {}", id);
                    backend.pause(id).await?;
                }
            }
        }
    };
    pbar.finish_and_clear();

    let task = backend.task(id);
    match final_status {
        TaskStatus::Finished => {
            let size = task.map(|t| t.total_bytes).unwrap_or_default();
            ui::success(&format!("下载完成 ({})", HumanBytes(size)));
            Ok(())
        }
        TaskStatus::Paused => {
            ui::warn(&format!("任务已暂停，使用 --resume {} 可继续下载。", id));
            if pause_requested { Err(AppError::UserInterrupt) } else { Ok(()) }
        }
        TaskStatus::Cancelled => {
            ui::warn("任务已取消。");
            Ok(())
        }
        _ => {
            let message = last_error
                .or_else(|| task.and_then(|t| t.last_error))
                .unwrap_or_else(|| "未知错误".to_string());
            ui::error(&format!("下载失败: {}", message));
            ui::info(&format!("使用 --resume {} 可重试。", id));
            Err(AppError::Other(anyhow!("任务 {} 下载失败", id)))
        }
    }
}
