// src/ui.rs

use crate::{constants, models::DownloadTask, symbols, utils};
use colored::*;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

pub fn print_header(title: &str) {
    println!("\n{}", "═".repeat(constants::UI_WIDTH));
    println!(" {}", title.cyan().bold());
    println!("{}", "═".repeat(constants::UI_WIDTH));
}

pub fn print_sub_header(title: &str) {
    println!("\n--- {} ---", title.bold());
}

pub fn plain(message: &str) {
    println!("{}", message);
}

pub fn info(message: &str) {
    println!("{} {}", *symbols::INFO, message);
}

pub fn warn(message: &str) {
    println!("{} {}", *symbols::WARN, message.yellow());
}

pub fn success(message: &str) {
    println!("{} {}", *symbols::OK, message.green());
}

pub fn error(message: &str) {
    eprintln!("{} {}", *symbols::ERROR, message.red());
}

/// 单个镜像的字节进度条。总大小未知时显示为旋转指示器。
pub fn new_bytes_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pbar = if total > 0 {
        let style = ProgressStyle::with_template(
            "{prefix:.bold.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({msg}) [ETA: {eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        ProgressBar::new(total).with_style(style)
    } else {
        let style = ProgressStyle::with_template("{prefix:.bold.cyan} {spinner} {bytes} ({msg})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        ProgressBar::new_spinner().with_style(style)
    };
    pbar.set_prefix(prefix.to_string());
    pbar
}

/// 任务列表中的一行: `[i] #3 已暂停 (可续传)  1.2 GiB / 3.0 GiB  名称`
pub fn print_task_line(task: &DownloadTask) {
    let (symbol, color, label) = task.status.get_display_info();
    let sizes = if task.total_bytes > 0 {
        format!("{} / {}", HumanBytes(task.downloaded_bytes), HumanBytes(task.total_bytes))
    } else {
        HumanBytes(task.downloaded_bytes).to_string()
    };
    println!(
        "{} #{:<3} {:<16} {:>22}  {}",
        *symbol,
        task.id,
        color(label.into()),
        sizes,
        utils::truncate_text(&task.display_name, constants::NAME_TRUNCATE_LENGTH)
    );
    if let Some(err) = &task.last_error {
        println!("       {}", err.red());
    }
}
