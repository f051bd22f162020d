// src/main.rs

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use hackintoshify_dl::{cli::Cli, error::AppError, run_from_cli};
use std::{
    env,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }

    // 第一次 Ctrl+C 暂停当前任务 (状态会被保存)，第二次直接退出
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if flag.swap(true, Ordering::Relaxed) {
                println!("\n{} 用户强制中断程序。", "[!]".yellow());
                std::process::exit(130);
            }
            println!("\n{} 正在暂停，再次按下 Ctrl+C 强制退出...", "[!]".yellow());
        }
    });

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "hackintoshify-dl".to_string());
    let after_help = format!(
        "示例:\n  # 扫描可下载的恢复镜像\n  {bin} --scan\n\n  # 按产品 ID 下载到指定目录\n  {bin} --download 093-22004 -o ~/Downloads\n\n  # 查看任务并续传\n  {bin} --list\n  {bin} --resume 3",
        bin = bin_name
    );
    let cmd = Cli::command().after_help(after_help);
    let args = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(args) => Arc::new(args),
        Err(e) => e.exit(),
    };

    match run_from_cli(args, interrupt).await {
        Ok(()) => {}
        Err(AppError::UserInterrupt) => std::process::exit(130),
        Err(e) => {
            eprintln!("\n{} {}", "[X]".red(), format!("程序执行出错: {}", e).red());
            std::process::exit(1);
        }
    }
}
