// src/cli.rs

use crate::models::TaskId;
use clap::{Parser, ValueEnum, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    about,
    long_about = None,
    arg_required_else_help = true,
    disable_help_flag = true,
    disable_version_flag = true,
)]
#[command(group(
    clap::ArgGroup::new("mode")
        .required(true)
        .args(&["scan", "list", "download", "url", "resume", "cancel"]),
))]
pub struct Cli {
    // --- 运行模式 (Mode) ---
    /// 扫描软件更新目录，列出可下载的恢复镜像
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Mode")]
    pub scan: bool,
    /// 列出已记录的下载任务
    #[arg(short, long, action = clap::ArgAction::SetTrue, help_heading = "Mode")]
    pub list: bool,
    /// 按产品 ID 下载镜像 (例如 093-22004)
    #[arg(short, long, value_name = "PRODUCT_ID", help_heading = "Mode")]
    pub download: Option<String>,
    /// 直接下载指定链接
    #[arg(long, help_heading = "Mode")]
    pub url: Option<String>,
    /// 续传或重试指定任务
    #[arg(long, value_name = "TASK_ID", help_heading = "Mode")]
    pub resume: Option<TaskId>,
    /// 取消任务并删除其文件
    #[arg(long, value_name = "TASK_ID", help_heading = "Mode")]
    pub cancel: Option<TaskId>,

    // --- 下载选项 (Options) ---
    /// 设置文件保存目录 (默认取配置文件中的 download_dir)
    #[arg(short, long, value_name = "DIR", help_heading = "Options")]
    pub output: Option<PathBuf>,
    /// [链接模式] 指定保存的文件名
    #[arg(short, long, help_heading = "Options", requires = "url")]
    pub name: Option<String>,
    /// 忽略本地缓存，重新扫描目录
    #[arg(short, long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub refresh: bool,
    /// 指定配置目录 (也可通过环境变量 HACKINTOSHIFY_CONFIG_DIR 设置)
    #[arg(long, value_name = "DIR", help_heading = "Options")]
    pub config_dir: Option<PathBuf>,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// (隐藏参数) 设置日志文件的输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Off, global = true, hide = true)]
    pub log_level: LogLevel,
}
