// src/lib.rs

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod models;
pub mod symbols;
pub mod ui;
pub mod utils;
mod workflows;

pub use backend::Backend;

use crate::{cli::Cli, config::AppConfig, error::AppResult};
use log::{debug, info};
use std::sync::{Arc, atomic::AtomicBool};

/// 库的公共入口点，由 `main.rs` 调用
pub async fn run_from_cli(args: Arc<Cli>, interrupt: Arc<AtomicBool>) -> AppResult<()> {
    let config = Arc::new(AppConfig::new(&args)?);
    logging::init_logger(args.log_level, &config.log_file());
    info!("{} v{} 启动", clap::crate_name!(), clap::crate_version!());
    debug!("CLI 参数: {:?}", args);
    debug!("加载的应用配置: {:?}", config);

    let (backend, events) = Backend::new(config).await?;

    if args.scan {
        workflows::run_scan(&backend, args.refresh).await
    } else if args.list {
        workflows::run_list(&backend)
    } else if let Some(product_id) = &args.download {
        workflows::run_download(&backend, events, &args, product_id, interrupt).await
    } else if let Some(url) = &args.url {
        workflows::run_url(&backend, events, &args, url, interrupt).await
    } else if let Some(id) = args.resume {
        workflows::run_resume(&backend, events, id, interrupt).await
    } else if let Some(id) = args.cancel {
        workflows::run_cancel(&backend, id).await
    } else {
        Ok(())
    }
}
