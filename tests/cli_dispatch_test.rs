// tests/cli_dispatch_test.rs

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

// 辅助函数，避免重复
fn main_command() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

// --- 测试基本 CLI 行为 ---

#[test]
fn test_help_flag() {
    let mut cmd = main_command();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("显示此帮助信息并退出"))
        .stdout(predicate::str::contains("--download"));
}

#[test]
fn test_missing_mode_shows_help() {
    let mut cmd = main_command();
    cmd.assert().failure().stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_conflicting_modes_are_rejected() {
    let mut cmd = main_command();
    cmd.arg("--scan").arg("--list");
    cmd.assert().failure().stderr(predicate::str::contains("cannot be used with"));
}

// --- 测试核心分发逻辑 ---

#[test]
fn test_list_mode_with_fresh_config_dir() {
    let dir = tempdir().unwrap();
    let mut cmd = main_command();
    cmd.arg("--list").arg("--config-dir").arg(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("当前没有任何任务"));
    // 首次运行会生成默认配置
    assert!(dir.path().join("config.json").is_file());
}

#[test]
fn test_resume_unknown_task_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = main_command();
    cmd.arg("--resume").arg("42").arg("--config-dir").arg(dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("未找到任务 42"));
}

#[test]
fn test_failed_url_download_is_listed_as_retryable() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");

    let mut cmd = main_command();
    cmd.arg("--url")
        .arg("http://127.0.0.1:9/BaseSystem.dmg")
        .arg("--config-dir")
        .arg(dir.path())
        .arg("-o")
        .arg(&out);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("下载失败"));

    let mut list = main_command();
    list.arg("--list").arg("--config-dir").arg(dir.path());
    list.assert()
        .success()
        .stdout(predicate::str::contains("BaseSystem.dmg"))
        .stdout(predicate::str::contains("已暂停 (可续传)"));
}
