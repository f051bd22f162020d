// tests/transfer_engine_test.rs

use hackintoshify_dl::client::RobustClient;
use hackintoshify_dl::config::AppConfig;
use hackintoshify_dl::downloader::{EventReceiver, TaskStore, TransferEngine};
use hackintoshify_dl::models::{ProgressSnapshot, TaskEventKind, TaskId, TaskStatus};
use hackintoshify_dl::utils::part_path_for;
use mockito::Matcher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

async fn start_engine(dir: &Path) -> (TransferEngine, EventReceiver) {
    let config = Arc::new(AppConfig::for_dir(dir));
    let client = Arc::new(RobustClient::new(config.clone()).unwrap());
    TransferEngine::start(config, client).await.unwrap()
}

/// 收集某个任务的事件，直到它停止 (非 Downloading/Pending 状态)
async fn wait_until_stopped(
    rx: &mut EventReceiver,
    id: TaskId,
) -> (TaskStatus, Vec<ProgressSnapshot>, Option<String>) {
    let mut progress = Vec::new();
    let mut error = None;
    let collect = async {
        while let Some(event) = rx.recv().await {
            if event.id != id {
                continue;
            }
            match event.kind {
                TaskEventKind::Progress(p) => progress.push(p),
                TaskEventKind::Error(message) => error = Some(message),
                TaskEventKind::StatusChanged(TaskStatus::Downloading | TaskStatus::Pending) => {}
                TaskEventKind::StatusChanged(status) => return status,
            }
        }
        panic!("事件通道意外关闭");
    };
    let status = tokio::time::timeout(Duration::from_secs(30), collect)
        .await
        .expect("任务未在限定时间内停止");
    (status, progress, error)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fresh_download_reports_bounded_monotonic_progress() {
    // --- Arrange ---
    let mut server = mockito::Server::new_async().await;
    let data = payload(100_000);
    server.mock("HEAD", "/image.dmg").with_status(404).create_async().await;
    let get = server
        .mock("GET", "/image.dmg")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body(&data)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out").join("image.dmg");
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act ---
    let id = engine
        .start_or_resume_download(&format!("{}/image.dmg", server.url()), &dest, "image")
        .await
        .unwrap();
    let (status, progress, _) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
    assert!(!part_path_for(&dest).exists());
    get.assert_async().await;

    assert!(!progress.is_empty());
    assert!(progress.iter().all(|p| p.percent <= 100));
    assert!(progress.windows(2).all(|w| w[0].downloaded_bytes <= w[1].downloaded_bytes));
    assert_eq!(progress.last().unwrap().downloaded_bytes, data.len() as u64);

    let task = engine.task(id).unwrap();
    assert_eq!(task.downloaded_bytes, data.len() as u64);
    assert_eq!(task.total_bytes, data.len() as u64);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resume_sends_range_and_skips_existing_bytes() {
    // --- Arrange ---
    let mut server = mockito::Server::new_async().await;
    let data = payload(50_000);
    let offset = 12_288;
    server.mock("HEAD", "/image.dmg").with_status(404).create_async().await;
    let full = server
        .mock("GET", "/image.dmg")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body(&data)
        .expect(0)
        .create_async()
        .await;
    let ranged = server
        .mock("GET", "/image.dmg")
        .match_header("range", format!("bytes={}-", offset).as_str())
        .with_status(206)
        .with_body(&data[offset..])
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("image.dmg");
    std::fs::write(part_path_for(&dest), &data[..offset]).unwrap();
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act ---
    let id = engine
        .start_or_resume_download(&format!("{}/image.dmg", server.url()), &dest, "image")
        .await
        .unwrap();
    let (status, progress, _) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
    ranged.assert_async().await;
    full.assert_async().await;
    // 总大小 = 已有字节 + 响应长度
    assert!(progress.iter().all(|p| p.downloaded_bytes > offset as u64));
    assert_eq!(engine.task(id).unwrap().total_bytes, data.len() as u64);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ignored_range_restarts_from_zero() {
    // --- Arrange ---
    let mut server = mockito::Server::new_async().await;
    let data = payload(40_000);
    server.mock("HEAD", "/image.dmg").with_status(404).create_async().await;
    // 服务器忽略 Range，返回完整内容
    let ranged = server
        .mock("GET", "/image.dmg")
        .match_header("range", "bytes=5000-")
        .with_status(200)
        .with_body(&data)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("image.dmg");
    std::fs::write(part_path_for(&dest), vec![0xFFu8; 5000]).unwrap();
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act ---
    let id = engine
        .start_or_resume_download(&format!("{}/image.dmg", server.url()), &dest, "image")
        .await
        .unwrap();
    let (status, _, _) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
    ranged.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_task_is_resumable_then_cancel_removes_everything() {
    // --- Arrange ---
    let mut server = mockito::Server::new_async().await;
    server.mock("HEAD", "/broken.dmg").with_status(404).create_async().await;
    server
        .mock("GET", "/broken.dmg")
        .with_status(500)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("broken.dmg");
    let part = part_path_for(&dest);
    std::fs::write(&part, b"partial bytes").unwrap();
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act 1: 下载失败 ---
    let id = engine
        .start_or_resume_download(&format!("{}/broken.dmg", server.url()), &dest, "broken")
        .await
        .unwrap();
    let (status, _, error) = wait_until_stopped(&mut rx, id).await;

    // --- Assert 1: 进入 Error 状态，part 文件保留 ---
    assert_eq!(status, TaskStatus::Error);
    assert!(error.unwrap().contains("500"));
    assert!(part.exists());
    let task = engine.task(id).unwrap();
    assert!(task.status.can_start());
    assert!(task.last_error.is_some());

    // --- Act 2: 取消 ---
    engine.cancel(id).await.unwrap();

    // --- Assert 2: 文件和持久化记录都被删除 ---
    assert!(!part.exists());
    assert!(!dest.exists());
    assert!(engine.task(id).is_none());
    let saved = TaskStore::new(dir.path().join("tasks.json")).load().unwrap();
    assert!(saved.iter().all(|r| r.id != id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restart_rehydrates_from_disk_and_resumes_byte_identical() {
    // --- Arrange: 第一个进程中，一个任务完成，另一个失败并留下 part 文件 ---
    let mut server = mockito::Server::new_async().await;
    let done_data = payload(20_000);
    let big = payload(64 * 1024);
    let offset = 24 * 1024;
    server.mock("HEAD", Matcher::Any).with_status(404).create_async().await;
    server
        .mock("GET", "/done.dmg")
        .with_status(200)
        .with_body(&done_data)
        .create_async()
        .await;
    let failing = server
        .mock("GET", "/big.dmg")
        .with_status(503)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let done_dest = dir.path().join("done.dmg");
    let big_dest = dir.path().join("big.dmg");
    std::fs::write(part_path_for(&big_dest), &big[..offset]).unwrap();

    let (done_id, big_id) = {
        let (engine, mut rx) = start_engine(dir.path()).await;
        let done_id = engine
            .start_or_resume_download(&format!("{}/done.dmg", server.url()), &done_dest, "done")
            .await
            .unwrap();
        assert_eq!(wait_until_stopped(&mut rx, done_id).await.0, TaskStatus::Finished);
        let big_id = engine
            .start_or_resume_download(&format!("{}/big.dmg", server.url()), &big_dest, "big")
            .await
            .unwrap();
        assert_eq!(wait_until_stopped(&mut rx, big_id).await.0, TaskStatus::Error);
        (done_id, big_id)
    };
    failing.remove_async().await;
    server
        .mock("GET", "/big.dmg")
        .match_header("range", format!("bytes={}-", offset).as_str())
        .with_status(206)
        .with_body(&big[offset..])
        .create_async()
        .await;

    // --- Act: 重新启动引擎 ---
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Assert: 以磁盘内容为准恢复状态 ---
    let done = engine.task(done_id).unwrap();
    assert_eq!(done.status, TaskStatus::Finished);
    let paused = engine.task(big_id).unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert_eq!(paused.downloaded_bytes, offset as u64);

    // 新任务的 ID 不会与恢复的任务冲突
    let next = engine
        .start_or_resume_download(&format!("{}/done.dmg", server.url()), &done_dest, "done")
        .await
        .unwrap();
    assert_eq!(next, done_id);

    engine.resume(big_id).await.unwrap();
    let (status, _, _) = wait_until_stopped(&mut rx, big_id).await;
    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(std::fs::read(&big_dest).unwrap(), big);
}

/// 每 100ms 写出一个 8 KiB 块的慢速响应，总长度未知
async fn slow_image_server() -> (mockito::ServerGuard, String) {
    let mut server = mockito::Server::new_async().await;
    server.mock("HEAD", "/slow.dmg").with_status(404).create_async().await;
    server
        .mock("GET", "/slow.dmg")
        .with_status(200)
        .with_chunked_body(|w| {
            let block = payload(8 * 1024);
            for _ in 0..100 {
                w.write_all(&block)?;
                w.flush()?;
                std::thread::sleep(Duration::from_millis(100));
            }
            Ok(())
        })
        .create_async()
        .await;
    let url = format!("{}/slow.dmg", server.url());
    (server, url)
}

async fn wait_first_progress(rx: &mut EventReceiver, id: TaskId) -> ProgressSnapshot {
    let wait = async {
        loop {
            let event = rx.recv().await.expect("事件通道意外关闭");
            if let (true, TaskEventKind::Progress(p)) = (event.id == id, event.kind) {
                return p;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("未收到进度事件")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pause_during_transfer_keeps_part_file() {
    // --- Arrange ---
    let (_server, url) = slow_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.dmg");
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act: 收到第一个进度事件后请求暂停 ---
    let id = engine.start_or_resume_download(&url, &dest, "slow").await.unwrap();
    let first = wait_first_progress(&mut rx, id).await;
    engine.pause(id).await.unwrap();
    let (status, _, _) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Paused);
    assert!(!dest.exists());
    let task = engine.task(id).unwrap();
    let on_disk = std::fs::metadata(part_path_for(&dest)).unwrap().len();
    assert_eq!(task.downloaded_bytes, on_disk);
    assert!(on_disk >= first.downloaded_bytes);
    assert!(on_disk < 100 * 8 * 1024);
    assert!(!engine.is_active(id));

    let saved = TaskStore::new(dir.path().join("tasks.json")).load().unwrap();
    assert_eq!(saved.iter().find(|r| r.id == id).unwrap().status, TaskStatus::Paused);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_during_transfer_removes_files_and_record() {
    // --- Arrange ---
    let (_server, url) = slow_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.dmg");
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act ---
    let id = engine.start_or_resume_download(&url, &dest, "slow").await.unwrap();
    wait_first_progress(&mut rx, id).await;
    engine.cancel(id).await.unwrap();
    let (status, _, _) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Cancelled);
    assert!(!part_path_for(&dest).exists());
    assert!(!dest.exists());
    assert!(engine.task(id).is_none());
    let saved = TaskStore::new(dir.path().join("tasks.json")).load().unwrap();
    assert!(saved.iter().all(|r| r.id != id));
}

/// HEAD 返回 404；GET 在延迟之后返回 500
async fn spawn_slow_failing_server(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let status = if request.starts_with(b"HEAD") {
                    "404 Not Found"
                } else {
                    tokio::time::sleep(delay).await;
                    "500 Internal Server Error"
                };
                let response =
                    format!("HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}/stalled.dmg", addr)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_wins_when_transfer_then_fails() {
    // --- Arrange ---
    let url = spawn_slow_failing_server(Duration::from_millis(800)).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("stalled.dmg");
    std::fs::write(part_path_for(&dest), b"partial bytes").unwrap();
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act: 在响应到达之前取消 ---
    let id = engine.start_or_resume_download(&url, &dest, "stalled").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.cancel(id).await.unwrap();
    let (status, _, error) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Cancelled);
    assert!(error.is_none());
    assert!(!part_path_for(&dest).exists());
    assert!(!dest.exists());
    assert!(engine.task(id).is_none());
    let saved = TaskStore::new(dir.path().join("tasks.json")).load().unwrap();
    assert!(saved.iter().all(|r| r.id != id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsatisfiable_range_restarts_from_zero() {
    // --- Arrange: part 文件比实际文件还大 ---
    let mut server = mockito::Server::new_async().await;
    let data = payload(3000);
    server.mock("HEAD", "/image.dmg").with_status(404).create_async().await;
    let unsatisfiable = server
        .mock("GET", "/image.dmg")
        .match_header("range", "bytes=5000-")
        .with_status(416)
        .expect(1)
        .create_async()
        .await;
    let full = server
        .mock("GET", "/image.dmg")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body(&data)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("image.dmg");
    std::fs::write(part_path_for(&dest), vec![0xAAu8; 5000]).unwrap();
    let (engine, mut rx) = start_engine(dir.path()).await;

    // --- Act ---
    let id = engine
        .start_or_resume_download(&format!("{}/image.dmg", server.url()), &dest, "image")
        .await
        .unwrap();
    let (status, _, _) = wait_until_stopped(&mut rx, id).await;

    // --- Assert ---
    assert_eq!(status, TaskStatus::Finished);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
    unsatisfiable.assert_async().await;
    full.assert_async().await;
}
