use folderplex::FolderReader;
use std::time::Duration;
use tempfile::tempdir;
use tokio::process::Command;
use tokio::time;

const TIMEOUT_5_SEC: Duration = Duration::from_millis(5000);

async fn next_line(reader: &mut FolderReader) -> String {
    loop {
        if let Some(chunk) = reader.next_chunk(b'\n').await.unwrap() {
            return String::from_utf8(chunk.into_inner().1).unwrap();
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
pub async fn test_live_discovery() {
    let logdir = tempdir().unwrap();
    let logdir_path = logdir.path();

    let mut reader = FolderReader::new(
        logdir_path,
        "step-",
        Vec::<String>::new(),
        Duration::from_millis(50),
    )
    .await
    .unwrap();
    assert!(reader.is_watching());

    let mut child = Command::new("tests/test-discovery.sh")
        .arg(logdir_path.to_str().unwrap())
        .spawn()
        .unwrap();

    let lines_fut = async {
        let mut lines = Vec::new();
        for _ in 0..4 {
            lines.push(next_line(&mut reader).await);
        }
        lines
    };

    let (lines, status) = tokio::join!(
        time::timeout(TIMEOUT_5_SEC, lines_fut),
        time::timeout(TIMEOUT_5_SEC, child.wait()),
    );

    assert!(status.unwrap().unwrap().success());
    let lines = lines.unwrap();

    // The input/output pair is discovered after main, so it is read after main
    // whatever its weight; main picks up again once it grows.
    assert_eq!(lines[0], "main 1\n");
    let mut late = vec![lines[1].as_str(), lines[2].as_str()];
    late.sort();
    assert_eq!(late, vec!["input 1\n", "output 1\n"]);
    assert_eq!(lines[3], "main 2\n");

    reader.close().await.unwrap();
}

#[tokio::test]
pub async fn test_notify_discovery() {
    let logdir = tempdir().unwrap();
    let logdir_path = logdir.path();

    let mut reader = FolderReader::builder(logdir_path)
        .prefix("step-")
        .notify(true)
        .build()
        .await
        .unwrap();

    std::fs::write(logdir_path.join("step-main"), "hello\n").unwrap();

    let line = time::timeout(TIMEOUT_5_SEC, next_line(&mut reader))
        .await
        .unwrap();
    assert_eq!(line, "hello\n");

    reader.close().await.unwrap();
}

#[tokio::test]
pub async fn test_no_discovery_without_interval() {
    let logdir = tempdir().unwrap();
    let logdir_path = logdir.path();
    std::fs::write(logdir_path.join("step-main"), "present\n").unwrap();

    let mut reader = FolderReader::new(logdir_path, "step-", Vec::<String>::new(), Duration::ZERO)
        .await
        .unwrap();
    assert!(!reader.is_watching());

    std::fs::write(logdir_path.join("step-i1"), "late\n").unwrap();
    time::sleep(Duration::from_millis(100)).await;

    let chunk = reader.next_chunk(b'\n').await.unwrap().unwrap();
    assert_eq!(chunk.bytes(), b"present\n");
    assert!(reader.next_chunk(b'\n').await.unwrap().is_none());
}
