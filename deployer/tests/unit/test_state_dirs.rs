//! State directory tests

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

use glidergun::filesys::file::File;
use glidergun::storage::state_dirs::{StateDirectoryManager, OUTPUTS_FILE, PARAMETERS_FILE};

fn manager(root: &Path) -> StateDirectoryManager {
    StateDirectoryManager::new(root.join("local"), root.join("host"))
}

fn set_modified(path: &Path, modified: SystemTime) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(modified).unwrap();
}

#[tokio::test]
async fn test_write_parameters_overwrites() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.resolve_local_state_dir("d1").await.unwrap();

    let first = HashMap::from([
        ("region".to_string(), "AU9".to_string()),
        ("size".to_string(), "large".to_string()),
    ]);
    manager.write_parameters(&dir, &first).await.unwrap();

    let second = HashMap::from([("region".to_string(), "NA9".to_string())]);
    manager.write_parameters(&dir, &second).await.unwrap();

    let written: HashMap<String, String> = dir.file(PARAMETERS_FILE).read_json().await.unwrap();
    assert_eq!(written, second);
}

#[tokio::test]
async fn test_write_parameters_creates_directory() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.local_root().subdir("d1");

    manager
        .write_parameters(&dir, &HashMap::from([("a".to_string(), "1".to_string())]))
        .await
        .unwrap();

    assert!(dir.file(PARAMETERS_FILE).exists().await);
}

#[tokio::test]
async fn test_read_outputs_absent_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.resolve_local_state_dir("d1").await.unwrap();

    let outputs = manager.read_outputs(&dir).await.unwrap();
    assert!(outputs.is_empty());
}

#[tokio::test]
async fn test_read_outputs() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.resolve_local_state_dir("d1").await.unwrap();

    dir.file(OUTPUTS_FILE)
        .write_string(r#"{"ips": {"value": ["10.0.0.1", "10.0.0.2"]}, "count": {"value": 2}}"#)
        .await
        .unwrap();

    let outputs = manager.read_outputs(&dir).await.unwrap();
    assert_eq!(outputs["count"]["value"], 2);
    assert_eq!(outputs["ips"]["value"][1], "10.0.0.2");
}

#[tokio::test]
async fn test_read_outputs_malformed_is_error() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.resolve_local_state_dir("d1").await.unwrap();

    dir.file(OUTPUTS_FILE).write_string("{not json").await.unwrap();

    assert!(manager.read_outputs(&dir).await.is_err());
}

#[tokio::test]
async fn test_read_logs_absent_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.resolve_local_state_dir("d1").await.unwrap();

    assert!(manager.read_logs(&dir).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_logs_ordered_by_modification() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());
    let dir = manager.resolve_local_state_dir("d1").await.unwrap();
    let logs = dir.subdir("logs");

    let base = SystemTime::now() - Duration::from_secs(3600);
    for (name, content, age) in [
        ("b-apply.log", "apply", 10),
        ("a-plan.log", "plan", 20),
        ("c-output.log", "output", 5),
    ] {
        let file = logs.file(name);
        file.write_string(content).await.unwrap();
        set_modified(file.path(), base + Duration::from_secs(60 - age));
    }
    File::new(logs.path().join("notes.txt")).write_string("ignored").await.unwrap();

    let records = manager.read_logs(&dir).await.unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.file.as_str()).collect();

    assert_eq!(names, vec!["a-plan.log", "b-apply.log", "c-output.log"]);
    assert_eq!(records[1].content, "apply");
}

#[tokio::test]
async fn test_resolve_rejects_escaping_ids() {
    let temp = tempfile::tempdir().unwrap();
    let manager = manager(temp.path());

    assert!(manager.resolve_local_state_dir("../d1").await.unwrap_err().is_validation());
    assert!(manager.resolve_host_state_dir("..").await.unwrap_err().is_validation());
    assert!(!temp.path().join("d1").exists());
}
