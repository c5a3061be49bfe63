//! JSONL file adapter for the interaction log port.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use genrelay_core::InteractionRecord;
use genrelay_core::ports::{InteractionLogError, InteractionLogPort};

/// Append-only JSONL interaction log.
///
/// One append-mode handle is opened at startup and every append goes through
/// the same lock, so concurrent records never interleave within a line.
#[derive(Debug)]
pub struct JsonlInteractionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlInteractionLog {
    /// Open `path` for appending, creating the parent directory and the file
    /// if they do not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, InteractionLogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        debug!(path = %path.display(), "Opened interaction log");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InteractionLogPort for JsonlInteractionLog {
    async fn append(&self, record: InteractionRecord) -> Result<(), InteractionLogError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(prompt: &str, response: &str) -> InteractionRecord {
        InteractionRecord::now(prompt.to_string(), response.to_string())
    }

    async fn read_records(path: &Path) -> Vec<InteractionRecord> {
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("log.jsonl");

        let log = JsonlInteractionLog::open(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(log.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = JsonlInteractionLog::open(&path).await.unwrap();

        log.append(record("first", "one")).await.unwrap();
        log.append(record("second", "two\nlines")).await.unwrap();

        let records = read_records(&path).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prompt, "first");
        assert_eq!(records[1].response, "two\nlines");
    }

    #[tokio::test]
    async fn test_reopen_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        JsonlInteractionLog::open(&path)
            .await
            .unwrap()
            .append(record("a", "1"))
            .await
            .unwrap();
        JsonlInteractionLog::open(&path)
            .await
            .unwrap()
            .append(record("b", "2"))
            .await
            .unwrap();

        let prompts: Vec<_> = read_records(&path)
            .await
            .into_iter()
            .map(|r| r.prompt)
            .collect();
        assert_eq!(prompts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = Arc::new(JsonlInteractionLog::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..32 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let response = "x".repeat(4096 + i);
                log.append(record(&format!("prompt-{i}"), &response))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = read_records(&path).await;
        assert_eq!(records.len(), 32);
        for record in records {
            let i: usize = record.prompt["prompt-".len()..].parse().unwrap();
            assert_eq!(record.response.len(), 4096 + i);
        }
    }

    #[tokio::test]
    async fn test_open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = JsonlInteractionLog::open(blocker.join("log.jsonl")).await;
        assert!(matches!(result, Err(InteractionLogError::Io(_))));
    }
}
