//! Per-job append-only log files.

use std::path::{Path, PathBuf};

use chrono::Utc;
use netsweep_protocols::mask::mask_text;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Writes and serves one log file per job.
///
/// Every line is masked on the way in and again on the way out, since
/// modules append to the same file directly.
#[derive(Debug, Clone)]
pub struct LogSink {
    dir: PathBuf,
}

impl LogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file of a job.
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.log", job_id))
    }

    /// Append one timestamped line.
    pub async fn append(&self, job_id: &str, message: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(job_id))
            .await?;

        let mut text = String::new();
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        for line in mask_text(message).lines() {
            text.push_str(&format!("[{}] {}\n", stamp, line));
        }
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }

    /// Last `lines` lines of a job's log, or `None` if there is no log.
    pub async fn tail(&self, job_id: &str, lines: usize) -> std::io::Result<Option<String>> {
        let content = match fs::read(self.path_for(job_id)).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        let tail: Vec<String> = all[start..].iter().map(|l| mask_text(l)).collect();
        Ok(Some(tail.join("\n")))
    }

    /// Delete a job's log. Returns whether a file was removed.
    pub async fn delete(&self, job_id: &str) -> std::io::Result<bool> {
        match fs::remove_file(self.path_for(job_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_tail() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path().join("jobs"));

        for i in 0..5 {
            sink.append("job-1", &format!("line {}", i)).await.unwrap();
        }

        let tail = sink.tail("job-1", 2).await.unwrap().unwrap();
        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("line 3"));
        assert!(lines[1].ends_with("line 4"));
    }

    #[tokio::test]
    async fn test_tail_more_than_available() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());
        sink.append("job-1", "only line").await.unwrap();

        let tail = sink.tail("job-1", 200).await.unwrap().unwrap();
        assert_eq!(tail.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_tail_missing_log() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());
        assert!(sink.tail("nope", 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_masks_secrets() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());
        sink.append("job-1", r#"config {"password": "hunter2"}"#).await.unwrap();

        let raw = std::fs::read_to_string(sink.path_for("job-1")).unwrap();
        assert!(!raw.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_tail_masks_lines_written_by_modules() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());
        std::fs::write(sink.path_for("job-1"), "connecting with password=hunter2\n").unwrap();

        let tail = sink.tail("job-1", 10).await.unwrap().unwrap();
        assert!(!tail.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_multiline_message_stamps_each_line() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());
        sink.append("job-1", "stderr:\nTraceback\n  boom").await.unwrap();

        let tail = sink.tail("job-1", 10).await.unwrap().unwrap();
        assert_eq!(tail.lines().count(), 3);
        assert!(tail.lines().all(|l| l.starts_with('[')));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path());
        sink.append("job-1", "hello").await.unwrap();

        assert!(sink.delete("job-1").await.unwrap());
        assert!(!sink.delete("job-1").await.unwrap());
        assert!(sink.tail("job-1", 10).await.unwrap().is_none());
    }
}
