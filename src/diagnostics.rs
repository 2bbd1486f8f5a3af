//! Append-only log of raw model output.
//!
//! One line per inference: RFC 3339 timestamp, purpose label, and the Rust
//! debug representation of the raw text so embedded newlines stay on one line.

use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
}

impl DiagnosticLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Failures are logged and swallowed.
    pub async fn record(&self, purpose: &str, raw_output: &str) {
        let line = format_entry(purpose, raw_output);
        if let Err(e) = self.append(&line).await {
            tracing::warn!(
                "Failed to write model output to {}: {}",
                self.path.display(),
                e
            );
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

fn format_entry(purpose: &str, raw_output: &str) -> String {
    format!(
        "{} [{}] {:?}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        purpose,
        raw_output
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_single_line() {
        let entry = format_entry("insight", "```json\n{\"a\": 1}\n```");
        assert_eq!(entry.matches('\n').count(), 1);
        assert!(entry.contains("[insight] \"```json\\n{\\\"a\\\": 1}\\n```\""));
    }

    #[tokio::test]
    async fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiagnosticLog::new(dir.path().join("logs/raw.log"));
        log.record("insight", "first").await;
        log.record("normalize", "second").await;

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[insight] \"first\""));
        assert!(lines[1].ends_with("[normalize] \"second\""));
    }
}
