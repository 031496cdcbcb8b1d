// ABOUTME: Append-only per-chat plain-text transcript of user messages.
// ABOUTME: One file per chat under the transcript dir; failures are logged, never propagated.

use crate::chat::ChatId;
use crate::traits::IncomingMessage;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct TranscriptLog {
    dir: PathBuf,
}

/// Lines to record for a message: its non-blank lines, prefixed with the
/// sender's name in group chats.
pub fn transcript_lines(msg: &IncomingMessage) -> Vec<String> {
    let prefix = if msg.chat_id.is_group() {
        format!("{}: ", msg.sender.display_name())
    } else {
        String::new()
    };
    msg.text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("{}{}", prefix, line))
        .collect()
}

impl TranscriptLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, chat_id: ChatId) -> PathBuf {
        self.dir.join(format!("{}.log", chat_id))
    }

    /// Append a message's lines to its chat transcript
    pub async fn append(&self, msg: &IncomingMessage) -> Result<()> {
        let lines = transcript_lines(msg);
        if lines.is_empty() {
            return Ok(());
        }

        create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(msg.chat_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut buf = lines.join("\n");
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Append, logging instead of failing
    pub async fn record(&self, msg: &IncomingMessage) {
        if let Err(e) = self.append(msg).await {
            tracing::warn!(chat_id = %msg.chat_id, error = %e, "Failed to write transcript");
        }
    }

    /// Last `max_lines` lines of a chat's transcript; empty if none recorded yet
    pub async fn tail(&self, chat_id: ChatId, max_lines: usize) -> Result<Vec<String>> {
        let path = self.path_for(chat_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }
}
