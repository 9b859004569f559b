//! Line-delimited JSON event source.
//!
//! One [`Event`] per line. Blank lines and `#` comments are skipped; lines
//! that fail to parse are logged and skipped. End of input is reported as
//! [`Event::Disconnected`].

use std::path::Path;

use anyhow::{Context, Result};
use foundry_sdk::event::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 1024;

/// Read events from `reader` on a spawned task.
pub fn spawn_reader<R>(reader: R) -> mpsc::Receiver<Event>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut line_no = 0usize;
        let reason = loop {
            line_no += 1;
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break "end of input".to_string(),
                Err(e) => break format!("read error: {e}"),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Event>(trimmed) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(line = line_no, error = %e, "Skipping malformed event"),
            }
        };
        let _ = tx.send(Event::Disconnected { reason }).await;
    });
    rx
}

/// Events from `path`, or stdin when `None`.
pub async fn open(path: Option<&Path>) -> Result<mpsc::Receiver<Event>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event file {}", path.display()))?;
            Ok(spawn_reader(BufReader::new(file)))
        }
        None => Ok(spawn_reader(BufReader::new(tokio::io::stdin()))),
    }
}
