// src/logging/runtime_logger.rs

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task;
use tokio::time::{self, Duration};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::MakeWriter;

const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
const RETENTION_HOURS: u64 = 72;

struct LogEntry {
    level: String,
    content: String,
}

/// Buffered runtime logger that splits entries by level into hourly rolling
/// JSON files. Entries travel over an mpsc channel to a background writer
/// that flushes per-level batches on size or on a timer; a second background
/// task removes files older than the retention window.
pub struct RuntimeLogger {
    sender: Sender<LogEntry>,
}

impl RuntimeLogger {
    /// `file_prefix` names the per-level files, e.g. `runtime_info.json`.
    pub fn new(
        log_dir: &str,
        file_prefix: &str,
        buffer_size: usize,
        batch_size: usize,
        flush_interval_ms: u64,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(buffer_size);

        let mut files = HashMap::new();
        for level in LEVELS {
            let file_name = format!("{}_{}.json", file_prefix, level.to_lowercase());
            files.insert(level.to_string(), Arc::new(rolling::hourly(log_dir, &file_name)));
        }
        tokio::spawn(Self::background_writer(
            files,
            receiver,
            batch_size,
            flush_interval_ms,
        ));

        let log_dir = log_dir.to_string();
        tokio::spawn(async move {
            loop {
                Self::cleanup_old_logs(&log_dir, RETENTION_HOURS).await;
                time::sleep(Duration::from_secs(3600)).await;
            }
        });

        Arc::new(Self { sender })
    }

    pub async fn log(&self, level: &str, message: &str) {
        let entry = LogEntry {
            level: level.to_string(),
            content: json!({
                "timestamp": Utc::now().to_rfc3339(),
                "level": level,
                "message": message,
            })
            .to_string(),
        };
        if let Err(err) = self.sender.send(entry).await {
            eprintln!("Failed to enqueue runtime log message: {}", err);
        }
    }

    async fn background_writer(
        files: HashMap<String, Arc<RollingFileAppender>>,
        mut receiver: Receiver<LogEntry>,
        batch_size: usize,
        flush_interval_ms: u64,
    ) {
        let mut buffers: HashMap<String, Vec<String>> =
            files.keys().map(|level| (level.clone(), Vec::new())).collect();
        let mut interval = time::interval(Duration::from_millis(flush_interval_ms));

        loop {
            tokio::select! {
                Some(entry) = receiver.recv() => {
                    let buffer = buffers.entry(entry.level.clone()).or_default();
                    buffer.push(entry.content);
                    if buffer.len() >= batch_size {
                        if let Some(appender) = files.get(&entry.level) {
                            Self::flush(appender.clone(), buffer).await;
                        }
                    }
                }
                _ = interval.tick() => {
                    for (level, buffer) in buffers.iter_mut() {
                        if !buffer.is_empty() {
                            if let Some(appender) = files.get(level) {
                                Self::flush(appender.clone(), buffer).await;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn flush(appender: Arc<RollingFileAppender>, buffer: &mut Vec<String>) {
        let content = buffer.join("\n") + "\n";
        buffer.clear();

        let result = task::spawn_blocking(move || {
            let mut writer = appender.make_writer();
            if let Err(err) = writer.write_all(content.as_bytes()) {
                eprintln!("Failed to write runtime logs: {}", err);
            }
        })
        .await;
        if let Err(err) = result {
            eprintln!("Runtime log flush task failed: {}", err);
        }
    }

    async fn cleanup_old_logs(log_dir: &str, retention_hours: u64) {
        let retention = std::time::Duration::from_secs(retention_hours * 3600);
        let now = SystemTime::now();
        let mut dir = match tokio::fs::read_dir(log_dir).await {
            Ok(dir) => dir,
            Err(err) => {
                eprintln!("Failed to read log directory {}: {}", log_dir, err);
                return;
            }
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            if now.duration_since(modified).unwrap_or_default() > retention {
                if let Err(err) = tokio::fs::remove_file(entry.path()).await {
                    eprintln!("Failed to delete old log file {:?}: {}", entry.path(), err);
                }
            }
        }
    }

    /// Gives the background writer a moment to drain before process exit.
    pub async fn shutdown(&self) {
        time::sleep(Duration::from_secs(1)).await;
    }
}
