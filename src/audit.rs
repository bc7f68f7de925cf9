//! Dispatch audit log with rotation
//!
//! Every finished dispatch record is appended as one JSON line. The active
//! file rotates to `dispatch.1.jsonl`, `dispatch.2.jsonl`, ... once it grows
//! past the configured size. Write failures are reported through `tracing`
//! and never fail the dispatch that produced the record.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::AuditConfig;
use crate::core::DispatchRecord;

const LOG_STEM: &str = "dispatch";

/// One line of the audit log
#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: String,
    run_id: &'a str,
    record: &'a DispatchRecord,
}

pub struct AuditLog {
    dir: PathBuf,
    max_file_size: u64,
    max_rotated_files: usize,
    run_id: String,
    file: Mutex<File>,
    current_size: AtomicU64,
}

impl AuditLog {
    /// Open (or create) the audit log in `config.dir`
    pub fn new(config: &AuditConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir).with_context(|| {
            format!("Failed to create audit directory {}", config.dir.display())
        })?;

        let path = log_path(&config.dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        let run_id = uuid::Uuid::new_v4().simple().to_string();

        Ok(Self {
            dir: config.dir.clone(),
            max_file_size: config.max_file_size,
            max_rotated_files: config.max_rotated_files,
            run_id: run_id[..8].to_string(),
            file: Mutex::new(file),
            current_size: AtomicU64::new(current_size),
        })
    }

    /// Identifier shared by every entry this process writes
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path of the active log file
    pub fn path(&self) -> PathBuf {
        log_path(&self.dir)
    }

    /// Append a finished record
    pub fn append(&self, record: &DispatchRecord) {
        let entry = AuditEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            run_id: &self.run_id,
            record,
        };
        let json = match serde_json::to_string(&entry) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize dispatch record {}: {}", record.task_id, e);
                return;
            }
        };

        let Ok(mut file) = self.file.lock() else {
            tracing::warn!("Audit log lock poisoned, dropping record {}", record.task_id);
            return;
        };
        if let Err(e) = writeln!(file, "{}", json) {
            tracing::warn!("Failed to write audit log: {}", e);
            return;
        }

        let written = json.len() as u64 + 1;
        let new_size = self.current_size.fetch_add(written, Ordering::Relaxed) + written;
        if new_size >= self.max_file_size {
            self.rotate(&mut file);
        }
    }

    /// Shift rotated files up by one and start a fresh active file
    fn rotate(&self, file: &mut File) {
        if self.max_rotated_files == 0 {
            let _ = file.set_len(0);
            self.current_size.store(0, Ordering::Relaxed);
            return;
        }

        let oldest = rotated_path(&self.dir, self.max_rotated_files);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..self.max_rotated_files).rev() {
            let from = rotated_path(&self.dir, i);
            if from.exists() {
                let _ = std::fs::rename(&from, rotated_path(&self.dir, i + 1));
            }
        }

        let active = log_path(&self.dir);
        if let Err(e) = std::fs::rename(&active, rotated_path(&self.dir, 1)) {
            tracing::warn!("Failed to rotate audit log: {}", e);
            return;
        }

        match OpenOptions::new().create(true).append(true).open(&active) {
            Ok(new_file) => {
                *file = new_file;
                self.current_size.store(0, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!("Failed to reopen audit log: {}", e),
        }
    }
}

fn log_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.jsonl", LOG_STEM))
}

fn rotated_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}.{}.jsonl", LOG_STEM, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Domain, ExhaustionReason, Task};
    use tempfile::TempDir;

    fn config(dir: &Path, max_file_size: u64) -> AuditConfig {
        AuditConfig {
            enabled: true,
            dir: dir.to_path_buf(),
            max_file_size,
            max_rotated_files: 2,
        }
    }

    fn record(id: &str) -> DispatchRecord {
        let mut record = DispatchRecord::open(&Task::new("x", Domain::Game).with_id(id));
        record.exhaust(ExhaustionReason::CandidatesExhausted);
        record
    }

    #[test]
    fn test_append_writes_json_lines() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(&config(tmp.path(), 1024 * 1024)).unwrap();
        log.append(&record("t1"));
        log.append(&record("t2"));

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record"]["task_id"], "t1");
        assert_eq!(lines[1]["run_id"], log.run_id());
    }

    #[test]
    fn test_rotation_keeps_bounded_history() {
        let tmp = TempDir::new().unwrap();
        // Every record exceeds the limit, so each append rotates
        let log = AuditLog::new(&config(tmp.path(), 16)).unwrap();
        for id in ["a", "b", "c", "d"] {
            log.append(&record(id));
        }

        assert!(rotated_path(tmp.path(), 1).exists());
        assert!(rotated_path(tmp.path(), 2).exists());
        assert!(!rotated_path(tmp.path(), 3).exists());

        let newest = std::fs::read_to_string(rotated_path(tmp.path(), 1)).unwrap();
        assert!(newest.contains("\"task_id\":\"d\""));
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
    }
}
