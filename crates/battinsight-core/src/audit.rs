use crate::errors::AuditError;
use crate::model::{AuditRecord, ClientInfo};
use crate::prescreen;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Durable destination for audit records. Implementations write each record
/// as one unit; partial records must never be observable.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Line-delimited JSON file, opened in append mode per record.
pub struct JsonlAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Single write of the full line: O_APPEND keeps it contiguous.
        f.write_all(&line)?;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Records one query attempt. Never fails: sink errors are logged and
    /// dropped so the query path does not depend on audit durability.
    pub fn record(
        &self,
        query: &str,
        sql: &str,
        client: &ClientInfo,
        request_id: &str,
        is_valid: bool,
    ) {
        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_ip: client.ip.clone(),
            query_text: query.to_string(),
            sql_query: sql.to_string(),
            user_agent: client.user_agent.clone(),
            request_id: request_id.to_string(),
            is_valid,
        };

        match self.sink.append(&record) {
            Ok(()) => {
                let preview: String = query.chars().take(50).collect();
                tracing::info!(
                    event = "ai_query_audited",
                    rid = %request_id,
                    user_ip = %client.ip,
                    query = %preview,
                    is_valid = is_valid
                );
            }
            Err(e) => {
                tracing::error!(
                    event = "audit_write_failed",
                    rid = %request_id,
                    error = %e
                );
            }
        }

        if !is_valid || prescreen::contains_disallowed_intent(query) {
            tracing::warn!(
                event = "suspicious_ai_query",
                rid = %request_id,
                user_ip = %client.ip,
                query = %query,
                is_valid = is_valid
            );
        }
    }
}

/// Reads the last `n` records of a JSONL audit log. Lines that fail to parse
/// are skipped.
pub fn read_tail(path: &Path, n: usize) -> anyhow::Result<Vec<AuditRecord>> {
    read_tail_matching(path, n, |_| true)
}

/// Like [`read_tail`], counting only records accepted by `keep`.
pub fn read_tail_matching<F>(path: &Path, n: usize, keep: F) -> anyhow::Result<Vec<AuditRecord>>
where
    F: Fn(&AuditRecord) -> bool,
{
    let f = std::fs::File::open(path)?;
    let mut out = VecDeque::new();
    if n == 0 {
        return Ok(Vec::new());
    }
    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(rec) = serde_json::from_str::<AuditRecord>(&line) else {
            continue;
        };
        if !keep(&rec) {
            continue;
        }
        if out.len() == n {
            out.pop_front();
        }
        out.push_back(rec);
    }
    Ok(out.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )))
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip: "192.0.2.7".into(),
            user_agent: "pytest".into(),
        }
    }

    #[test]
    fn test_jsonl_appends_one_line_per_record() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("logs").join("ai_query_audit.log");
        let logger = AuditLogger::new(Arc::new(JsonlAuditLog::new(&path)));

        logger.record("top batteries", "SELECT val FROM battery_data", &client(), "r-1", true);
        logger.record("delete everything", "", &client(), "r-2", false);

        let raw = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0])?;
        assert_eq!(first["user_ip"], "192.0.2.7");
        assert_eq!(first["user_agent"], "pytest");
        assert_eq!(first["request_id"], "r-1");
        assert_eq!(first["is_valid"], true);
        assert!(first["timestamp"].as_str().unwrap().contains('T'));

        let second: AuditRecord = serde_json::from_str(lines[1])?;
        assert_eq!(second.sql_query, "");
        assert!(!second.is_valid);
        Ok(())
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let logger = AuditLogger::new(Arc::new(BrokenSink));
        // Must not panic or propagate.
        logger.record("q", "SELECT 1", &client(), "r-1", true);
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("audit.log");
        let logger = AuditLogger::new(Arc::new(JsonlAuditLog::new(&path)));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let q = format!("thread {t} query {i} {}", "x".repeat(512));
                        logger.record(&q, "SELECT val FROM battery_data", &client(), "r", true);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let raw = std::fs::read_to_string(&path)?;
        let mut count = 0;
        for line in raw.lines() {
            let _: AuditRecord = serde_json::from_str(line)?;
            count += 1;
        }
        assert_eq!(count, 200);
        Ok(())
    }

    #[test]
    fn test_read_tail_returns_last_records() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("audit.log");
        let sink = JsonlAuditLog::new(&path);
        let logger = AuditLogger::new(Arc::new(sink));
        for i in 0..5 {
            logger.record(&format!("q{i}"), "", &client(), &format!("r-{i}"), i % 2 == 0);
        }
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)?
            .write_all(b"not json\n")?;

        let tail = read_tail(&path, 2)?;
        let ids: Vec<_> = tail.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, vec!["r-3", "r-4"]);

        let invalid = read_tail_matching(&path, 10, |r| !r.is_valid)?;
        let ids: Vec<_> = invalid.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, vec!["r-1", "r-3"]);
        Ok(())
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        let logger = AuditLogger::new(Arc::new(sink.clone()));
        logger.record("q", "SELECT val FROM battery_data", &client(), "r-9", true);
        let recs = sink.records();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].request_id, "r-9");
    }
}
