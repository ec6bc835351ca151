use crate::errors::ExecutionError;
use crate::model::{BatteryRecord, ModelSeriesRecord, Row, RowSet};
use crate::optimizer::OptimizedQuery;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// SQLite VM instructions between deadline checks.
const PROGRESS_STEPS: i32 = 1_000;

/// Runs an already validated and optimized statement.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: &OptimizedQuery) -> Result<RowSet, ExecutionError>;
}

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-query leaves the connection itself usable.
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        self.conn().execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn insert_model_series(&self, series: &[ModelSeriesRecord]) -> anyhow::Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut n = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO model_series(series_name, release_year, description)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(series_name) DO UPDATE SET
                   release_year=excluded.release_year, description=excluded.description",
            )?;
            for s in series {
                n += stmt.execute(params![s.series_name, s.release_year, s.description])?;
            }
        }
        tx.commit()?;
        Ok(n)
    }

    pub fn insert_battery_records(&self, records: &[BatteryRecord]) -> anyhow::Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut n = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO battery_data(batt_alias, country, continent, climate, iso_a3,
                   model_series, var, val, descr, cnt_vhcl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for r in records {
                n += stmt.execute(params![
                    r.batt_alias,
                    r.country,
                    r.continent,
                    r.climate,
                    r.iso_a3,
                    r.model_series,
                    r.var,
                    r.val,
                    r.descr,
                    r.cnt_vhcl,
                ])?;
            }
        }
        tx.commit()?;
        Ok(n)
    }

    /// Row count per known table.
    pub fn table_counts(&self) -> anyhow::Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut out = Vec::new();
        for table in crate::storage::schema::TABLES {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| {
                r.get(0)
            })?;
            out.push((table.to_string(), n));
        }
        Ok(out)
    }
}

impl QueryExecutor for Store {
    fn execute(&self, query: &OptimizedQuery) -> Result<RowSet, ExecutionError> {
        let conn = self.conn();
        let _guard = ReadOnlyGuard::enable(&conn)
            .map_err(|e| ExecutionError::Internal(e.to_string()))?;

        let deadline = Instant::now() + query.timeout;
        conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
        let result = run_select(&conn, query);
        conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>);
        result
    }
}

/// Holds the connection in `query_only` mode until dropped.
struct ReadOnlyGuard<'a> {
    conn: &'a Connection,
}

impl<'a> ReadOnlyGuard<'a> {
    fn enable(conn: &'a Connection) -> rusqlite::Result<Self> {
        conn.execute_batch("PRAGMA query_only = ON")?;
        Ok(Self { conn })
    }
}

impl Drop for ReadOnlyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch("PRAGMA query_only = OFF") {
            tracing::error!(event = "query_only_reset_failed", error = %e);
        }
    }
}

fn run_select(conn: &Connection, query: &OptimizedQuery) -> Result<RowSet, ExecutionError> {
    let mut stmt = conn
        .prepare(&query.sql)
        .map_err(|e| classify(e, query.timeout, ExecutionError::Rejected))?;
    if !stmt.readonly() {
        return Err(ExecutionError::Rejected("statement is not read-only".into()));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt
        .query([])
        .map_err(|e| classify(e, query.timeout, ExecutionError::Internal))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| classify(e, query.timeout, ExecutionError::Internal))?
    {
        if out.len() >= query.row_limit as usize {
            break;
        }
        let mut obj = Row::new();
        for (i, name) in columns.iter().enumerate() {
            let v = row
                .get_ref(i)
                .map_err(|e| ExecutionError::Internal(e.to_string()))?;
            obj.insert(name.clone(), to_json(v));
        }
        out.push(obj);
    }

    Ok(RowSet { columns, rows: out })
}

fn classify(
    e: rusqlite::Error,
    timeout: Duration,
    other: fn(String) -> ExecutionError,
) -> ExecutionError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::OperationInterrupted => {
            ExecutionError::Timeout(timeout)
        }
        _ => other(e.to_string()),
    }
}

fn to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seeded() -> Store {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        store
            .insert_model_series(&[ModelSeriesRecord {
                series_name: "S1".into(),
                release_year: Some(2019),
                description: None,
            }])
            .unwrap();
        let records: Vec<BatteryRecord> = (0..20)
            .map(|i| BatteryRecord {
                batt_alias: format!("B{i:02}"),
                country: Some(if i % 2 == 0 { "Germany" } else { "Norway" }.into()),
                var: Some("soh".into()),
                val: Some(f64::from(i) * 1.5),
                model_series: Some(1),
                ..Default::default()
            })
            .collect();
        store.insert_battery_records(&records).unwrap();
        store
    }

    fn q(sql: &str, limit: u32) -> OptimizedQuery {
        OptimizedQuery::new(sql, limit, Duration::from_secs(5))
    }

    #[test]
    fn test_execute_maps_rows_to_json() {
        let store = seeded();
        let rs = store
            .execute(&q(
                "SELECT batt_alias, val FROM battery_data ORDER BY val DESC",
                3,
            ))
            .unwrap();
        assert_eq!(rs.columns, vec!["batt_alias", "val"]);
        assert_eq!(rs.rows.len(), 3);
        assert_eq!(rs.rows[0]["batt_alias"], "B19");
        assert_eq!(rs.rows[0]["val"], serde_json::json!(28.5));
    }

    #[test]
    fn test_null_columns_are_json_null() {
        let store = seeded();
        let rs = store
            .execute(&q("SELECT climate FROM battery_data", 1))
            .unwrap();
        assert_eq!(rs.rows[0]["climate"], Value::Null);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let store = seeded();
        let err = store
            .execute(&q("SELECT no_such_column FROM battery_data", 10))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(_)), "{err:?}");
    }

    #[test]
    fn test_writes_are_refused_and_mode_is_restored() {
        let store = seeded();
        let err = store
            .execute(&OptimizedQuery {
                sql: "DELETE FROM battery_data".into(),
                row_limit: 10,
                timeout: Duration::from_secs(5),
            })
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(_)));

        // query_only is switched back off after execution
        store.insert_battery_records(&[BatteryRecord {
            batt_alias: "late".into(),
            ..Default::default()
        }])
        .unwrap();
        let counts = store.table_counts().unwrap();
        assert!(counts.contains(&("battery_data".to_string(), 21)));
    }

    #[test]
    fn test_runaway_statement_times_out() {
        let store = seeded();
        let sql = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT MAX(x) AS x FROM c";
        let err = store
            .execute(&OptimizedQuery {
                sql: sql.into(),
                row_limit: 1,
                timeout: Duration::from_millis(50),
            })
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)), "{err:?}");

        // connection is usable afterwards
        let rs = store.execute(&q("SELECT batt_alias FROM battery_data", 1)).unwrap();
        assert_eq!(rs.rows.len(), 1);
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("battinsight.db");
        let store = Store::open(&path).unwrap();
        store.init_schema().unwrap();
        assert!(path.exists());
        assert_eq!(
            store.table_counts().unwrap(),
            vec![("model_series".to_string(), 0), ("battery_data".to_string(), 0)]
        );
    }
}
