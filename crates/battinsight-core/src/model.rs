use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// Who sent a query. Captured once at the HTTP edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            ip: "unknown".to_string(),
            user_agent: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Requested row cap. Absent means the configured default; out-of-range
    /// values are clamped by the pipeline.
    #[serde(default)]
    pub max_results: Option<i64>,
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: None,
            include_metadata: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub options: QueryOptions,
    pub client: ClientInfo,
    pub request_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Allowed,
    Blocked,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ValidationVerdict {
    pub status: VerdictStatus,
    pub reason_code: String, // "OK", "E_NOT_SELECT", "E_TABLE_NOT_ALLOWED", ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub sql: String,
}

impl ValidationVerdict {
    pub fn allowed(sql: &str) -> Self {
        Self {
            status: VerdictStatus::Allowed,
            reason_code: "OK".to_string(),
            reason: None,
            sql: sql.to_string(),
        }
    }

    pub fn blocked(sql: &str, code: &str, reason: String) -> Self {
        Self {
            status: VerdictStatus::Blocked,
            reason_code: code.to_string(),
            reason: Some(reason),
            sql: sql.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == VerdictStatus::Allowed
    }
}

/// One line of the audit log. Field names are the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub user_ip: String,
    pub query_text: String,
    pub sql_query: String,
    pub user_agent: String,
    pub request_id: String,
    pub is_valid: bool,
}

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sql: String,
    pub executed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub row_count: usize,
    pub sql_query: String,
    pub execution_time: String,
    pub query_text: String,
}

/// Success envelope of `POST /api/ai-query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub data: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryRecord {
    pub batt_alias: String,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub climate: Option<String>,
    pub iso_a3: Option<String>,
    pub model_series: Option<i64>,
    pub var: Option<String>,
    pub val: Option<f64>,
    pub descr: Option<String>,
    pub cnt_vhcl: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSeriesRecord {
    pub series_name: String,
    pub release_year: Option<i64>,
    pub description: Option<String>,
}

/// Fixture file accepted by `battinsight init-db --seed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub battery_data: Vec<BatteryRecord>,
    #[serde(default)]
    pub model_series: Vec<ModelSeriesRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults_from_empty_object() {
        let opts: QueryOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.max_results, None);
        assert!(opts.include_metadata);
    }

    #[test]
    fn test_audit_record_wire_format() {
        let rec = AuditRecord {
            timestamp: "2025-01-01T00:00:00+00:00".into(),
            user_ip: "10.0.0.1".into(),
            query_text: "q".into(),
            sql_query: "".into(),
            user_agent: "curl".into(),
            request_id: "r-1".into(),
            is_valid: false,
        };
        let v = serde_json::to_value(&rec).unwrap();
        for key in [
            "timestamp",
            "user_ip",
            "query_text",
            "sql_query",
            "user_agent",
            "request_id",
            "is_valid",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_metadata_omitted_when_absent() {
        let resp = QueryResponse {
            data: vec![],
            metadata: None,
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("metadata").is_none());
        assert_eq!(v["data"], serde_json::json!([]));
    }
}
