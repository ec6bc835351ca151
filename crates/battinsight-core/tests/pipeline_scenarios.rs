use battinsight_core::audit::{AuditLogger, JsonlAuditLog};
use battinsight_core::config::AppConfig;
use battinsight_core::generator::LlmSqlGenerator;
use battinsight_core::model::{AuditRecord, BatteryRecord, ClientInfo, QueryOptions, QueryRequest};
use battinsight_core::providers::llm::fake::FakeClient;
use battinsight_core::providers::llm::LlmClient;
use battinsight_core::storage::Store;
use battinsight_core::validator::SqlValidator;
use battinsight_core::{PipelineSettings, QueryPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    audit_path: PathBuf,
    fake: Arc<FakeClient>,
    pipeline: QueryPipeline,
}

fn harness(model_reply: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("logs").join("ai_query_audit.log");

    let store = Store::open(&dir.path().join("battinsight.db")).unwrap();
    store.init_schema().unwrap();
    let records: Vec<BatteryRecord> = (0..150)
        .map(|i| BatteryRecord {
            batt_alias: format!("BATT-{i:03}"),
            country: Some("Germany".into()),
            continent: Some("Europe".into()),
            climate: Some("temperate".into()),
            iso_a3: Some("DEU".into()),
            var: Some("capacity".into()),
            val: Some(f64::from(i)),
            ..Default::default()
        })
        .collect();
    store.insert_battery_records(&records).unwrap();

    let cfg = AppConfig::default();
    let fake = Arc::new(FakeClient::new(model_reply));
    let client: Arc<dyn LlmClient> = fake.clone();
    let pipeline = QueryPipeline::new(
        Arc::new(LlmSqlGenerator::new(Some(client))),
        SqlValidator::new(&cfg.allowed_tables),
        Arc::new(store),
        AuditLogger::new(Arc::new(JsonlAuditLog::new(&audit_path))),
        PipelineSettings::from_config(&cfg),
    );
    Harness {
        _dir: dir,
        audit_path,
        fake,
        pipeline,
    }
}

fn request(query: &str) -> QueryRequest {
    QueryRequest {
        query: query.into(),
        options: QueryOptions::default(),
        client: ClientInfo {
            ip: "203.0.113.9".into(),
            user_agent: "scenario-test".into(),
        },
        request_id: "r-scenario".into(),
    }
}

fn audit_lines(path: &Path) -> Vec<AuditRecord> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn top_batteries_by_value_returns_bounded_rows() {
    let h = harness("```sql\nSELECT batt_alias, val FROM battery_data ORDER BY val DESC\n```");
    let resp = h
        .pipeline
        .run(&request("Show me the top 5 batteries by value"))
        .await
        .unwrap();

    assert_eq!(resp.data.len(), 100);
    assert_eq!(resp.data[0]["batt_alias"], "BATT-149");

    let meta = resp.metadata.unwrap();
    assert_eq!(meta.row_count, 100);
    assert!(meta.sql_query.ends_with(" LIMIT 100;"), "{}", meta.sql_query);
    assert_eq!(meta.sql_query.to_ascii_uppercase().matches("LIMIT").count(), 1);
    assert_eq!(meta.query_text, "Show me the top 5 batteries by value");

    let audit = audit_lines(&h.audit_path);
    assert_eq!(audit.len(), 1);
    assert!(audit[0].is_valid);
    assert_eq!(
        audit[0].sql_query,
        "SELECT batt_alias, val FROM battery_data ORDER BY val DESC"
    );
    assert_eq!(audit[0].user_ip, "203.0.113.9");
}

#[tokio::test]
async fn destructive_intent_is_rejected_before_the_model() {
    let h = harness("SELECT batt_alias FROM battery_data");
    let err = h
        .pipeline
        .run(&request("Delete all records for Germany"))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(err.public_message(), "Query contains disallowed operations");
    assert_eq!(h.fake.calls(), 0);

    let audit = audit_lines(&h.audit_path);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].sql_query, "");
    assert!(!audit[0].is_valid);
}

#[tokio::test]
async fn wildcard_select_is_rejected_and_audited() {
    let h = harness("SELECT * FROM battery_data");
    let err = h
        .pipeline
        .run(&request("everything about batteries"))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(err.public_message().to_lowercase().contains("wildcard"));

    let audit = audit_lines(&h.audit_path);
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].is_valid);
    assert_eq!(audit[0].sql_query, "SELECT * FROM battery_data");
}

#[tokio::test]
async fn table_outside_allowlist_is_named() {
    let h = harness("SELECT id FROM users");
    let err = h.pipeline.run(&request("list user ids")).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(err.public_message().contains("'users'"), "{}", err.public_message());
    assert_eq!(audit_lines(&h.audit_path).len(), 1);
}

#[tokio::test]
async fn generated_drop_is_caught_by_the_validator() {
    let h = harness("DROP TABLE battery_data");
    let err = h
        .pipeline
        .run(&request("remove the battery table"))
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "Only SELECT queries are allowed");

    let audit = audit_lines(&h.audit_path);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].sql_query, "DROP TABLE battery_data");
}

#[tokio::test]
async fn each_generated_candidate_is_audited_once() {
    let replies = [
        "SELECT batt_alias FROM battery_data",
        "SELECT batt_alias FROM battery_data JOIN model_series ON 1=1",
        "SELECT val FROM battery_data; SELECT 1",
        "SELECT val FROM battery_data -- hidden",
        "SELECT no_such_column FROM battery_data",
    ];
    for reply in replies {
        let h = harness(reply);
        let _ = h.pipeline.run(&request("some battery question")).await;
        assert_eq!(audit_lines(&h.audit_path).len(), 1, "reply: {reply}");
        assert_eq!(h.fake.calls(), 1);
    }
}

#[tokio::test]
async fn storage_rejection_is_a_client_error() {
    let h = harness("SELECT no_such_column FROM battery_data");
    let err = h.pipeline.run(&request("odd column")).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.public_message(), "Failed to execute query");
}
