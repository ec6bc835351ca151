//! Sequences one natural-language query through pre-screen, generation,
//! validation, audit, optimization and execution.
//!
//! Candidate SQL only reaches the [`QueryExecutor`] after passing both the
//! pre-screen and the [`SqlValidator`]. Once a candidate exists it is audited
//! exactly once, valid or not.

use crate::audit::{AuditLogger, JsonlAuditLog};
use crate::catalog;
use crate::config::AppConfig;
use crate::errors::{GenerationError, PipelineError};
use crate::generator::{LlmSqlGenerator, SqlGenerator};
use crate::model::{
    ExecutionResult, QueryOptions, QueryRequest, QueryResponse, ResponseMetadata,
};
use crate::optimizer::OptimizedQuery;
use crate::prescreen;
use crate::providers::llm;
use crate::storage::{QueryExecutor, Store};
use crate::validator::SqlValidator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

static RID: AtomicU64 = AtomicU64::new(1);

/// `r-<hex millis>-<counter>`, unique per process.
pub fn next_request_id() -> String {
    let n = RID.fetch_add(1, Ordering::Relaxed);
    let millis = chrono::Utc::now().timestamp_millis();
    format!("r-{millis:x}-{n:04}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    PreScreened,
    Generated,
    Validated,
    Audited,
    Optimized,
    Executed,
    Responded,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::PreScreened => "pre_screened",
            Stage::Generated => "generated",
            Stage::Validated => "validated",
            Stage::Audited => "audited",
            Stage::Optimized => "optimized",
            Stage::Executed => "executed",
            Stage::Responded => "responded",
            Stage::Error => "error",
        }
    }
}

fn enter(rid: &str, stage: Stage) {
    tracing::debug!(event = "pipeline_stage", rid = %rid, stage = stage.as_str());
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub schema: String,
    pub default_max_results: u32,
    pub max_results_ceiling: u32,
    pub max_query_chars: usize,
    pub statement_timeout: Duration,
    pub generation_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            schema: catalog::describe(&cfg.allowed_tables),
            default_max_results: cfg.default_max_results,
            max_results_ceiling: cfg.max_results_ceiling,
            max_query_chars: cfg.max_query_chars,
            statement_timeout: cfg.statement_timeout(),
            generation_timeout: cfg.generation_timeout(),
        }
    }

    /// Requested row cap clamped to `1..=max_results_ceiling`.
    pub fn row_limit(&self, options: &QueryOptions) -> u32 {
        let ceiling = i64::from(self.max_results_ceiling.max(1));
        let requested = options
            .max_results
            .unwrap_or(i64::from(self.default_max_results));
        requested.clamp(1, ceiling) as u32
    }
}

pub struct QueryPipeline {
    generator: Arc<dyn SqlGenerator>,
    validator: SqlValidator,
    executor: Arc<dyn QueryExecutor>,
    audit: AuditLogger,
    settings: PipelineSettings,
}

impl QueryPipeline {
    pub fn new(
        generator: Arc<dyn SqlGenerator>,
        validator: SqlValidator,
        executor: Arc<dyn QueryExecutor>,
        audit: AuditLogger,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            validator,
            executor,
            audit,
            settings,
        }
    }

    /// Wires the production collaborators: configured LLM client, SQLite
    /// store at `database_path` and the JSONL audit log.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = llm::from_config(&cfg.llm)?;
        if client.is_none() {
            tracing::warn!(
                event = "llm_not_configured",
                provider = %cfg.llm.provider,
                "OPENAI_API_KEY is not set; AI queries will be refused"
            );
        }

        let store = Store::open(&cfg.database_path)?;
        store.init_schema()?;

        Ok(Self::new(
            Arc::new(LlmSqlGenerator::new(client)),
            SqlValidator::new(&cfg.allowed_tables),
            Arc::new(store),
            AuditLogger::new(Arc::new(JsonlAuditLog::new(&cfg.audit_log_path))),
            PipelineSettings::from_config(cfg),
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, req: &QueryRequest) -> Result<QueryResponse, PipelineError> {
        let rid = req.request_id.as_str();
        let started = Instant::now();

        let result = self.run_stages(req).await;
        match &result {
            Ok(resp) => {
                enter(rid, Stage::Responded);
                tracing::info!(
                    event = "ai_query_completed",
                    rid = %rid,
                    rows = resp.data.len(),
                    duration_ms = started.elapsed().as_millis() as u64
                );
            }
            Err(e) => {
                enter(rid, Stage::Error);
                tracing::warn!(
                    event = "ai_query_failed",
                    rid = %rid,
                    status = e.status_code(),
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    async fn run_stages(&self, req: &QueryRequest) -> Result<QueryResponse, PipelineError> {
        let rid = req.request_id.as_str();
        let query = req.query.trim();
        enter(rid, Stage::Received);

        if query.is_empty() {
            return Err(PipelineError::BadRequest("Missing query parameter".into()));
        }
        if query.chars().count() > self.settings.max_query_chars {
            return Err(PipelineError::BadRequest(format!(
                "Query exceeds {} characters",
                self.settings.max_query_chars
            )));
        }
        let max_rows = self.settings.row_limit(&req.options);

        if let Some(word) = prescreen::disallowed_intent(query) {
            tracing::warn!(event = "prescreen_rejected", rid = %rid, keyword = word);
            self.audit.record(&req.query, "", &req.client, rid, false);
            return Err(PipelineError::Disallowed);
        }
        enter(rid, Stage::PreScreened);

        let sql = self.generate(rid, query).await?;
        enter(rid, Stage::Generated);

        let verdict = self.validator.validate(&sql);
        enter(rid, Stage::Validated);

        self.audit
            .record(&req.query, &sql, &req.client, rid, verdict.is_valid());
        enter(rid, Stage::Audited);

        if !verdict.is_valid() {
            return Err(PipelineError::Invalid {
                code: verdict.reason_code,
                reason: verdict.reason.unwrap_or_default(),
            });
        }

        let optimized = OptimizedQuery::new(&sql, max_rows, self.settings.statement_timeout);
        enter(rid, Stage::Optimized);

        let executed = self.execute(optimized).await?;
        enter(rid, Stage::Executed);

        let metadata = req.options.include_metadata.then(|| ResponseMetadata {
            row_count: executed.row_count,
            sql_query: executed.sql.clone(),
            execution_time: executed.executed_at.clone(),
            query_text: req.query.clone(),
        });
        Ok(QueryResponse {
            data: executed.rows,
            metadata,
        })
    }

    async fn generate(&self, rid: &str, query: &str) -> Result<String, PipelineError> {
        let limit = self.settings.generation_timeout;
        match timeout(limit, self.generator.generate(query, &self.settings.schema)).await {
            Ok(Ok(sql)) => Ok(sql),
            Ok(Err(e)) => {
                tracing::error!(event = "sql_generation_failed", rid = %rid, error = %e);
                Err(PipelineError::Generation(e))
            }
            Err(_) => {
                tracing::error!(
                    event = "sql_generation_timeout",
                    rid = %rid,
                    timeout_ms = limit.as_millis() as u64
                );
                Err(PipelineError::Generation(GenerationError::Timeout(limit)))
            }
        }
    }

    async fn execute(&self, query: OptimizedQuery) -> Result<ExecutionResult, PipelineError> {
        let executor = Arc::clone(&self.executor);
        let sql = query.sql.clone();
        let rows = tokio::task::spawn_blocking(move || executor.execute(&query))
            .await
            .map_err(|e| PipelineError::Internal(format!("executor task failed: {e}")))?
            .map_err(PipelineError::Execution)?;

        Ok(ExecutionResult {
            row_count: rows.rows.len(),
            rows: rows.rows,
            columns: rows.columns,
            sql,
            executed_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}
