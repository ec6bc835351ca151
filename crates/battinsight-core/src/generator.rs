use crate::errors::GenerationError;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns free text into candidate SQL. Output is untrusted.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, query: &str, schema: &str) -> Result<String, GenerationError>;
}

const SYSTEM_PROMPT: &str = "You are an assistant that converts natural language questions \
into SQL queries for a battery telemetry analysis system.

{schema}
Rules:
1. Generate a single read-only SELECT statement.
2. Only use the tables and columns listed above.
3. Never use INSERT, UPDATE, DELETE, DROP, ALTER, CREATE or any other write operation.
4. Do not use JOIN, UNION or subqueries against other tables.
5. Name every column explicitly; never use SELECT *.
6. Do not add comments.

Return only the SQL query without any explanation or markdown.";

/// Words a reply may start with and still count as SQL. Anything a model
/// might emit is listed, including statements the validator will reject.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE",
    "MERGE", "EXEC", "EXECUTE", "REPLACE", "PRAGMA", "ATTACH", "DETACH", "VACUUM", "GRANT",
    "REVOKE", "COPY", "CALL", "SET", "SHOW", "EXPLAIN", "VALUES", "TABLE",
];

pub struct LlmSqlGenerator {
    client: Option<Arc<dyn LlmClient>>,
}

impl LlmSqlGenerator {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self { client }
    }

    pub fn system_prompt(schema: &str) -> String {
        SYSTEM_PROMPT.replace("{schema}", schema)
    }
}

#[async_trait]
impl SqlGenerator for LlmSqlGenerator {
    async fn generate(&self, query: &str, schema: &str) -> Result<String, GenerationError> {
        let client = self
            .client
            .as_ref()
            .ok_or(GenerationError::MissingCredential)?;

        let resp = client
            .complete(&Self::system_prompt(schema), query)
            .await
            .map_err(|e| GenerationError::Upstream(e.to_string()))?;

        tracing::debug!(
            event = "sql_generated",
            provider = client.provider_name(),
            model = %resp.model,
            bytes = resp.text.len()
        );

        extract_sql(&resp.text)
    }
}

/// Pulls the SQL text out of a model reply: first fenced block if present,
/// else the whole reply, trimmed.
pub fn extract_sql(reply: &str) -> Result<String, GenerationError> {
    let sql = strip_fences(reply).trim().to_string();
    if sql.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    if !looks_like_sql(&sql) {
        let preview: String = sql.chars().take(40).collect();
        return Err(GenerationError::NotSql(preview));
    }
    Ok(sql)
}

fn strip_fences(reply: &str) -> &str {
    let Some(open) = reply.find("```") else {
        return reply;
    };
    let after = &reply[open + 3..];
    // Drop the info string (`sql`, `SQL`, `postgresql`, ...) on the fence line.
    let body = match after.find('\n') {
        Some(nl) if !after[..nl].trim().contains(' ') => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn looks_like_sql(sql: &str) -> bool {
    let first: String = sql
        .trim_start_matches('(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let first = first.to_ascii_uppercase();
    STATEMENT_KEYWORDS.contains(&first.as_str())
}
