use super::{exit_codes, Context};
use crate::cli::args::AskArgs;
use battinsight_core::catalog;
use battinsight_core::errors::PipelineError;
use battinsight_core::generator::{LlmSqlGenerator, SqlGenerator};
use battinsight_core::model::{ClientInfo, QueryOptions, QueryRequest};
use battinsight_core::optimizer::OptimizedQuery;
use battinsight_core::providers::llm;
use battinsight_core::validator::SqlValidator;
use battinsight_core::{next_request_id, QueryPipeline};

pub async fn run(ctx: &Context, args: AskArgs) -> anyhow::Result<i32> {
    let mut cfg = ctx.app_config()?;
    if let Some(db) = args.db.clone() {
        cfg.database_path = db;
    }

    if args.dry_run {
        return dry_run(&cfg, &args).await;
    }

    let pipeline = QueryPipeline::from_config(&cfg)?;
    let request = QueryRequest {
        query: args.query,
        options: QueryOptions {
            max_results: args.max_results,
            include_metadata: !args.no_metadata,
        },
        client: ClientInfo {
            ip: "local".to_string(),
            user_agent: format!("battinsight-cli/{}", env!("CARGO_PKG_VERSION")),
        },
        request_id: next_request_id(),
    };

    match pipeline.run(&request).await {
        Ok(resp) => {
            println!("{}", serde_json::to_string_pretty(&resp)?);
            Ok(exit_codes::OK)
        }
        Err(e) => report_error(&e),
    }
}

/// Generation and policy check without touching the database or audit log.
async fn dry_run(cfg: &battinsight_core::config::AppConfig, args: &AskArgs) -> anyhow::Result<i32> {
    let generator = LlmSqlGenerator::new(llm::from_config(&cfg.llm)?);
    let schema = catalog::describe(&cfg.allowed_tables);

    let sql = match generator.generate(args.query.trim(), &schema).await {
        Ok(sql) => sql,
        Err(e) => return report_error(&PipelineError::Generation(e)),
    };
    let verdict = SqlValidator::new(&cfg.allowed_tables).validate(&sql);

    let optimized = verdict.is_valid().then(|| {
        let rows = args
            .max_results
            .unwrap_or(i64::from(cfg.default_max_results))
            .clamp(1, i64::from(cfg.max_results_ceiling)) as u32;
        OptimizedQuery::new(&sql, rows, cfg.statement_timeout()).sql
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "sql": sql,
            "verdict": verdict,
            "optimized_sql": optimized,
        }))?
    );
    Ok(if verdict.is_valid() {
        exit_codes::OK
    } else {
        exit_codes::REJECTED
    })
}

fn report_error(e: &PipelineError) -> anyhow::Result<i32> {
    eprintln!("error: {}", e.public_message());
    tracing::debug!(event = "ask_failed", error = %e);
    Ok(match e.status_code() {
        503 => exit_codes::UNAVAILABLE,
        500..=599 => exit_codes::FAILED,
        _ => exit_codes::REJECTED,
    })
}
