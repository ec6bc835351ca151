use super::{exit_codes, read_sql, Context};
use crate::cli::args::OptimizeArgs;
use battinsight_core::optimizer::OptimizedQuery;
use battinsight_core::validator::SqlValidator;

pub async fn run(ctx: &Context, args: OptimizeArgs) -> anyhow::Result<i32> {
    let cfg = ctx.app_config()?;
    let sql = read_sql(args.sql).await?;
    let sql = sql.trim();

    // Only validated SQL is ever bounded.
    let verdict = SqlValidator::new(&cfg.allowed_tables).validate(sql);
    if !verdict.is_valid() {
        eprintln!(
            "blocked [{}]: {}",
            verdict.reason_code,
            verdict.reason.as_deref().unwrap_or("")
        );
        return Ok(exit_codes::REJECTED);
    }

    let max_rows = args
        .max_rows
        .unwrap_or(cfg.default_max_results)
        .clamp(1, cfg.max_results_ceiling);
    let q = OptimizedQuery::new(sql, max_rows, cfg.statement_timeout());
    println!("{}", q.sql);
    tracing::info!(
        event = "optimized",
        row_limit = q.row_limit,
        timeout_ms = q.timeout.as_millis() as u64
    );
    Ok(exit_codes::OK)
}
