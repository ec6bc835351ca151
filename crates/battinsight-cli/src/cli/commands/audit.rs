use super::{exit_codes, Context};
use crate::cli::args::AuditArgs;
use battinsight_core::audit::read_tail_matching;

pub async fn run(ctx: &Context, args: AuditArgs) -> anyhow::Result<i32> {
    let path = match args.log {
        Some(p) => p,
        None => ctx.app_config()?.audit_log_path,
    };
    if !path.exists() {
        eprintln!("no audit log at {}", path.display());
        return Ok(exit_codes::OK);
    }

    let invalid_only = args.invalid_only;
    let records = read_tail_matching(&path, args.tail, |r| !invalid_only || !r.is_valid)?;

    if args.format == "json" {
        for r in &records {
            println!("{}", serde_json::to_string(r)?);
        }
        return Ok(exit_codes::OK);
    }

    for r in &records {
        let status = if r.is_valid { "valid" } else { "BLOCKED" };
        let sql = if r.sql_query.is_empty() {
            "-"
        } else {
            r.sql_query.as_str()
        };
        println!(
            "{}  {:<7}  {:<15}  {}  {:?} -> {}",
            r.timestamp, status, r.user_ip, r.request_id, r.query_text, sql
        );
    }
    Ok(exit_codes::OK)
}
