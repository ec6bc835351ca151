use super::{exit_codes, read_sql, Context};
use crate::cli::args::ValidateArgs;
use battinsight_core::validator::SqlValidator;

pub async fn run(ctx: &Context, args: ValidateArgs) -> anyhow::Result<i32> {
    let sql = read_sql(args.sql).await?;
    let tables = if args.tables.is_empty() {
        ctx.app_config()?.allowed_tables
    } else {
        args.tables
    };

    let verdict = SqlValidator::new(&tables).validate(sql.trim());

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else if verdict.is_valid() {
        println!("ok");
    } else {
        println!(
            "blocked [{}]: {}",
            verdict.reason_code,
            verdict.reason.as_deref().unwrap_or("")
        );
    }

    Ok(if verdict.is_valid() {
        exit_codes::OK
    } else {
        exit_codes::REJECTED
    })
}
