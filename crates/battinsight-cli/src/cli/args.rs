use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "battinsight",
    version,
    about = "Operator tool for the BattInsight AI query pipeline"
)]
pub struct Cli {
    /// YAML config; environment variables override it.
    #[arg(long, global = true, env = "BATTINSIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reject unknown config keys.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log pipeline events to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check a SQL statement against the safety policy.
    Validate(ValidateArgs),
    /// Validate, then print the bounded statement that would be executed.
    Optimize(OptimizeArgs),
    /// Run a natural-language question through the full pipeline.
    Ask(AskArgs),
    /// Create the telemetry tables and optionally load a JSON fixture.
    InitDb(InitDbArgs),
    /// Show recent audit log entries.
    Audit(AuditArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct ValidateArgs {
    /// SQL text; `-` or omitted reads stdin.
    pub sql: Option<String>,

    /// Comma-separated allowlist; defaults to the configured tables.
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,

    /// text|json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Clone)]
pub struct OptimizeArgs {
    /// SQL text; `-` or omitted reads stdin.
    pub sql: Option<String>,

    #[arg(long)]
    pub max_rows: Option<u32>,
}

#[derive(Parser, Clone)]
pub struct AskArgs {
    pub query: String,

    #[arg(long)]
    pub max_results: Option<i64>,

    #[arg(long)]
    pub no_metadata: bool,

    /// Generate and validate only; nothing is executed or audited.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, env = "BATTINSIGHT_DB")]
    pub db: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct InitDbArgs {
    #[arg(long, env = "BATTINSIGHT_DB")]
    pub db: Option<PathBuf>,

    /// JSON file with `battery_data` and `model_series` arrays.
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct AuditArgs {
    #[arg(long, env = "BATTINSIGHT_AUDIT_LOG")]
    pub log: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    pub tail: usize,

    #[arg(long)]
    pub invalid_only: bool,

    /// text|json
    #[arg(long, default_value = "text")]
    pub format: String,
}
