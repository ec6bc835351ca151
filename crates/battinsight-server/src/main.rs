use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use battinsight_core::QueryPipeline;
use battinsight_server::{client, config, routes};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional YAML file layered under environment overrides.
    #[arg(long, env = "BATTINSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Reject unknown keys in the config file.
    #[arg(long)]
    strict: bool,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::ServerConfig::from_env();

    init_logging(&cfg.log_level);

    let app_cfg = battinsight_core::config::resolve(args.config.as_deref(), args.strict)?;
    tracing::info!(
        event = "server_start",
        bind = %cfg.bind,
        api_prefix = %cfg.api_prefix,
        database = ?app_cfg.database_path,
        audit_log = ?app_cfg.audit_log_path,
        allowed_tables = ?app_cfg.allowed_tables,
        llm_provider = %app_cfg.llm.provider,
        llm_model = %app_cfg.llm.model
    );

    let pipeline = web::Data::new(QueryPipeline::from_config(&app_cfg)?);
    let prefix = cfg.api_prefix.clone();
    let max_body = cfg.max_body_bytes;

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(from_fn(client::tag_request_id))
            .app_data(pipeline.clone())
            .app_data(web::PayloadConfig::new(max_body))
            .configure(routes::configure(prefix.clone()))
    })
    .bind(&cfg.bind)?;
    if cfg.workers > 0 {
        server = server.workers(cfg.workers);
    }
    server.run().await?;

    tracing::info!(event = "server_stop");
    Ok(())
}
