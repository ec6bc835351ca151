use super::args::{Cli, Command};
use battinsight_core::config::{self, AppConfig};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

pub mod ask;
pub mod audit;
pub mod init_db;
pub mod optimize;
pub mod validate;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const REJECTED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const UNAVAILABLE: i32 = 3;
    pub const FAILED: i32 = 4;
}

/// Global flags shared by every subcommand.
pub struct Context {
    pub config: Option<PathBuf>,
    pub strict: bool,
}

impl Context {
    pub fn app_config(&self) -> anyhow::Result<AppConfig> {
        Ok(config::resolve(self.config.as_deref(), self.strict)?)
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let ctx = Context {
        config: cli.config,
        strict: cli.strict,
    };
    match cli.cmd {
        Command::Validate(args) => validate::run(&ctx, args).await,
        Command::Optimize(args) => optimize::run(&ctx, args).await,
        Command::Ask(args) => ask::run(&ctx, args).await,
        Command::InitDb(args) => init_db::run(&ctx, args).await,
        Command::Audit(args) => audit::run(&ctx, args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// SQL from the positional argument, or stdin when it is absent or `-`.
pub(crate) async fn read_sql(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(sql) if sql != "-" => Ok(sql),
        _ => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Ok(buf)
        }
    }
}
