use super::{exit_codes, Context};
use crate::cli::args::InitDbArgs;
use battinsight_core::model::SeedData;
use battinsight_core::storage::Store;

pub async fn run(ctx: &Context, args: InitDbArgs) -> anyhow::Result<i32> {
    let cfg = ctx.app_config()?;
    let db = args.db.unwrap_or(cfg.database_path);

    let store = Store::open(&db)?;
    store.init_schema()?;

    if let Some(seed) = &args.seed {
        let raw = tokio::fs::read_to_string(seed).await?;
        let data: SeedData = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid seed file {}: {e}", seed.display()))?;
        let series = store.insert_model_series(&data.model_series)?;
        let batteries = store.insert_battery_records(&data.battery_data)?;
        tracing::info!(event = "seeded", series, batteries);
    }

    println!("initialized {}", db.display());
    for (table, count) in store.table_counts()? {
        println!("  {table}: {count} rows");
    }
    Ok(exit_codes::OK)
}
