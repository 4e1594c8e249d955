mod appconfig;
mod cli;
mod connection;
mod cutover;
mod dynamo;
mod error;
mod lifecycle;
mod metrics;
mod pipeline;
mod prometheus;
mod report;
mod schema;
mod spanner;
#[cfg(test)]
mod tests;

use crate::appconfig::load_app_config;
use crate::cli::Cli;
use crate::connection::DynamoSpannerConfig;
use crate::dynamo::client::{AwsDynamoStreamsClient, DynamoStreamsClient};
use crate::dynamo::provisioner::ensure_stream;
use crate::error::AppResult;
use crate::metrics::PipelineMetrics;
use crate::pipeline::state::SharedStreamState;
use crate::pipeline::TableContext;
use crate::schema::{FileSchemaSource, SchemaSource};
use crate::spanner::client::GoogleSpannerWriter;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.workers)
        .enable_all()
        .build()
        .map_err(error::AppError::ConfigIo)?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> AppResult<()> {
    let app_config = load_app_config()?;
    init_tracing(&app_config.logging.level);

    let run_id = uuid::Uuid::new_v4();
    tracing::info!(%run_id, "starting streaming run");

    let db_config = DynamoSpannerConfig::load()?;

    let metrics = PipelineMetrics::new()?;
    let state = Arc::new(SharedStreamState::new(metrics.clone()));

    if app_config.metrics.enabled {
        let prom_cfg = app_config.prometheus;
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) =
                crate::prometheus::run_metrics_server(prom_cfg, move || metrics.encode_text()).await
            {
                tracing::error!("metrics server exited: {e}");
            }
        });
    }

    let endpoint_url = (!db_config.dynamo.endpoint_url.is_empty())
        .then_some(db_config.dynamo.endpoint_url.as_str());
    let dynamo: Arc<dyn DynamoStreamsClient> = Arc::new(
        AwsDynamoStreamsClient::from_env(&db_config.dynamo.region, endpoint_url).await,
    );

    let stream_id = ensure_stream(dynamo.as_ref(), &db_config.dynamo.table).await?;
    tracing::info!(table = %db_config.dynamo.table, stream_id = %stream_id, "stream provisioned");

    let schema_source = FileSchemaSource::new(
        db_config.schema.source_schema_path.clone(),
        db_config.schema.target_schema_path.clone(),
    );
    let schemas = schema_source.load(&db_config.dynamo.table).await?;
    let table = TableContext { schemas };

    if cli.dry_run {
        tracing::warn!("dry run: no Spanner writer installed, mutations will be counted and dropped");
    } else {
        let writer = GoogleSpannerWriter::connect(
            &db_config.spanner_database_path(),
            &db_config.spanner.migration_id,
        )
        .await?;
        state.set_writer(Arc::new(writer));
    }

    lifecycle::run(
        state.clone(),
        dynamo,
        stream_id,
        table,
        app_config.timings,
        app_config.retry,
        app_config.cutover,
    )
    .await;

    let report = report::build_report(&state);
    report.log_summary();

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
