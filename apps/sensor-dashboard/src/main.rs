use anyhow::{bail, Context, Result};
use clap::Parser;
use sensor_dashboard::config::Config;
use sensor_dashboard::query::LookbackDays;
use sensor_dashboard::store::InfluxClient;
use sensor_dashboard::{cli, dashboard, http, SensorPipeline, SensorRegistry};
use std::sync::Arc;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sensor_dashboard=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing()?;
    let config = Config::from_env()?;

    let mut http_client = reqwest::Client::builder();
    if let Some(timeout) = config.influx_timeout {
        http_client = http_client.timeout(timeout);
    }
    let http_client = http_client.build().context("failed to build HTTP client")?;
    let influx = InfluxClient::new(
        http_client,
        &config.influx_url,
        config.influx_token.clone(),
        &config.influx_org,
    )
    .context("invalid INFLUXDB_URL")?;

    let pipeline = Arc::new(SensorPipeline::new(influx, config.influx_bucket.clone()));
    let registry = Arc::new(
        SensorRegistry::builtin()
            .with_default_lookback(LookbackDays::new(i64::from(config.default_lookback_days))?),
    );

    if args.once {
        let days = args
            .days
            .unwrap_or_else(|| i64::from(config.default_lookback_days));
        if days > i64::from(config.max_lookback_days) {
            bail!("--days must be between 1 and {}", config.max_lookback_days);
        }
        let snapshot = dashboard::build_snapshot(&*pipeline, &*registry, days).await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let bind = args.bind.unwrap_or_else(|| config.http_bind.clone());
    let app = http::router(http::HttpState {
        pipeline,
        registry,
        default_lookback_days: config.default_lookback_days,
        max_lookback_days: config.max_lookback_days,
    });
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind sensor-dashboard listener on {bind}"))?;
    tracing::info!(
        bind = %bind,
        bucket = %config.influx_bucket,
        "sensor-dashboard HTTP listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
