use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sensor-dashboard",
    version,
    about = "Climate and motion sensor dashboard backed by InfluxDB"
)]
pub struct Args {
    /// Overrides DASHBOARD_HTTP_BIND.
    #[arg(long)]
    pub bind: Option<String>,
    /// Print one dashboard snapshot as JSON and exit instead of serving.
    #[arg(long, default_value_t = false)]
    pub once: bool,
    /// Lookback window in days for --once. Defaults to the configured default.
    #[arg(long, allow_negative_numbers = true)]
    pub days: Option<i64>,
}
