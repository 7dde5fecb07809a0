//! Snapshot of every registered sensor for one lookback window, shaped for
//! the chart and statistics views.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::SensorPipeline;
use crate::query::LookbackDays;
use crate::registry::{SensorFamily, SensorRegistry};
use crate::stats::{summarize, SensorVariableSummary};
use crate::store::QueryExecutor;
use crate::table::{NormalizedTable, VariableSeries};

pub const SUMMARY_EMPTY_NOTE: &str = "No data available for statistics.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelStatus {
    Ready,
    NoData,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelError {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorPanel {
    pub sensor: String,
    pub family: SensorFamily,
    pub status: PanelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PanelError>,
    pub series: Vec<VariableSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub lookback_days: LookbackDays,
    pub panels: Vec<SensorPanel>,
    pub summary: Vec<SensorVariableSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_note: Option<String>,
}

pub fn no_data_message(sensor: &str) -> String {
    format!("No recent data for {sensor}.")
}

/// Queries every registered sensor in registry order, one after another.
///
/// A failing sensor is reported on its own panel and does not stop the rest.
/// Only an invalid lookback fails the whole snapshot.
pub async fn build_snapshot<E: QueryExecutor>(
    pipeline: &SensorPipeline<E>,
    registry: &SensorRegistry,
    lookback_days: i64,
) -> Result<DashboardSnapshot, PipelineError> {
    let lookback = LookbackDays::new(lookback_days)?;

    let mut panels = Vec::with_capacity(registry.len());
    let mut tables: Vec<(&str, NormalizedTable)> = Vec::new();

    for entry in registry.iter() {
        let sensor = entry.name.as_str();
        match pipeline.run_query(&entry.spec, lookback.get()).await {
            Ok(table) if table.is_empty() => {
                tracing::warn!(sensor, lookback_days = lookback.get(), "no recent data");
                panels.push(SensorPanel {
                    sensor: sensor.to_string(),
                    family: entry.family,
                    status: PanelStatus::NoData,
                    message: Some(no_data_message(sensor)),
                    error: None,
                    series: Vec::new(),
                });
            }
            Ok(table) => {
                panels.push(SensorPanel {
                    sensor: sensor.to_string(),
                    family: entry.family,
                    status: PanelStatus::Ready,
                    message: None,
                    error: None,
                    series: table.group_by_variable(),
                });
                tables.push((sensor, table));
            }
            Err(err) => {
                tracing::warn!(sensor, error = %err, kind = err.kind(), "sensor query failed");
                panels.push(SensorPanel {
                    sensor: sensor.to_string(),
                    family: entry.family,
                    status: PanelStatus::Error,
                    message: Some(format!("Error querying {sensor}: {err}")),
                    error: Some(PanelError {
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                    series: Vec::new(),
                });
            }
        }
    }

    let summary = summarize(tables.iter().map(|(sensor, table)| (*sensor, table)));
    let summary_note = summary.is_empty().then(|| SUMMARY_EMPTY_NOTE.to_string());

    Ok(DashboardSnapshot {
        generated_at: Utc::now(),
        lookback_days: lookback,
        panels,
        summary,
        summary_note,
    })
}
