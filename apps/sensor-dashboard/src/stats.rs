use serde::Serialize;
use std::collections::BTreeMap;

use crate::table::NormalizedTable;

/// count / mean / std / min / max for one group of readings.
///
/// `std` is the sample standard deviation (ddof = 1) and is NaN for fewer than
/// two values. NaN readings are skipped and not counted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let count = finite.len();
        if count == 0 {
            return Self {
                count,
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }

        let n = count as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let std = if count < 2 {
            f64::NAN
        } else {
            let ss: f64 = finite.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / (n - 1.0)).sqrt()
        };
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            count,
            mean,
            std,
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSummary {
    pub variable: String,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorVariableSummary {
    pub sensor: String,
    pub variable: String,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Per-variable statistics of one table, ordered by variable name.
pub fn describe(table: &NormalizedTable) -> Vec<VariableSummary> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in table {
        groups.entry(row.variable.as_str()).or_default().push(row.value);
    }
    groups
        .into_iter()
        .map(|(variable, values)| VariableSummary {
            variable: variable.to_string(),
            summary: Summary::from_values(&values),
        })
        .collect()
}

/// Statistics over several labelled tables, grouped by (sensor, variable)
/// and ordered by that key.
pub fn summarize<'a, I>(tables: I) -> Vec<SensorVariableSummary>
where
    I: IntoIterator<Item = (&'a str, &'a NormalizedTable)>,
{
    let mut groups: BTreeMap<(&'a str, &'a str), Vec<f64>> = BTreeMap::new();
    for (sensor, table) in tables {
        for row in table {
            groups
                .entry((sensor, row.variable.as_str()))
                .or_default()
                .push(row.value);
        }
    }
    groups
        .into_iter()
        .map(|((sensor, variable), values)| SensorVariableSummary {
            sensor: sensor.to_string(),
            variable: variable.to_string(),
            summary: Summary::from_values(&values),
        })
        .collect()
}
