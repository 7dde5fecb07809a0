//! Flux query construction.
//!
//! Only two kinds of values reach the query text: a validated positive day
//! count, formatted as an integer, and names (bucket, measurement, fields) that
//! passed [`check_literal`] when they were configured. Nothing caller-supplied
//! is interpolated as free text.

use serde::Serialize;
use std::fmt;

use crate::error::{InvalidName, PipelineError};
use crate::registry::SensorQuerySpec;

/// Upper bound the dashboard offers for the lookback window. The builder
/// itself only rejects non-positive values.
pub const MAX_LOOKBACK_DAYS: u32 = 30;

/// Rejects names that would need escaping inside a Flux string literal.
pub fn check_literal(kind: &'static str, value: &str) -> Result<(), InvalidName> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains('"') || value.contains('\\') {
        Some("quotes and backslashes are not allowed")
    } else if value.contains('$') {
        Some("`$` would start string interpolation")
    } else if value.chars().any(char::is_control) {
        Some("control characters are not allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(InvalidName {
            kind,
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// A strictly positive number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LookbackDays(i64);

impl LookbackDays {
    /// The window the dashboard opens with.
    pub const DEFAULT: Self = Self(3);

    pub fn new(days: i64) -> Result<Self, PipelineError> {
        if days < 1 {
            return Err(PipelineError::InvalidRange { days });
        }
        Ok(Self(days))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// Name of the storage scope every measurement lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket(String);

impl Bucket {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        check_literal("bucket", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxQuery {
    text: String,
    measurement: String,
    fields: Vec<String>,
    lookback: LookbackDays,
}

impl FluxQuery {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn lookback(&self) -> LookbackDays {
        self.lookback
    }
}

impl fmt::Display for FluxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds the range + measurement + field filter query for one sensor.
///
/// Pure; never touches the network.
pub fn build_query(
    bucket: &Bucket,
    spec: &SensorQuerySpec,
    lookback_days: i64,
) -> Result<FluxQuery, PipelineError> {
    let lookback = LookbackDays::new(lookback_days)?;

    let field_filter = spec
        .fields()
        .iter()
        .map(|field| format!("r._field == \"{field}\""))
        .collect::<Vec<_>>()
        .join(" or ");

    let text = format!(
        "from(bucket: \"{bucket}\")\n    |> range(start: -{days}d)\n    |> filter(fn: (r) => r._measurement == \"{measurement}\")\n    |> filter(fn: (r) => {field_filter})\n",
        bucket = bucket.as_str(),
        days = lookback.get(),
        measurement = spec.measurement(),
    );

    Ok(FluxQuery {
        text,
        measurement: spec.measurement().to_string(),
        fields: spec.fields().to_vec(),
        lookback,
    })
}
