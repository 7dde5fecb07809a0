//! Projection of raw store partitions onto [`NormalizedTable`].
//!
//! Partitions are concatenated in the order they were returned, never
//! re-sorted. An empty concatenation is a successful empty table. Anything
//! that does not fit the `_time` / `_field` / `_value` schema rejects the whole
//! table.

use chrono::{DateTime, Utc};

use crate::error::{PipelineError, SchemaMismatch, StoreError};
use crate::store::{QueryResult, RawResultPartition};
use crate::table::{NormalizedReading, NormalizedTable};

pub const TIME_COLUMN: &str = "_time";
pub const FIELD_COLUMN: &str = "_field";
pub const VALUE_COLUMN: &str = "_value";

/// Normalizes the outcome of one store call. Executor failures become
/// [`PipelineError::QueryExecution`] with the cause attached.
pub fn normalize(
    outcome: Result<QueryResult, StoreError>,
) -> Result<NormalizedTable, PipelineError> {
    let result = outcome.map_err(PipelineError::QueryExecution)?;
    normalize_partitions(result.into_partitions())
}

pub fn normalize_partitions(
    partitions: Vec<RawResultPartition>,
) -> Result<NormalizedTable, PipelineError> {
    let total: usize = partitions.iter().map(RawResultPartition::len).sum();
    if total == 0 {
        return Ok(NormalizedTable::empty());
    }

    let mut readings = Vec::with_capacity(total);
    let mut row_number = 0usize;
    for (partition_idx, partition) in partitions.into_iter().enumerate() {
        if partition.is_empty() {
            continue;
        }
        let layout = ColumnLayout::resolve(partition_idx, &partition)?;
        let (_, rows) = partition.into_parts();
        for raw in rows {
            readings.push(layout.project(row_number, raw)?);
            row_number += 1;
        }
    }

    Ok(NormalizedTable::new(readings))
}

/// Parses a store timestamp. Values without an explicit offset are rejected.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    time: usize,
    field: usize,
    value: usize,
}

impl ColumnLayout {
    fn resolve(
        partition_idx: usize,
        partition: &RawResultPartition,
    ) -> Result<Self, SchemaMismatch> {
        let find = |column: &'static str| {
            partition
                .column_index(column)
                .ok_or(SchemaMismatch::MissingColumn {
                    partition: partition_idx,
                    column,
                })
        };
        Ok(Self {
            time: find(TIME_COLUMN)?,
            field: find(FIELD_COLUMN)?,
            value: find(VALUE_COLUMN)?,
        })
    }

    fn width(&self) -> usize {
        self.time.max(self.field).max(self.value) + 1
    }

    fn project(
        &self,
        row: usize,
        mut raw: Vec<String>,
    ) -> Result<NormalizedReading, SchemaMismatch> {
        if raw.len() < self.width() {
            return Err(SchemaMismatch::ShortRow {
                row,
                len: raw.len(),
                expected: self.width(),
            });
        }

        let raw_time = &raw[self.time];
        let timestamp = parse_timestamp(raw_time).ok_or_else(|| SchemaMismatch::InvalidTimestamp {
            row,
            value: raw_time.clone(),
        })?;

        let raw_value = &raw[self.value];
        let value = raw_value
            .trim()
            .parse::<f64>()
            .map_err(|_| SchemaMismatch::InvalidValue {
                row,
                value: raw_value.clone(),
            })?;

        Ok(NormalizedReading {
            timestamp,
            variable: std::mem::take(&mut raw[self.field]),
            value,
        })
    }
}
