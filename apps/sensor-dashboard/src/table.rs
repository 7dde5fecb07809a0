use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedReading {
    pub timestamp: DateTime<Utc>,
    pub variable: String,
    pub value: f64,
}

/// Canonical `(timestamp, variable, value)` rows, in the order the store
/// returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedTable {
    rows: Vec<NormalizedReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// All rows of one variable, in table order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSeries {
    pub variable: String,
    pub points: Vec<SeriesPoint>,
}

impl NormalizedTable {
    pub fn new(rows: Vec<NormalizedReading>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[NormalizedReading] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedReading> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<NormalizedReading> {
        self.rows
    }

    /// Distinct variables in first-appearance order. Not stable across
    /// queries against a changing store.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.variable.as_str()) {
                seen.push(row.variable.as_str());
            }
        }
        seen
    }

    /// Partitions the table by variable, ordered like [`Self::variables`].
    pub fn group_by_variable(&self) -> Vec<VariableSeries> {
        let mut groups: Vec<VariableSeries> = Vec::new();
        for row in &self.rows {
            let point = SeriesPoint {
                timestamp: row.timestamp,
                value: row.value,
            };
            match groups.iter_mut().find(|g| g.variable == row.variable) {
                Some(group) => group.points.push(point),
                None => groups.push(VariableSeries {
                    variable: row.variable.clone(),
                    points: vec![point],
                }),
            }
        }
        groups
    }
}

impl<'a> IntoIterator for &'a NormalizedTable {
    type Item = &'a NormalizedReading;
    type IntoIter = std::slice::Iter<'a, NormalizedReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
