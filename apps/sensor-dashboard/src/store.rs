//! Boundary to the time-series store.
//!
//! The pipeline only sees [`QueryExecutor`]; [`InfluxClient`] is the InfluxDB
//! v2 implementation wired up by the binary.

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use url::Url;

use crate::error::StoreError;
use crate::query::FluxQuery;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// One result table as returned by the store, untyped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultPartition {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawResultPartition {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<String>>) {
        (self.columns, self.rows)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A store answers one logical query with either one result set or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Single(RawResultPartition),
    Many(Vec<RawResultPartition>),
}

impl QueryResult {
    pub fn from_partitions(mut partitions: Vec<RawResultPartition>) -> Self {
        if partitions.len() == 1 {
            if let Some(only) = partitions.pop() {
                return Self::Single(only);
            }
        }
        Self::Many(partitions)
    }

    /// Partitions in the order the store returned them.
    pub fn into_partitions(self) -> Vec<RawResultPartition> {
        match self {
            Self::Single(partition) => vec![partition],
            Self::Many(partitions) => partitions,
        }
    }
}

/// Runs a query against the store. Connection lifecycle, pooling and retry
/// policy belong to the implementor.
pub trait QueryExecutor: Send + Sync {
    fn execute(
        &self,
        query: &FluxQuery,
    ) -> impl Future<Output = Result<QueryResult, StoreError>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Dialect {
    header: bool,
    annotations: Vec<&'static str>,
    delimiter: &'static str,
    comment_prefix: &'static str,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            annotations: Vec::new(),
            delimiter: ",",
            comment_prefix: "#",
        }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    dialect: Dialect,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct InfluxClient {
    http: Client,
    query_url: Url,
    token: String,
}

impl InfluxClient {
    pub fn new(
        http: Client,
        base_url: &str,
        token: impl Into<String>,
        org: &str,
    ) -> Result<Self, url::ParseError> {
        let mut query_url = Url::parse(&format!(
            "{}/api/v2/query",
            base_url.trim().trim_end_matches('/')
        ))?;
        query_url.query_pairs_mut().append_pair("org", org);
        Ok(Self {
            http,
            query_url,
            token: token.into(),
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }
}

impl QueryExecutor for InfluxClient {
    async fn execute(&self, query: &FluxQuery) -> Result<QueryResult, StoreError> {
        tracing::debug!(
            measurement = query.measurement(),
            lookback_days = query.lookback().get(),
            "executing flux query"
        );

        let request = QueryRequest {
            query: query.text(),
            kind: "flux",
            dialect: Dialect::default(),
        };
        let response = self
            .http
            .post(self.query_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(ACCEPT, "application/csv")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthorized {
                status,
                body: error_message(&body),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status,
                body: error_message(&body),
            });
        }

        let partitions = parse_csv_partitions(&body)?;
        tracing::debug!(
            measurement = query.measurement(),
            partitions = partitions.len(),
            rows = partitions.iter().map(RawResultPartition::len).sum::<usize>(),
            "flux query returned"
        );
        Ok(QueryResult::from_partitions(partitions))
    }
}

fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.message;
    }
    body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Splits a Flux CSV response into one partition per header block.
///
/// Blocks are separated by blank lines outside quoted cells; `#` annotation
/// lines are skipped. A block shaped `,error,reference` is an in-band query
/// failure.
pub fn parse_csv_partitions(body: &str) -> Result<Vec<RawResultPartition>, StoreError> {
    let mut partitions = Vec::new();

    for block in split_blocks(body) {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(block.as_bytes());

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        if columns.iter().all(String::is_empty) {
            continue;
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let partition = RawResultPartition::new(columns, rows);
        if let Some(err) = flux_error(&partition) {
            return Err(err);
        }
        partitions.push(partition);
    }

    Ok(partitions)
}

fn split_blocks(body: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    // A quoted cell may span lines, including blank ones.
    let mut in_quotes = false;
    for line in body.lines() {
        if !in_quotes && line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        if (in_quotes || !line.starts_with('#')) && line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
        current.push_str(line.trim_end_matches('\r'));
        current.push('\n');
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn flux_error(partition: &RawResultPartition) -> Option<StoreError> {
    let error_idx = partition.column_index("error")?;
    if partition.column_index("_value").is_some() {
        return None;
    }
    let reference_idx = partition.column_index("reference");
    let first = partition.rows().first();
    let message = first
        .and_then(|row| row.get(error_idx))
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "unknown flux error".to_string());
    let reference = first
        .zip(reference_idx)
        .and_then(|(row, idx)| row.get(idx))
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    Some(StoreError::Flux { message, reference })
}
