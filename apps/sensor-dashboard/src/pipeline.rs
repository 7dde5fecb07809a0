use crate::error::{PipelineError, SchemaMismatch};
use crate::normalize::normalize;
use crate::query::{build_query, Bucket};
use crate::registry::SensorQuerySpec;
use crate::store::QueryExecutor;
use crate::table::NormalizedTable;

/// Query builder, store executor and normalizer composed for one bucket.
///
/// The executor is injected and owned by whoever builds the pipeline. Every
/// call goes to the store; nothing is cached.
pub struct SensorPipeline<E> {
    executor: E,
    bucket: Bucket,
}

impl<E: QueryExecutor> SensorPipeline<E> {
    pub fn new(executor: E, bucket: Bucket) -> Self {
        Self { executor, bucket }
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Reads the last `lookback_days` days of `spec` as a normalized table.
    ///
    /// An empty table means the store had no recent data. The lookback is
    /// validated before the store is contacted.
    pub async fn run_query(
        &self,
        spec: &SensorQuerySpec,
        lookback_days: i64,
    ) -> Result<NormalizedTable, PipelineError> {
        let query = build_query(&self.bucket, spec, lookback_days)?;
        let outcome = self.executor.execute(&query).await;
        let table = normalize(outcome)?;
        ensure_registered_fields(spec, &table)?;
        Ok(table)
    }
}

fn ensure_registered_fields(
    spec: &SensorQuerySpec,
    table: &NormalizedTable,
) -> Result<(), SchemaMismatch> {
    match table
        .iter()
        .enumerate()
        .find(|(_, row)| !spec.contains_field(&row.variable))
    {
        Some((row, reading)) => Err(SchemaMismatch::UnexpectedField {
            row,
            field: reading.variable.clone(),
            measurement: spec.measurement().to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::error::StoreError;
    use crate::query::FluxQuery;
    use crate::store::{QueryExecutor, QueryResult, RawResultPartition};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) type Canned = Box<dyn Fn() -> Result<QueryResult, StoreError> + Send + Sync>;

    /// Executor returning canned results keyed by measurement.
    #[derive(Default)]
    pub(crate) struct FakeExecutor {
        responses: HashMap<String, Canned>,
        pub(crate) calls: AtomicUsize,
        pub(crate) queries: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(
            mut self,
            measurement: &str,
            response: impl Fn() -> Result<QueryResult, StoreError> + Send + Sync + 'static,
        ) -> Self {
            self.responses
                .insert(measurement.to_string(), Box::new(response));
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl QueryExecutor for FakeExecutor {
        async fn execute(&self, query: &FluxQuery) -> Result<QueryResult, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut queries) = self.queries.lock() {
                queries.push(query.text().to_string());
            }
            match self.responses.get(query.measurement()) {
                Some(response) => response(),
                None => Ok(QueryResult::Many(vec![])),
            }
        }
    }

    pub(crate) fn partition(rows: &[(&str, &str, &str)]) -> RawResultPartition {
        RawResultPartition::new(
            ["", "result", "table", "_time", "_value", "_field", "_measurement"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows.iter()
                .map(|&(time, field, value)| {
                    ["", "_result", "0", time, value, field, "m"]
                        .iter()
                        .map(|c| c.to_string())
                        .collect()
                })
                .collect(),
        )
    }
}
