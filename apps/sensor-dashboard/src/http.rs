use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::dashboard::{
    build_snapshot, no_data_message, DashboardSnapshot, PanelStatus, SUMMARY_EMPTY_NOTE,
};
use crate::error::PipelineError;
use crate::pipeline::SensorPipeline;
use crate::query::LookbackDays;
use crate::registry::{RegisteredSensor, SensorRegistry};
use crate::stats::{describe, SensorVariableSummary, VariableSummary};
use crate::store::QueryExecutor;
use crate::table::NormalizedTable;

pub struct HttpState<E> {
    pub pipeline: Arc<SensorPipeline<E>>,
    pub registry: Arc<SensorRegistry>,
    pub default_lookback_days: u32,
    pub max_lookback_days: u32,
}

impl<E> Clone for HttpState<E> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            registry: self.registry.clone(),
            default_lookback_days: self.default_lookback_days,
            max_lookback_days: self.max_lookback_days,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WindowQuery {
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SensorReadingsResponse {
    sensor: String,
    lookback_days: LookbackDays,
    status: PanelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    variables: Vec<String>,
    readings: NormalizedTable,
    summary: Vec<VariableSummary>,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    lookback_days: LookbackDays,
    rows: Vec<SensorVariableSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

type HttpResult<T> = Result<Json<T>, (StatusCode, String)>;

fn resolve_days<E>(
    state: &HttpState<E>,
    query: &WindowQuery,
    fallback: i64,
) -> Result<i64, (StatusCode, String)> {
    let days = query.days.unwrap_or(fallback);
    if days > i64::from(state.max_lookback_days) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("days must be between 1 and {}", state.max_lookback_days),
        ));
    }
    Ok(days)
}

fn map_pipeline_error(err: PipelineError) -> (StatusCode, String) {
    let status = match &err {
        PipelineError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
        PipelineError::QueryExecution(_) | PipelineError::SchemaMismatch(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    tracing::warn!(error = %err, kind = err.kind(), status = %status, "dashboard request failed");
    (status, err.to_string())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_sensors<E>(State(state): State<HttpState<E>>) -> Json<Vec<RegisteredSensor>> {
    Json(state.registry.iter().cloned().collect())
}

async fn get_dashboard<E: QueryExecutor>(
    State(state): State<HttpState<E>>,
    Query(query): Query<WindowQuery>,
) -> HttpResult<DashboardSnapshot> {
    let days = resolve_days(&state, &query, i64::from(state.default_lookback_days))?;
    let snapshot = build_snapshot(&*state.pipeline, &*state.registry, days)
        .await
        .map_err(map_pipeline_error)?;
    Ok(Json(snapshot))
}

async fn get_sensor_readings<E: QueryExecutor>(
    State(state): State<HttpState<E>>,
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
) -> HttpResult<SensorReadingsResponse> {
    let entry = state
        .registry
        .get(&name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown sensor {name}")))?;
    let days = resolve_days(&state, &query, entry.spec.lookback_days().get())?;
    let lookback = LookbackDays::new(days).map_err(map_pipeline_error)?;

    let table = state
        .pipeline
        .run_query(&entry.spec, lookback.get())
        .await
        .map_err(map_pipeline_error)?;

    let (status, message) = if table.is_empty() {
        (PanelStatus::NoData, Some(no_data_message(&entry.name)))
    } else {
        (PanelStatus::Ready, None)
    };
    let variables = table.variables().into_iter().map(str::to_string).collect();
    let summary = describe(&table);

    Ok(Json(SensorReadingsResponse {
        sensor: entry.name.clone(),
        lookback_days: lookback,
        status,
        message,
        variables,
        readings: table,
        summary,
    }))
}

async fn get_summary<E: QueryExecutor>(
    State(state): State<HttpState<E>>,
    Query(query): Query<WindowQuery>,
) -> HttpResult<SummaryResponse> {
    let days = resolve_days(&state, &query, i64::from(state.default_lookback_days))?;
    let snapshot = build_snapshot(&*state.pipeline, &*state.registry, days)
        .await
        .map_err(map_pipeline_error)?;
    let note = snapshot
        .summary
        .is_empty()
        .then(|| SUMMARY_EMPTY_NOTE.to_string());
    Ok(Json(SummaryResponse {
        lookback_days: snapshot.lookback_days,
        rows: snapshot.summary,
        note,
    }))
}

pub fn router<E: QueryExecutor + 'static>(state: HttpState<E>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/sensors", get(list_sensors::<E>))
        .route("/v1/sensors/{name}/readings", get(get_sensor_readings::<E>))
        .route("/v1/dashboard", get(get_dashboard::<E>))
        .route("/v1/summary", get(get_summary::<E>))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SchemaMismatch, StoreError};
    use crate::pipeline::test_support::{partition, FakeExecutor};
    use crate::query::Bucket;
    use crate::registry::{CLIMATE_MEASUREMENT, MOTION_MEASUREMENT};
    use crate::store::{QueryResult, RawResultPartition};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(executor: FakeExecutor) -> (Router, Arc<SensorPipeline<FakeExecutor>>) {
        app_with_registry(executor, SensorRegistry::builtin())
    }

    fn app_with_registry(
        executor: FakeExecutor,
        registry: SensorRegistry,
    ) -> (Router, Arc<SensorPipeline<FakeExecutor>>) {
        let pipeline = Arc::new(SensorPipeline::new(
            executor,
            Bucket::new("EXTREME_MANUFACTURING").unwrap(),
        ));
        let state = HttpState {
            pipeline: pipeline.clone(),
            registry: Arc::new(registry),
            default_lookback_days: 3,
            max_lookback_days: 30,
        };
        (router(state), pipeline)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
        (status, value)
    }

    fn climate_rows() -> Result<QueryResult, StoreError> {
        Ok(QueryResult::Single(partition(&[
            ("2026-10-18T10:00:00Z", "temperatura", "20.0"),
            ("2026-10-18T10:05:00Z", "temperatura", "22.0"),
            ("2026-10-18T10:00:00Z", "humedad", "50.0"),
        ])))
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (app, _) = app(FakeExecutor::new());
        let resp = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn lists_registered_sensors() {
        let (app, _) = app(FakeExecutor::new());
        let (status, body) = get_json(app, "/v1/sensors").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "DHT22");
        assert_eq!(body[0]["family"], "climate");
        assert_eq!(body[1]["spec"]["measurement"], "mpu6050");
        assert_eq!(body[1]["spec"]["fields"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn dashboard_uses_default_window() {
        let executor = FakeExecutor::new().respond(CLIMATE_MEASUREMENT, climate_rows);
        let (app, pipeline) = app(executor);

        let (status, body) = get_json(app, "/v1/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lookback_days"], 3);
        assert_eq!(body["panels"][0]["status"], "ready");
        assert_eq!(body["panels"][1]["status"], "no_data");
        assert_eq!(body["summary"][0]["variable"], "humedad");
        assert!(body["summary"][0]["std"].is_null());
        assert_eq!(body["summary"][1]["mean"], 21.0);

        let queries = pipeline.executor().queries.lock().unwrap();
        assert!(queries.iter().all(|q| q.contains("range(start: -3d)")));
    }

    #[tokio::test]
    async fn window_above_maximum_is_rejected() {
        let (app, pipeline) = app(FakeExecutor::new());
        let (status, _) = get_json(app, "/v1/dashboard?days=31").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(pipeline.executor().call_count(), 0);
    }

    #[tokio::test]
    async fn non_positive_window_is_an_invalid_range() {
        let (app, pipeline) = app(FakeExecutor::new());
        let (status, body) = get_json(app.clone(), "/v1/dashboard?days=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.as_str().unwrap().contains("positive"));

        let (status, _) = get_json(app, "/v1/sensors/dht22/readings?days=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(pipeline.executor().call_count(), 0);
    }

    #[tokio::test]
    async fn sensor_readings_are_normalized() {
        let executor = FakeExecutor::new().respond(CLIMATE_MEASUREMENT, climate_rows);
        let (app, _) = app(executor);

        let (status, body) = get_json(app, "/v1/sensors/DHT22/readings?days=7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sensor"], "DHT22");
        assert_eq!(body["lookback_days"], 7);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["variables"], serde_json::json!(["temperatura", "humedad"]));
        assert_eq!(body["readings"].as_array().unwrap().len(), 3);
        assert_eq!(body["readings"][0]["variable"], "temperatura");
        assert_eq!(body["readings"][0]["value"], 20.0);
        assert_eq!(body["summary"][1]["count"], 2);
    }

    #[tokio::test]
    async fn empty_sensor_reports_no_data() {
        let executor =
            FakeExecutor::new().respond(MOTION_MEASUREMENT, || Ok(QueryResult::Many(vec![])));
        let (app, _) = app(executor);

        let (status, body) = get_json(app, "/v1/sensors/mpu6050/readings?days=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "no_data");
        assert_eq!(body["message"], "No recent data for MPU6050.");
        assert!(body["readings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sensor_readings_default_to_the_sensor_window() {
        let executor = FakeExecutor::new().respond(CLIMATE_MEASUREMENT, climate_rows);
        let registry =
            SensorRegistry::builtin().with_default_lookback(LookbackDays::new(5).unwrap());
        let (app, pipeline) = app_with_registry(executor, registry);

        let (status, body) = get_json(app, "/v1/sensors/dht22/readings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lookback_days"], 5);

        let queries = pipeline.executor().queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("range(start: -5d)"));
    }

    #[tokio::test]
    async fn unknown_sensor_is_not_found() {
        let (app, _) = app(FakeExecutor::new());
        let (status, _) = get_json(app, "/v1/sensors/bme280/readings").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn schema_mismatch_is_a_bad_gateway() {
        let executor = FakeExecutor::new().respond(CLIMATE_MEASUREMENT, || {
            Ok(QueryResult::Single(RawResultPartition::new(
                vec!["_time".to_string(), "_field".to_string()],
                vec![vec!["2026-10-18T10:00:00Z".to_string(), "humedad".to_string()]],
            )))
        });
        let (app, _) = app(executor);

        let (status, body) = get_json(app, "/v1/sensors/dht22/readings").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let expected = SchemaMismatch::MissingColumn {
            partition: 0,
            column: "_value",
        }
        .to_string();
        assert!(body.as_str().unwrap().contains(&expected));
    }

    #[tokio::test]
    async fn summary_without_data_has_a_note() {
        let (app, _) = app(FakeExecutor::new());
        let (status, body) = get_json(app, "/v1/summary?days=2").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["rows"].as_array().unwrap().is_empty());
        assert_eq!(body["note"], SUMMARY_EMPTY_NOTE);
    }
}
