//! HTTP server for the glucose dashboard.
//!
//! A thin layer over [`Engine`]: every route maps to one engine call and
//! serializes the result. Engine errors become 400 responses of the form
//! `{"status": "error", "code": ..., "message": ...}`.
//!
//! # Routes
//!
//! ```text
//! GET  /api/get-current-data   refresh active source, return history + range
//! POST /api/set-data-source    {"data_source": "manual" | "device"}
//! POST /api/sensor-data        device push
//! POST /api/update-sensors     manual update
//! POST /api/clear-buffer       {"buffer_name": ...} (defaults to active)
//! GET  /api/download-csv       active history as CSV
//! GET  /api/info               diagnostic snapshot
//! GET  /health
//! ```

use crate::config::Config;
use crate::core::engine::{Diagnostics, Engine, EngineSettings, SourceCounts};
use crate::core::error::EngineError;
use crate::core::range::AxisRange;
use crate::core::report::{self, clock_time, PointRow};
use crate::core::types::{ReadingUpdate, SourceId};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Engine construction options
    pub engine: EngineSettings,
}

impl ServerConfig {
    /// Build from the file/CLI configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let host: IpAddr = config
            .host
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid host '{}': {}", config.host, e))?;
        let engine = EngineSettings {
            timezone: config.tz()?,
            seed: config.seed,
            ..EngineSettings::default()
        };

        Ok(Self {
            host,
            port: config.port,
            engine,
        })
    }

    /// Socket address to bind.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

type SharedEngine = Arc<Engine>;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: String,
    pub message: String,
}

/// An engine error on its way out as a 4xx.
pub struct ApiError(EngineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error",
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Log and count a rejected request.
fn reject(engine: &Engine, error: EngineError) -> ApiError {
    tracing::warn!("Request rejected: {}", error);
    engine.activity().record_rejection();
    ApiError(error)
}

/// Unwrap a JSON body, turning axum's rejection into a counted engine error.
fn json_body(
    engine: &Engine,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<serde_json::Value, ApiError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        reject(
            engine,
            EngineError::MalformedInput {
                field: "body".to_string(),
                reason: rejection.body_text(),
            },
        )
    })
}

/// Live channels plus connection state.
#[derive(Debug, Serialize)]
pub struct SensorValues {
    pub red_signal: f64,
    pub ir_signal: f64,
    pub temperature: f64,
    pub motion: f64,
    pub device_connected: bool,
}

/// Response from the current-data endpoint
#[derive(Debug, Serialize)]
pub struct CurrentDataResponse {
    pub status: &'static str,
    pub data_source: SourceId,
    pub sensor_values: SensorValues,
    pub glucose_data: Vec<PointRow>,
    pub data_count: usize,
    pub y_range: AxisRange,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct SetSourceResponse {
    pub status: &'static str,
    pub message: String,
    pub data_source: SourceId,
    pub counts: SourceCounts,
}

/// Response from both ingestion endpoints
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub message: String,
    pub data_source: SourceId,
    pub buffer_size: usize,
    pub point_added: bool,
    pub device_connected: bool,
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub buffer_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub message: String,
    pub cleared: SourceId,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/info
async fn info(State(engine): State<SharedEngine>) -> Json<Diagnostics> {
    Json(engine.diagnostics())
}

/// GET /api/get-current-data
///
/// Generates a point for the active source when one is due, then returns
/// its history, live readings and axis range.
async fn get_current_data(State(engine): State<SharedEngine>) -> Json<CurrentDataResponse> {
    let data = engine.current_data();
    let tz = engine.timezone();

    Json(CurrentDataResponse {
        status: "success",
        data_source: data.source,
        sensor_values: SensorValues {
            red_signal: data.reading.red_signal,
            ir_signal: data.reading.ir_signal,
            temperature: data.reading.temperature,
            motion: data.reading.motion,
            device_connected: data.device_connected,
        },
        data_count: data.history.len(),
        glucose_data: report::rows(&data.history, tz),
        y_range: data.y_range,
        timestamp: clock_time(data.timestamp, tz),
    })
}

/// POST /api/set-data-source
///
/// A missing or `null` `data_source` selects manual.
async fn set_data_source(
    State(engine): State<SharedEngine>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<SetSourceResponse>, ApiError> {
    let body = json_body(&engine, payload)?;
    let Some(object) = body.as_object() else {
        return Err(reject(
            &engine,
            EngineError::MalformedInput {
                field: "body".to_string(),
                reason: "expected a JSON object".to_string(),
            },
        ));
    };

    let requested = match object.get("data_source") {
        None | Some(serde_json::Value::Null) => "manual".to_string(),
        Some(serde_json::Value::String(name)) => name.clone(),
        Some(other) => other.to_string(),
    };
    let source = engine
        .set_active_source(&requested)
        .map_err(|e| reject(&engine, e))?;

    Ok(Json(SetSourceResponse {
        status: "success",
        message: format!("Switched to {source}"),
        data_source: source,
        counts: engine.counts(),
    }))
}

/// POST /api/sensor-data
///
/// Accepts a device push. Missing channels keep their previous values.
async fn receive_sensor_data(
    State(engine): State<SharedEngine>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let body = json_body(&engine, payload)?;
    let update = ReadingUpdate::from_json(&body).map_err(|e| reject(&engine, e))?;
    let outcome = engine.ingest_device(&update);

    Ok(Json(IngestResponse {
        status: "success",
        message: "Device data received".to_string(),
        data_source: outcome.source,
        buffer_size: outcome.buffer_size,
        point_added: outcome.point_added,
        device_connected: outcome.device_connected,
        timestamp: engine.now().to_rfc3339(),
    }))
}

/// POST /api/update-sensors
async fn update_sensors(
    State(engine): State<SharedEngine>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let body = json_body(&engine, payload)?;
    let update = ReadingUpdate::from_json(&body).map_err(|e| reject(&engine, e))?;
    let outcome = engine.ingest_manual(&update);

    Ok(Json(IngestResponse {
        status: "success",
        message: "Manual sensors updated".to_string(),
        data_source: outcome.source,
        buffer_size: outcome.buffer_size,
        point_added: outcome.point_added,
        device_connected: outcome.device_connected,
        timestamp: engine.now().to_rfc3339(),
    }))
}

/// POST /api/clear-buffer
///
/// The body is optional; without a `buffer_name` the active source is cleared.
async fn clear_buffer(
    State(engine): State<SharedEngine>,
    body: Bytes,
) -> Result<Json<ClearResponse>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ClearRequest::default()
    } else {
        serde_json::from_slice::<ClearRequest>(&body).map_err(|e| {
            reject(
                &engine,
                EngineError::MalformedInput {
                    field: "body".to_string(),
                    reason: e.to_string(),
                },
            )
        })?
    };

    let cleared = engine
        .clear_named(request.buffer_name.as_deref())
        .map_err(|e| reject(&engine, e))?;

    Ok(Json(ClearResponse {
        status: "success",
        message: format!("Cleared {cleared} buffer"),
        cleared,
    }))
}

/// GET /api/download-csv
async fn download_csv(State(engine): State<SharedEngine>) -> Result<Response, ApiError> {
    let export = engine.export_csv().map_err(|e| reject(&engine, e))?;
    tracing::info!(source = %export.source, rows = export.rows, "CSV exported");

    let disposition = format!("attachment; filename=\"{}\"", export.filename());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    )
        .into_response())
}

/// Build the router around an existing engine.
pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/info", get(info))
        .route("/api/get-current-data", get(get_current_data))
        .route("/api/set-data-source", post(set_data_source))
        .route("/api/sensor-data", post(receive_sensor_data))
        .route("/api/update-sensors", post(update_sensors))
        .route("/api/clear-buffer", post(clear_buffer))
        .route("/api/download-csv", get(download_csv))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    HeaderValue::from_static("http://localhost:5000"),
                    HeaderValue::from_static("http://127.0.0.1:5000"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(engine)
}

/// Run the HTTP server around `engine` on `addr`.
///
/// Returns the bound address and a sender that triggers graceful shutdown.
pub async fn run(
    engine: SharedEngine,
    addr: SocketAddr,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(engine);

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Telemetry server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
