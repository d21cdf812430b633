//! HTTP endpoints for the dreamlens server using axum.
//!
//! Endpoints:
//! - POST /llm                      - classify a dream (form field `dream`)
//! - GET  /metrics                  - prometheus text exposition
//! - GET  /get_bar_data             - archetype counts of the reference dataset
//! - GET  /get_doughnut_data        - archetypes of the nearest reference dreams
//! - GET  /get_time_series_data     - synthetic monthly trend per archetype
//! - GET  /get_rarity_score         - rarity of the current (or given) archetype
//! - GET  /get_resources/:archetype - reading list for an archetype
//! - GET  /history                  - recent classifications, newest first
//! - GET  /health                   - liveness

use std::any::Any;
use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use dreamlens_core::services::analytics::{ChartData, RarityScore, TimeSeriesData};
use dreamlens_core::services::classifier::PayloadField;
use dreamlens_core::services::history::HistoryEntry;
use dreamlens_core::services::resources::ResourceBundle;
use dreamlens_core::Commands;

use crate::error::ServerError;
use crate::middleware::track_metrics;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<Commands>,
}

impl AppState {
    pub fn new(commands: Arc<Commands>) -> Self {
        Self { commands }
    }
}

/// Build the axum router with all endpoints.
///
/// Layer order, outermost first: HTTP trace span, metrics, panic catcher. The
/// metrics layer sits outside the panic catcher so a panicking handler is
/// recorded as a 500.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/llm", post(llm))
        .route("/metrics", get(metrics))
        .route("/get_bar_data", get(bar_data))
        .route("/get_doughnut_data", get(doughnut_data))
        .route("/get_time_series_data", get(time_series_data))
        .route("/get_rarity_score", get(rarity_score))
        .route("/get_resources/:archetype", get(resources))
        .route("/history", get(history))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.clone(), track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Request types ───────────────────────────────────────────────────

/// The `dream` field of either a urlencoded or a multipart form.
#[derive(Debug)]
pub struct DreamForm {
    pub dream: String,
}

#[derive(Deserialize)]
struct UrlEncodedDream {
    #[serde(default)]
    dream: String,
}

#[axum::async_trait]
impl<S> FromRequest<S> for DreamForm
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ServerError::BadRequest(e.body_text()))?;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ServerError::BadRequest(e.body_text()))?
            {
                if field.name() == Some("dream") {
                    let dream = field
                        .text()
                        .await
                        .map_err(|e| ServerError::BadRequest(e.body_text()))?;
                    return Ok(Self { dream });
                }
            }
            return Ok(Self {
                dream: String::new(),
            });
        }

        let Form(body) = Form::<UrlEncodedDream>::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        Ok(Self { dream: body.dream })
    }
}

#[derive(Deserialize)]
pub struct RarityQuery {
    pub archetype: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn llm(
    State(state): State<AppState>,
    form: DreamForm,
) -> Result<Json<Vec<PayloadField>>, ServerError> {
    let commands = Arc::clone(&state.commands);
    let result =
        tokio::task::spawn_blocking(move || commands.submit_dream(&form.dream)).await??;
    Ok(Json(result.flatten()))
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ServerError> {
    let body = state.commands.metrics_text()?;
    let content_type = state.commands.metrics().content_type();
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn bar_data(State(state): State<AppState>) -> Json<ChartData> {
    Json(state.commands.bar_data())
}

/// Empty chart until a dream has been classified; 503 if the store never loaded.
async fn doughnut_data(State(state): State<AppState>) -> Result<Json<ChartData>, ServerError> {
    let chart = state.commands.doughnut_data()?;
    Ok(Json(chart.unwrap_or_else(ChartData::empty)))
}

async fn time_series_data(State(state): State<AppState>) -> Json<TimeSeriesData> {
    Json(state.commands.time_series_data())
}

async fn rarity_score(
    State(state): State<AppState>,
    Query(q): Query<RarityQuery>,
) -> Result<Json<RarityScore>, ServerError> {
    state
        .commands
        .rarity_score(q.archetype.as_deref())
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("no dream has been classified yet".into()))
}

async fn resources(
    State(state): State<AppState>,
    Path(archetype): Path<String>,
) -> Result<Json<Vec<ResourceBundle>>, ServerError> {
    let commands = Arc::clone(&state.commands);
    let bundles = tokio::task::spawn_blocking(move || commands.resources(&archetype)).await?;
    Ok(Json(bundles))
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<HistoryEntry>> {
    Json(state.commands.history(q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "vector_store": state.commands.store_error().is_none(),
    }))
}

async fn not_found() -> ServerError {
    ServerError::NotFound("no such endpoint".into())
}

fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("request handler panicked");
    ServerError::Internal("handler panicked".into()).into_response()
}
