use crate::config::AppConfig;
use crate::figure::{build_line_chart, Figure, FigureError};
use crate::region_index::{RegionIndex, UnknownRegion};
use crate::selection::{recompute, SessionError, SessionStore};
use crate::types::{ClimateData, Month, ParseMonthError, ParseStatError, Stat};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub data: ClimateData,
    pub index: RegionIndex,
    pub line_chart: Figure,
    pub sessions: SessionStore,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, data: ClimateData, index: RegionIndex) -> Self {
        // The line chart never changes, so it is built once here
        let line_chart = build_line_chart(&data.annual);
        let sessions = SessionStore::new(config.server.max_sessions);
        Self { data, index, line_chart, sessions, config }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Figure(#[from] FigureError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Month(#[from] ParseMonthError),

    #[error(transparent)]
    Stat(#[from] ParseStatError),

    #[error("click must carry a region or both lat and lon")]
    MissingClickTarget,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Figure(_) | ApiError::Session(_) => StatusCode::NOT_FOUND,
            ApiError::Month(_) | ApiError::Stat(_) | ApiError::MissingClickTarget => {
                StatusCode::BAD_REQUEST
            }
        };
        warn!("{} {}", status, self);
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    session: String,
}

#[derive(Deserialize)]
pub struct ChoroplethParams {
    session: String,
    month: Option<String>,
    stat: Option<String>,
}

#[derive(Deserialize)]
pub struct ClickRequest {
    session: String,
    month: Option<String>,
    stat: Option<String>,
    region: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Deserialize)]
pub struct PointParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct RegionResponse {
    id: String,
    months: Vec<MonthlyValues>,
}

#[derive(Serialize)]
pub struct MonthlyValues {
    month: Month,
    mean: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/months", get(months_handler))
        .route("/api/session", post(session_handler))
        .route("/api/choropleth", get(choropleth_handler))
        .route("/api/click", post(click_handler))
        .route("/api/line", get(line_handler))
        .route("/api/region", get(region_handler))
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: AppState) -> Result<()> {
    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    info!("Starting server on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_month(month: Option<&str>) -> Result<Month, ApiError> {
    Ok(month.map(str::parse::<Month>).transpose()?.unwrap_or_default())
}

fn parse_stat(stat: Option<&str>) -> Result<Stat, ApiError> {
    Ok(stat.map(str::parse::<Stat>).transpose()?.unwrap_or_default())
}

async fn months_handler() -> Json<Vec<&'static str>> {
    Json(Month::ALL.iter().map(|m| m.label()).collect())
}

async fn session_handler(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = state.sessions.create();
    info!("Created session {} ({} active)", session, state.sessions.len());
    Json(SessionResponse { session })
}

async fn choropleth_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChoroplethParams>,
) -> Result<Json<Figure>, ApiError> {
    let month = parse_month(params.month.as_deref())?;
    let stat = parse_stat(params.stat.as_deref())?;
    let selection = state.sessions.selection(&params.session)?;

    let figure = recompute(&state.data, &state.index, &selection, month, stat)?;
    Ok(Json(figure))
}

async fn click_handler(
    State(state): State<Arc<AppState>>,
    Json(click): Json<ClickRequest>,
) -> Result<Json<Figure>, ApiError> {
    let month = parse_month(click.month.as_deref())?;
    let stat = parse_stat(click.stat.as_deref())?;

    let region = match (click.region, click.lat, click.lon) {
        (Some(region), _, _) => {
            if !state.index.contains(&region) {
                return Err(FigureError::from(UnknownRegion(region)).into());
            }
            Some(region)
        }
        (None, Some(lat), Some(lon)) => state.index.locate(lon, lat).map(str::to_string),
        _ => return Err(ApiError::MissingClickTarget),
    };

    // A click outside every region leaves the selection alone
    let selection = match region {
        Some(region) => state.sessions.toggle(&click.session, &region)?,
        None => state.sessions.selection(&click.session)?,
    };

    let figure = recompute(&state.data, &state.index, &selection, month, stat)?;
    Ok(Json(figure))
}

async fn line_handler(State(state): State<Arc<AppState>>) -> Json<Figure> {
    Json(state.line_chart.clone())
}

async fn region_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointParams>,
) -> Json<Option<RegionResponse>> {
    let Some(id) = state.index.locate(params.lon, params.lat) else {
        return Json(None);
    };

    let months = Month::ALL
        .into_iter()
        .map(|month| MonthlyValues {
            month,
            mean: state.data.mean.value(id, month.label()),
            min: state.data.min.value(id, month.label()),
            max: state.data.max.value(id, month.label()),
        })
        .collect();

    Json(Some(RegionResponse { id: id.to_string(), months }))
}
