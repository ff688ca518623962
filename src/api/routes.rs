//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::odds::{OddsResolver, Pacer, Resolution};
use crate::strategy::{recommend, Recommendation, Thresholds};
use crate::types::{CandidateBet, Matchup, OddsQuote};

/// Upper bound on matchups per batch request.
pub const MAX_BATCH: usize = 30;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub resolver: OddsResolver,
    pub thresholds: Thresholds,
    pub started: chrono::DateTime<chrono::Utc>,
}

impl ApiState {
    pub fn new(resolver: OddsResolver, thresholds: Thresholds) -> Self {
        Self {
            resolver,
            thresholds,
            started: chrono::Utc::now(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OddsQuery {
    pub fighter_a: String,
    pub fighter_b: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OddsResponse {
    pub matchup: String,
    #[serde(flatten)]
    pub quote: OddsQuote,
    pub implied_probability_a: f64,
    pub implied_probability_b: f64,
    /// Why earlier tiers did not answer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub misses: Vec<String>,
}

impl OddsResponse {
    fn new(matchup: &Matchup, resolution: Resolution) -> Self {
        let (implied_probability_a, implied_probability_b) =
            resolution.quote.implied_probabilities();
        Self {
            matchup: matchup.to_string(),
            quote: resolution.quote,
            implied_probability_a,
            implied_probability_b,
            misses: resolution.misses.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub matchups: Vec<OddsQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualifyRequest {
    pub bets: Vec<CandidateBet>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub tiers: Vec<String>,
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

fn validate(q: &OddsQuery) -> Result<Matchup, ApiError> {
    let (a, b) = (q.fighter_a.trim(), q.fighter_b.trim());
    if a.is_empty() || b.is_empty() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "fighter_a and fighter_b are required".to_string(),
        ));
    }
    Ok(Matchup::new(a, b))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (chrono::Utc::now() - state.started).num_seconds(),
        tiers: state.resolver.tier_names(),
    })
}

/// GET /api/odds?fighter_a=..&fighter_b=..
pub async fn get_odds(
    State(state): State<AppState>,
    Query(query): Query<OddsQuery>,
) -> Result<Json<OddsResponse>, ApiError> {
    let matchup = validate(&query)?;
    let resolution = state.resolver.resolve_traced(&matchup, &Pacer::unpaced()).await;
    Ok(Json(OddsResponse::new(&matchup, resolution)))
}

/// POST /api/odds/batch
pub async fn post_odds_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<Vec<OddsResponse>>, ApiError> {
    if req.matchups.len() > MAX_BATCH {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            format!("at most {MAX_BATCH} matchups per batch"),
        ));
    }
    let matchups = req.matchups.iter().map(validate).collect::<Result<Vec<_>, _>>()?;

    let resolved = state.resolver.resolve_batch_traced(&matchups).await;
    Ok(Json(
        resolved
            .into_iter()
            .map(|(m, r)| OddsResponse::new(&m, r))
            .collect(),
    ))
}

/// POST /api/qualify
pub async fn post_qualify(
    State(state): State<AppState>,
    Json(req): Json<QualifyRequest>,
) -> Json<Recommendation> {
    let thresholds = req.thresholds.as_ref().unwrap_or(&state.thresholds);
    Json(recommend(&req.bets, thresholds))
}
