use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use linkrank_core::{DocId, Error, RankConfig, RankSummary, SearchEngine, SearchHit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub query: String,
    pub candidates: Vec<String>,
    pub selected: String,
}

#[derive(Deserialize)]
pub struct PersonalizedRequest {
    pub query: String,
    pub candidates: Vec<String>,
}

#[derive(Serialize)]
pub struct Activation {
    pub url: String,
    pub activation: f64,
}

#[derive(Serialize)]
pub struct PersonalizedResponse {
    pub results: Vec<Activation>,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub url: String,
    pub indexed: bool,
    pub word_count: u32,
    pub rank: Option<f64>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub admin_token: Option<String>,
}

/// Router over `engine`, with the admin token and CORS origins taken from the environment.
pub fn build_app(engine: SearchEngine) -> Router {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    router(AppState { engine: Arc::new(engine), admin_token })
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/feedback", post(feedback_handler))
        .route("/personalized", post(personalized_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/admin/rank", post(rank_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn api_error(err: Error) -> ApiError {
    match err {
        Error::UnknownDocument { .. } | Error::SelectionNotCandidate { .. } | Error::Config(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        Error::TrainingContended { .. } => (StatusCode::CONFLICT, err.to_string()),
        other => {
            tracing::error!(error = %other, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let (results, total_hits) = state.engine.search(&params.q, k).map_err(api_error)?;
    Ok(Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), total_hits, results }))
}

pub async fn feedback_handler(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
    state.engine.submit_feedback(&req.query, &req.candidates, &req.selected).map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn personalized_handler(
    State(state): State<AppState>,
    Json(req): Json<PersonalizedRequest>,
) -> Result<Json<PersonalizedResponse>, ApiError> {
    let results = state
        .engine
        .personalized_query(&req.query, &req.candidates)
        .map_err(api_error)?
        .into_iter()
        .map(|(url, activation)| Activation { url, activation })
        .collect();
    Ok(Json(PersonalizedResponse { results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocResponse>, ApiError> {
    let store = state.engine.store();
    let doc = store
        .document(doc_id)
        .map_err(api_error)?
        .ok_or((StatusCode::NOT_FOUND, "not found".to_string()))?;
    let rank = store.rank(doc_id).map_err(api_error)?;
    Ok(Json(DocResponse { doc_id, url: doc.url, indexed: doc.indexed, word_count: doc.word_count, rank }))
}

/// Rebuild PageRank on the blocking pool. An empty body uses the configured defaults.
async fn rank_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<RankSummary>, ApiError> {
    authorize(&state, &headers)?;
    let config: RankConfig = if body.iter().all(u8::is_ascii_whitespace) {
        state.engine.config().rank
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid rank config: {e}")))?
    };
    config.validate().map_err(api_error)?;

    let engine = state.engine.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let summary = engine.rebuild_rank(&config)?;
        let at = time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default();
        engine.store().put_meta("last_rank_at", &at)?;
        Ok::<_, Error>(summary)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("rank task failed: {e}")))?
    .map_err(api_error)?;
    Ok(Json(summary))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
