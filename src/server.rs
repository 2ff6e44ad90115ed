//! # HTTP service
//!
//! A thin JSON layer over the [`CollectionRegistry`]. Every handler resolves the
//! scope, fetches the collection and runs the (blocking) collection call on
//! tokio's blocking pool.
//!
//! | Method | Path      | Input                                    |
//! |--------|-----------|------------------------------------------|
//! | POST   | `/embed`  | `{scope, doc_id, text, metadata?}`       |
//! | POST   | `/search` | `{scope, query, top_k?}`                 |
//! | POST   | `/delete` | `{scope, doc_id}`                        |
//! | GET    | `/record` | `?scope=&doc_id=`                        |
//! | GET    | `/stats`  | `?scope=` (defaults to `knowledge`)      |
//! | GET    | `/health` |                                          |
//!
//! `/search` records one hit for every result it returns. Invalid scopes are
//! answered with `400`; store and model failures with `500`/`503`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::signal;
use tracing::{error, info};

use crate::collection::{CollectionStats, SearchHit, StoredRecord, VectorCollection};
use crate::error::VectorError;
use crate::registry::CollectionRegistry;
use crate::scope::CollectionKind;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CollectionRegistry>,
    pub default_top_k: usize,
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub scope: String,
    pub doc_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub scope: String,
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub scope: String,
    pub doc_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_scope")]
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub scope: String,
    pub doc_id: String,
}

fn default_scope() -> String {
    CollectionKind::Knowledge.as_str().to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
    pub doc_id: String,
}

impl AckResponse {
    fn ok(doc_id: String) -> Self {
        Self {
            status: "ok".to_string(),
            doc_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub knowledge_count: usize,
    pub memory_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Handler error: a [`VectorError`] or a request that could not be served.
#[derive(Debug)]
pub enum ApiError {
    Vector(VectorError),
    NotFound(String),
    Internal(String),
}

impl From<VectorError> for ApiError {
    fn from(e: VectorError) -> Self {
        ApiError::Vector(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Vector(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, "INVALID_SCOPE", e.to_string())
            }
            ApiError::Vector(e @ VectorError::Initialization(_)) => {
                error!("Embedding model unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "MODEL_UNAVAILABLE", e.to_string())
            }
            ApiError::Vector(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
            }
        };

        let body = ErrorBody {
            error: kind.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Resolve `scope` and run `op` against its collection on the blocking pool.
async fn with_collection<T, F>(state: &AppState, scope: String, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&VectorCollection) -> crate::error::Result<T> + Send + 'static,
{
    let registry = state.registry.clone();
    let out = tokio::task::spawn_blocking(move || {
        let collection = registry.get(&scope)?;
        op(&collection)
    })
    .await??;
    Ok(out)
}

async fn embed(State(state): State<AppState>, Json(req): Json<EmbedRequest>) -> ApiResult<AckResponse> {
    let EmbedRequest {
        scope,
        doc_id,
        text,
        metadata,
    } = req;
    let id = doc_id.clone();
    with_collection(&state, scope, move |c| c.add(&id, &text, metadata)).await?;
    Ok(Json(AckResponse::ok(doc_id)))
}

async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> ApiResult<SearchResponse> {
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    let query = req.query;
    let results = with_collection(&state, req.scope, move |c| c.search_and_record(&query, top_k)).await?;
    Ok(Json(SearchResponse { results }))
}

async fn delete(State(state): State<AppState>, Json(req): Json<DeleteRequest>) -> ApiResult<AckResponse> {
    let id = req.doc_id.clone();
    with_collection(&state, req.scope, move |c| c.delete(&id)).await?;
    Ok(Json(AckResponse::ok(req.doc_id)))
}

async fn record(State(state): State<AppState>, Query(q): Query<RecordQuery>) -> ApiResult<StoredRecord> {
    let id = q.doc_id.clone();
    with_collection(&state, q.scope, move |c| c.get(&id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no record {}", q.doc_id)))
}

async fn stats(State(state): State<AppState>, Query(q): Query<StatsQuery>) -> ApiResult<CollectionStats> {
    let stats = with_collection(&state, q.scope, |c| c.stats()).await?;
    Ok(Json(stats))
}

async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let registry = state.registry.clone();
    let counts = tokio::task::spawn_blocking(move || registry.counts()).await??;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        knowledge_count: counts.knowledge_count,
        memory_count: counts.memory_count,
    }))
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/embed", post(embed))
        .route("/search", post(search))
        .route("/delete", post(delete))
        .route("/record", get(record))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve `state` on `addr` until Ctrl-C or SIGTERM.
pub async fn serve(state: AppState, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("memvault listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("memvault stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let registry = CollectionRegistry::open(dir.path(), testing::shared()).unwrap();
        let state = AppState {
            registry: Arc::new(registry),
            default_top_k: 5,
        };
        (dir, router(state))
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn embed_search_stats_flow() {
        let (_dir, app) = app();

        let (status, body) = call(
            &app,
            post_json("/embed", json!({"scope": "knowledge", "doc_id": "doc1", "text": "hello world"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "doc_id": "doc1"}));

        let (status, body) = call(&app, post_json("/search", json!({"scope": "knowledge", "query": "hello world"}))).await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["id"], "doc1");
        assert_eq!(results[0]["similarity"], 1.0);
        assert_eq!(results[0]["metadata"]["hit_count"], 0);

        let (status, body) = call(&app, get_uri("/stats?scope=knowledge")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["records"][0]["hit_count"], 1);
        assert_ne!(body["records"][0]["last_hit_time"], "");

        let (_, body) = call(&app, get_uri("/health")).await;
        assert_eq!(body, json!({"status": "ok", "knowledge_count": 1, "memory_count": 0}));
    }

    #[tokio::test]
    async fn stats_defaults_to_knowledge() {
        let (_dir, app) = app();
        let (status, body) = call(&app, get_uri("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"total": 0, "records": []}));
    }

    #[tokio::test]
    async fn invalid_scope_is_a_client_error() {
        let (_dir, app) = app();
        let (status, body) = call(
            &app,
            post_json("/embed", json!({"scope": "../knowledge", "doc_id": "x", "text": "t"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_SCOPE");

        let (status, _) = call(&app, post_json("/search", json!({"scope": "team/notes", "query": "q"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, get_uri("/stats?scope=files")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn team_scope_round_trip_and_delete() {
        let (_dir, app) = app();
        let scope = "Core Team/memory";

        call(
            &app,
            post_json(
                "/embed",
                json!({"scope": scope, "doc_id": "a.md", "text": "deploy steps", "metadata": {"owner": "ops"}}),
            ),
        )
        .await;

        let (status, body) = call(&app, get_uri("/record?scope=Core%20Team%2Fmemory&doc_id=a.md")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["document"], "deploy steps");
        assert_eq!(body["metadata"]["owner"], "ops");

        let (status, body) = call(&app, post_json("/delete", json!({"scope": scope, "doc_id": "a.md"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["doc_id"], "a.md");

        let (status, _) = call(&app, post_json("/delete", json!({"scope": scope, "doc_id": "a.md"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, get_uri("/record?scope=Core%20Team%2Fmemory&doc_id=a.md")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");

        let (_, body) = call(&app, get_uri("/health")).await;
        assert_eq!(body["memory_count"], 0);
    }

    #[tokio::test]
    async fn search_honours_top_k() {
        let (_dir, app) = app();
        for i in 0..4 {
            call(
                &app,
                post_json("/embed", json!({"scope": "memory", "doc_id": format!("d{i}"), "text": format!("note {i}")})),
            )
            .await;
        }
        let (_, body) = call(&app, post_json("/search", json!({"scope": "memory", "query": "note", "top_k": 2}))).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 2);

        let (_, body) = call(&app, post_json("/search", json!({"scope": "memory", "query": "note"}))).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let (_dir, app) = app();
        let (status, _) = call(&app, post_json("/embed", json!({"scope": "knowledge"}))).await;
        assert!(status.is_client_error());
    }
}
