use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use index::{GraphOutput, GraphStats, GraphVisualization};
use query::{Answer, ProviderKind, QueryError, Role};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{MetricsSnapshot, TimedOperation};
use crate::state::AppState;

const MAX_QUESTION_CHARS: usize = 2000;
const MAX_TOP_K: usize = 50;
const MAX_VISUALIZE_LIMIT: usize = 500;

fn default_top_k() -> usize {
    10
}

fn default_limit() -> usize {
    100
}

fn check_top_k(top_k: usize) -> ApiResult<()> {
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(ApiError::validation(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let graph = Router::new()
        .route("/upload", post(upload_document))
        .route("/ask", post(ask_question))
        .route("/search", post(search_graph))
        .route("/stats", get(graph_stats))
        .route("/visualize", get(graph_visualization))
        .route("/delete", axum::routing::delete(delete_graph))
        .route("/health", get(health_check))
        .route("/groups", get(list_groups))
        .route("/config", get(get_config).post(update_config))
        .route("/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(state.config().server.max_upload_bytes));

    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .nest("/api/graph", graph)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    state.metrics().record_request(response.status().is_success());
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "graph-rag-api",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/api/graph/health",
    }))
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "pong" }))
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    document_id: String,
    nodes_created: usize,
    edges_created: usize,
    processing_time_seconds: f64,
}

/// POST /api/graph/upload - multipart `file` plus optional `group_id`
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let timer = TimedOperation::start();
    let mut upload = None;
    let mut group_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read file: {}", e)))?;
                upload = Some((filename, data));
            }
            "group_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read group_id: {}", e)))?;
                group_id = Some(text);
            }
            _ => {}
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::validation("Missing multipart field 'file'"))?;
    if filename.is_empty() {
        return Err(ApiError::validation("Uploaded file has no filename"));
    }
    let group_id = state
        .group_or_default(group_id.as_deref())
        .map_err(ApiError::Validation)?;

    // Provider settings must resolve before anything is written
    let snapshot = state.snapshot().await;
    snapshot.resolver().resolve(Role::Generation)?;
    snapshot.resolver().resolve(Role::Embedding)?;

    tracing::info!(
        filename = %filename,
        bytes = data.len(),
        group = %group_id,
        "Processing upload"
    );

    let staged = ingest::stage_document(state.registry(), &group_id, &filename, &data).await?;
    index::prepare_workspace(
        state.registry(),
        &group_id,
        snapshot.resolver(),
        state.config().chunking,
    )
    .await?;

    let stats = GraphOutput::new(state.registry()).stats(&group_id).await?;
    let elapsed = timer.elapsed();
    state.metrics().record_upload(elapsed);
    tracing::info!(
        document_id = %staged.document_id,
        checksum = %staged.checksum,
        group = %group_id,
        elapsed_ms = elapsed.as_millis() as u64,
        "Upload processed"
    );

    Ok(Json(UploadResponse {
        success: true,
        message: format!("Successfully processed {}", filename),
        document_id: staged.document_id,
        nodes_created: stats.total_nodes,
        edges_created: stats.total_edges,
        processing_time_seconds: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
    }))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    group_id: Option<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

/// POST /api/graph/ask - grounded answer for a question
async fn ask_question(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> ApiResult<Json<Answer>> {
    let chars = req.question.chars().count();
    if req.question.trim().is_empty() || chars > MAX_QUESTION_CHARS {
        return Err(ApiError::validation(format!(
            "question must be between 1 and {} characters",
            MAX_QUESTION_CHARS
        )));
    }
    check_top_k(req.top_k)?;
    let group_id = state
        .group_or_default(req.group_id.as_deref())
        .map_err(ApiError::Validation)?;

    let timer = TimedOperation::start();
    let pipeline = state.snapshot().await.pipeline()?;
    let answer = pipeline
        .answer_question(&req.question, Some(group_id.as_str()), req.top_k)
        .await?;

    state
        .metrics()
        .record_ask(timer.elapsed(), answer.is_generation_error());
    tracing::info!(
        group = %group_id,
        sources = answer.sources.len(),
        confidence = answer.confidence,
        "Answer generated"
    );

    Ok(Json(answer))
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    group_id: Option<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

#[derive(Serialize)]
struct SearchHit {
    entity: String,
    #[serde(rename = "type")]
    hit_type: &'static str,
    description: String,
    relationships: Vec<String>,
    score: f32,
}

/// POST /api/graph/search - ranked facts without answer generation
async fn search_graph(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Value>> {
    if params.query.trim().is_empty() {
        return Err(ApiError::validation("query must not be empty"));
    }
    check_top_k(params.top_k)?;
    let group_id = state
        .group_or_default(params.group_id.as_deref())
        .map_err(ApiError::Validation)?;

    let timer = TimedOperation::start();
    let pipeline = state.snapshot().await.pipeline()?;
    let facts = pipeline
        .retriever()
        .search(&params.query, Some(group_id.as_str()), params.top_k)
        .await
        .map_err(QueryError::Retrieval)?;
    state.metrics().record_search(timer.elapsed());

    let results: Vec<SearchHit> = facts
        .into_iter()
        .map(|fact| SearchHit {
            entity: fact.source().to_string(),
            hit_type: "COMMUNITY_REPORT",
            description: fact.description,
            relationships: fact.related_entities,
            score: fact.score,
        })
        .collect();

    tracing::info!(group = %group_id, results = results.len(), "Search complete");
    let count = results.len();
    Ok(Json(json!({ "results": results, "count": count })))
}

#[derive(Deserialize)]
struct GroupParams {
    group_id: Option<String>,
}

/// GET /api/graph/stats
async fn graph_stats(
    State(state): State<AppState>,
    Query(params): Query<GroupParams>,
) -> ApiResult<Json<GraphStats>> {
    let group_id = state
        .group_or_default(params.group_id.as_deref())
        .map_err(ApiError::Validation)?;
    let stats = GraphOutput::new(state.registry()).stats(&group_id).await?;
    tracing::info!(
        nodes = stats.total_nodes,
        edges = stats.total_edges,
        "Graph stats"
    );
    Ok(Json(stats))
}

#[derive(Deserialize)]
struct VisualizeParams {
    group_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

/// GET /api/graph/visualize
async fn graph_visualization(
    State(state): State<AppState>,
    Query(params): Query<VisualizeParams>,
) -> ApiResult<Json<GraphVisualization>> {
    if params.limit == 0 || params.limit > MAX_VISUALIZE_LIMIT {
        return Err(ApiError::validation(format!(
            "limit must be between 1 and {}",
            MAX_VISUALIZE_LIMIT
        )));
    }
    let group_id = state
        .group_or_default(params.group_id.as_deref())
        .map_err(ApiError::Validation)?;

    let data = GraphOutput::new(state.registry())
        .visualization(&group_id, params.limit)
        .await?;
    Ok(Json(data))
}

#[derive(Deserialize)]
struct DeleteRequest {
    group_id: String,
    #[serde(default)]
    confirm: bool,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
    nodes_deleted: usize,
    edges_deleted: usize,
}

/// DELETE /api/graph/delete - remove a group's workspace
async fn delete_graph(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    if !req.confirm {
        return Err(ApiError::validation(
            "Please set 'confirm' to true to delete the graph",
        ));
    }
    index::workspace::validate_group_id(&req.group_id)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    if !state.registry().contains(&req.group_id) {
        return Err(ApiError::GroupNotFound(req.group_id));
    }

    let stats = GraphOutput::new(state.registry()).stats(&req.group_id).await?;
    if !state.registry().remove(&req.group_id).await? {
        return Err(ApiError::GroupNotFound(req.group_id));
    }

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Successfully deleted graph: {}", req.group_id),
        nodes_deleted: stats.total_nodes,
        edges_deleted: stats.total_edges,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    engine_available: bool,
    timestamp: DateTime<Utc>,
}

/// GET /api/graph/health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine_available = tokio::fs::metadata(state.registry().root())
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let status = if engine_available { "healthy" } else { "degraded" };
    tracing::debug!(status, "Health check");

    Json(HealthResponse {
        status,
        engine_available,
        timestamp: Utc::now(),
    })
}

/// GET /api/graph/groups
async fn list_groups(State(state): State<AppState>) -> Json<Value> {
    let groups = state.registry().groups();
    tracing::info!(count = groups.len(), "Listed groups");
    Json(json!({ "groups": groups }))
}

#[derive(Serialize)]
struct ConfigResponse {
    llm_provider: Option<String>,
    embedding_provider: Option<String>,
    llm_model: Option<String>,
    llm_deployment: Option<String>,
    llm_api_key_set: bool,
    embedding_model: Option<String>,
    embedding_deployment: Option<String>,
    embedding_api_key_set: bool,
    azure_endpoint: Option<String>,
    azure_api_version: Option<String>,
    openai_base_url: Option<String>,
    host: String,
    port: u16,
    chunk_size: usize,
    chunk_overlap: usize,
    environment_variables: BTreeMap<String, String>,
}

/// Model (or Azure deployment) and whether a credential is configured.
fn model_view(
    resolver: &query::ProviderResolver,
    role: Role,
) -> (Option<String>, Option<String>, bool) {
    match resolver.resolve(role) {
        Ok(d) if d.kind == ProviderKind::AzureHosted => {
            (None, Some(d.model_or_deployment), !d.credential.is_empty())
        }
        Ok(d) => (Some(d.model_or_deployment), None, !d.credential.is_empty()),
        Err(_) => (None, None, false),
    }
}

/// GET /api/graph/config - configuration with credentials masked
async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let snapshot = state.snapshot().await;
    let settings = snapshot.settings();
    let config = state.config();

    let (llm_model, llm_deployment, llm_api_key_set) =
        model_view(snapshot.resolver(), Role::Generation);
    let (embedding_model, embedding_deployment, embedding_api_key_set) =
        model_view(snapshot.resolver(), Role::Embedding);

    Json(ConfigResponse {
        llm_provider: settings.llm_provider.clone(),
        embedding_provider: settings.embedding_provider.clone(),
        llm_model,
        llm_deployment,
        llm_api_key_set,
        embedding_model,
        embedding_deployment,
        embedding_api_key_set,
        azure_endpoint: settings.azure_openai_endpoint.clone(),
        azure_api_version: settings.azure_openai_api_version.clone(),
        openai_base_url: settings.openai_base_url.clone(),
        host: config.server.host.clone(),
        port: config.server.port,
        chunk_size: config.chunking.size,
        chunk_overlap: config.chunking.overlap,
        environment_variables: settings.masked(),
    })
}

#[derive(Deserialize)]
struct ConfigUpdateRequest {
    #[serde(default)]
    env_vars: HashMap<String, String>,
}

#[derive(Serialize)]
struct ConfigUpdateResponse {
    success: bool,
    message: String,
    updated_vars: Vec<String>,
    ignored_vars: Vec<String>,
    requires_restart: bool,
}

/// POST /api/graph/config - apply provider overrides and rebuild the pipeline
async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigUpdateRequest>,
) -> ApiResult<Json<ConfigUpdateResponse>> {
    if req.env_vars.is_empty() {
        return Err(ApiError::validation("env_vars must not be empty"));
    }

    let (updated_vars, ignored_vars) = state.update_providers(&req.env_vars).await;

    let mut message = format!(
        "Configuration updated successfully. {} variables applied.",
        updated_vars.len()
    );
    if !ignored_vars.is_empty() {
        message.push_str(&format!(" Ignored unknown keys: {}", ignored_vars.join(", ")));
    }
    tracing::info!(
        updated = updated_vars.len(),
        ignored = ignored_vars.len(),
        "Configuration updated"
    );

    Ok(Json(ConfigUpdateResponse {
        success: true,
        message,
        updated_vars,
        ignored_vars,
        requires_restart: false,
    }))
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    requests: MetricsSnapshot,
    cached_embeddings: usize,
}

/// GET /api/graph/metrics
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        requests: state.metrics().snapshot(),
        cached_embeddings: state.embedding_cache().len(),
    })
}
