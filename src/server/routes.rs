//! Request handlers

use super::state::AppState;
use crate::error::RagError;
use crate::types::{
    QueryRequest, QueryResponse, RootResponse, SearchHit, SearchParams, SearchResponse,
    StatsResponse,
};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};

pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: state.title().to_string(),
        status: "running".to_string(),
    })
}

pub async fn health() -> &'static str {
    "OK"
}

/// `POST /query`: retrieve context and answer with the LLM
pub async fn query(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, RagError> {
    let Json(request) = request?;
    tracing::info!(
        "Query ({} results): {}",
        state.client().resolve_k(request.num_results),
        crate::types::preview(&request.question, 80)
    );

    let response = state.client().ask(state.llm(), &request).await?;
    Ok(Json(response))
}

/// `GET /search?q=..&k=..`: similarity search without the LLM
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, RagError> {
    let Query(params) = params?;
    params.validate()?;

    let results = state
        .client()
        .search_filtered(
            &params.q,
            state.client().resolve_k(params.k),
            params.hybrid,
            params.dataset,
        )
        .await?;

    Ok(Json(SearchResponse {
        results: results.iter().map(SearchHit::from).collect(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, RagError> {
    Ok(Json(state.client().stats().await?))
}
