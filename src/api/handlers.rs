use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde_json::Value;
use std::time::Instant;

use super::AppState;
use super::error::ApiError;
use super::models::{CompletionResponse, translate};
use crate::data_models::{CompletionRequest, SearchRequest, SearchResponse};
use crate::pagination::search_page;

pub async fn search_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let request: SearchRequest = translate(&body)?;
    let query = request.query.clone();

    let response = search_page(state.retail(), request)
        .await
        .map_err(ApiError::UpstreamSearch)?;

    log::info!(
        "search query={:?} results={} total_size={} took={}ms",
        query,
        response.results.len(),
        response.total_size,
        start.elapsed().as_millis()
    );
    Ok(Json(response))
}

pub async fn autocomplete_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CompletionResponse>, ApiError> {
    let request: CompletionRequest = translate(&body)?;

    let response = state
        .retail()
        .complete_query(&request)
        .await
        .map_err(ApiError::UpstreamCompletion)?;

    Ok(Json(CompletionResponse {
        results: response.completion_results,
    }))
}

pub async fn product_handler(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // resolved against whatever config is live right now
    let name = state.config().current().product_name(&product_id);

    let product = state
        .retail()
        .get_product(&name)
        .await
        .map_err(ApiError::UpstreamCatalog)?;
    Ok(Json(product))
}

pub async fn health_handler() -> &'static str {
    "ok"
}
