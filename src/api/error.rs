use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::models::ErrorBody;
use crate::retail::RetailError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    MalformedRequest(String),

    #[error("search failed: {0}")]
    UpstreamSearch(#[source] RetailError),

    #[error("completion failed: {0}")]
    UpstreamCompletion(#[source] RetailError),

    #[error("product lookup failed: {0}")]
    UpstreamCatalog(#[source] RetailError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamCatalog(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::UpstreamSearch(_)
            | ApiError::UpstreamCompletion(_)
            | ApiError::UpstreamCatalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller; the full error only goes to the log.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::MalformedRequest(msg) => msg.clone(),
            ApiError::UpstreamSearch(e)
            | ApiError::UpstreamCompletion(e)
            | ApiError::UpstreamCatalog(e) => e.client_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::warn!("rejected request ({status}): {self}");
        }
        let body = ErrorBody {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
