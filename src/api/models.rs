use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::error::ApiError;
use crate::data_models::{CompletionResult, Validate};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub results: Vec<CompletionResult>,
}

/// Turn a raw request body into a validated request of type `T`.
///
/// The body is parsed regardless of its Content-Type header.
pub fn translate<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
{
    let request: T =
        serde_json::from_slice(body).map_err(|e| ApiError::MalformedRequest(e.to_string()))?;
    request.validate().map_err(ApiError::MalformedRequest)?;
    Ok(request)
}
