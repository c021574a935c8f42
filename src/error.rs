//! 统一的 API 错误类型与转换。

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::provider::ProviderError;
use crate::token::TokenError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(HeaderMap),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(headers) => {
                (StatusCode::UNAUTHORIZED, headers, "Unauthorized").into_response()
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {msg}")).into_response()
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        ApiError::Internal(error.to_string())
    }
}
