//! 可选的 HTTP Basic 认证门。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::{middleware, response::Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;

use crate::config::BASIC_CHALLENGE;
use crate::error::ApiError;

/// 认证门配置：未配置用户名密码时全站开放。
#[derive(Debug)]
pub struct AuthGate {
    expected: Option<(String, String)>,
}

impl AuthGate {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            expected: username.zip(password),
        }
    }

    pub fn enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// 校验 `Authorization: Basic` 头。缺失、格式错误或不匹配均为失败；
    /// 未配置凭据时直接放行。
    pub fn check(&self, headers: &HeaderMap) -> bool {
        let Some((user, pass)) = &self.expected else {
            return true;
        };
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((got_user, got_pass)) = credentials.split_once(':') else {
            return false;
        };
        got_user == user && got_pass == pass
    }
}

/// 认证中间件：失败时返回 401 与 Basic 挑战头。
pub async fn auth_middleware(
    Extension(gate): Extension<Arc<AuthGate>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    if gate.check(req.headers()) {
        return Ok(next.run(req).await);
    }
    Err(ApiError::Unauthorized(challenge_headers()))
}

fn challenge_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(BASIC_CHALLENGE),
    );
    headers
}
