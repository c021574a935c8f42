//! Request dispatch and the directory/file handlers.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::provider::DropboxClient;
use crate::render;
use crate::token::TokenBroker;

/// The sole routing branch: empty path or trailing slash means directory
/// mode, anything else is file mode.
pub fn is_directory_path(path: &str) -> bool {
    path.is_empty() || path.ends_with('/')
}

/// Dropbox addresses the root folder as `""`; any other folder path loses
/// its trailing slash.
fn provider_folder_path(path: &str) -> &str {
    match path {
        "" | "/" => "",
        other => other.strip_suffix('/').unwrap_or(other),
    }
}

fn redirect_target(raw_path: &str) -> String {
    format!("{raw_path}/")
}

/// Fallback handler for every inbound path.
pub async fn dispatch(
    Extension(broker): Extension<Arc<TokenBroker>>,
    Extension(dropbox): Extension<Arc<DropboxClient>>,
    uri: Uri,
) -> Result<Response, ApiError> {
    let raw_path = uri.path().to_string();
    let path = urlencoding::decode(&raw_path)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw_path.clone());

    if is_directory_path(&path) {
        handle_directory(&broker, &dropbox, &path).await
    } else {
        handle_file(&broker, &dropbox, &path, &raw_path).await
    }
}

async fn handle_directory(
    broker: &TokenBroker,
    dropbox: &Arc<DropboxClient>,
    path: &str,
) -> Result<Response, ApiError> {
    let folder = provider_folder_path(path).to_string();
    let entries = broker
        .with_token_retry(|token| {
            let dropbox = Arc::clone(dropbox);
            let folder = folder.clone();
            async move { dropbox.list_folder(&token, &folder).await }
        })
        .await?;
    info!(path, count = entries.len(), "list folder");

    let html = render::directory_page(&entries, path);
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html;charset=UTF-8"),
        )],
        html,
    )
        .into_response())
}

async fn handle_file(
    broker: &TokenBroker,
    dropbox: &Arc<DropboxClient>,
    path: &str,
    raw_path: &str,
) -> Result<Response, ApiError> {
    let download = broker
        .with_token_retry(|token| {
            let dropbox = Arc::clone(dropbox);
            let path = path.to_string();
            async move { dropbox.download(&token, &path).await }
        })
        .await?;

    info!(path, status = %download.status(), "download response");
    file_response(download, raw_path)
}

/// Map the provider's download response: a 409 means a folder was fetched
/// without its trailing slash, so send the browser back into directory mode
/// (the Location stays relative, preserving the origin); everything else is
/// forwarded verbatim.
fn file_response(download: reqwest::Response, raw_path: &str) -> Result<Response, ApiError> {
    if download.status() == StatusCode::CONFLICT {
        debug!(raw_path, "folder requested in file mode, redirecting");
        let location = HeaderValue::from_str(&redirect_target(raw_path))
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
    }
    forward_response(download)
}

/// Forward the provider's status, headers, and byte stream verbatim, without
/// materializing the body.
fn forward_response(upstream: reqwest::Response) -> Result<Response, ApiError> {
    let status = upstream.status();
    let headers = upstream.headers().clone();

    let mut response = Response::builder().status(status);
    if let Some(response_headers) = response.headers_mut() {
        response_headers.extend(headers);
    }
    response
        .body(AxumBody::from_stream(upstream.bytes_stream()))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_slash_terminated_paths_are_directories() {
        assert!(is_directory_path(""));
        assert!(is_directory_path("/"));
        assert!(is_directory_path("/docs/"));
        assert!(!is_directory_path("/docs/report.pdf"));
        assert!(!is_directory_path("/file"));
    }

    #[test]
    fn root_maps_to_empty_provider_path() {
        assert_eq!(provider_folder_path(""), "");
        assert_eq!(provider_folder_path("/"), "");
    }

    #[test]
    fn folder_paths_lose_the_trailing_slash() {
        assert_eq!(provider_folder_path("/docs/"), "/docs");
        assert_eq!(provider_folder_path("/a/b/"), "/a/b");
    }

    #[test]
    fn redirect_appends_trailing_slash() {
        assert_eq!(redirect_target("/docs"), "/docs/");
        assert_eq!(redirect_target("/a/caf%C3%A9"), "/a/caf%C3%A9/");
    }

    fn upstream(status: StatusCode, body: &'static str) -> reqwest::Response {
        let response = axum::http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .expect("upstream response");
        reqwest::Response::from(response)
    }

    #[test]
    fn conflict_download_redirects_to_directory_mode() {
        let response = file_response(upstream(StatusCode::CONFLICT, "path/conflict/"), "/docs")
            .expect("response");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some("/docs/")
        );
    }

    #[test]
    fn non_conflict_download_forwards_status_and_headers() {
        let response =
            file_response(upstream(StatusCode::OK, "bytes"), "/a.txt").expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("application/octet-stream")
        );
        assert!(response.headers().get(header::LOCATION).is_none());
    }
}
