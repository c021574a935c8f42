//! dbx-index server binary.
//!
//! Serves a Dropbox account as a browsable website: directory URLs render an
//! HTML listing, file URLs stream the file's bytes straight from Dropbox.
//! The main entry point wires the token broker, the Dropbox client, and the
//! optional Basic auth gate into an Axum router and starts the listener.

mod auth;
mod browse;
mod config;
mod error;
mod http;
mod logging;
mod provider;
mod render;
mod token;

use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::auth::AuthGate;
use crate::config::Args;
use crate::provider::DropboxClient;
use crate::token::{MemoryTokenCache, OauthRefresher, StaticToken, TokenBroker, TokenSource};

shadow!(build);

/// Starts the dbx-index server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let outbound = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config::CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let source: Box<dyn TokenSource> = if let Some(access_token) = args.access_token.clone() {
        info!("using static access token, refresh flow disabled");
        Box::new(StaticToken::new(access_token))
    } else {
        let (Some(app_key), Some(app_secret), Some(refresh_token)) = (
            args.app_key.clone(),
            args.app_secret.clone(),
            args.refresh_token.clone(),
        ) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "refresh flow requires app key, app secret and refresh token",
            ));
        };
        let token_url = format!("{}/oauth2/token", args.api_base.trim_end_matches('/'));
        Box::new(OauthRefresher::new(
            outbound.clone(),
            token_url,
            refresh_token,
            app_key,
            app_secret,
        ))
    };
    let broker = Arc::new(TokenBroker::new(
        Box::new(MemoryTokenCache::new()),
        source,
        Duration::from_secs(args.token_ttl_secs),
    ));
    let dropbox = Arc::new(DropboxClient::new(
        outbound,
        &args.api_base,
        &args.content_base,
    ));
    let gate = Arc::new(AuthGate::new(args.auth_user.clone(), args.auth_pass.clone()));
    if gate.enabled() {
        info!("basic auth gate enabled");
    }

    let app = Router::new()
        .fallback(browse::dispatch)
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(broker))
        .layer(Extension(dropbox))
        .layer(Extension(gate));

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("🚀 Starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
