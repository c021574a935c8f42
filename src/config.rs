//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com";
pub const DROPBOX_CONTENT_BASE: &str = "https://content.dropboxapi.com";
pub const BASIC_CHALLENGE: &str = r#"Basic realm="Restricted Area""#;
/// Dropbox access tokens live 4 hours; the cache entry lapses earlier so a
/// cached token is rarely already expired when handed out.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 14100;
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "dbx-index", version = VERSION_INFO, about = "Dropbox index server")]
pub struct Args {
    #[arg(
        long,
        env = "DBX_APP_KEY",
        required_unless_present = "access_token",
        help = "Dropbox app key (OAuth2 client id)"
    )]
    pub app_key: Option<String>,
    #[arg(
        long,
        env = "DBX_APP_SECRET",
        required_unless_present = "access_token",
        help = "Dropbox app secret (OAuth2 client secret)"
    )]
    pub app_secret: Option<String>,
    #[arg(
        long,
        env = "DBX_REFRESH_TOKEN",
        required_unless_present = "access_token",
        help = "Long-lived refresh token exchanged for access tokens"
    )]
    pub refresh_token: Option<String>,
    #[arg(
        long,
        env = "DBX_ACCESS_TOKEN",
        help = "Static access token (skips the refresh flow entirely)"
    )]
    pub access_token: Option<String>,
    #[arg(
        long,
        env = "DBX_AUTH_USER",
        help = "Basic auth username (gate enabled only when user and pass are both set)"
    )]
    pub auth_user: Option<String>,
    #[arg(
        long,
        env = "DBX_AUTH_PASS",
        help = "Basic auth password (gate enabled only when user and pass are both set)"
    )]
    pub auth_pass: Option<String>,
    #[arg(
        short = 'b',
        long,
        env = "DBX_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "DBX_PORT",
        default_value_t = 5005,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "DBX_TOKEN_TTL_SECS",
        default_value_t = DEFAULT_TOKEN_TTL_SECS,
        help = "Access token cache TTL in seconds (keep below the token lifetime)"
    )]
    pub token_ttl_secs: u64,
    #[arg(
        long,
        env = "DBX_API_BASE",
        default_value = DROPBOX_API_BASE,
        help = "Dropbox RPC endpoint base URL"
    )]
    pub api_base: String,
    #[arg(
        long,
        env = "DBX_CONTENT_BASE",
        default_value = DROPBOX_CONTENT_BASE,
        help = "Dropbox content endpoint base URL"
    )]
    pub content_base: String,
}
