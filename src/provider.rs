//! Dropbox API v2 client: folder listing and file download.

use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt::Write;
use thiserror::Error;

use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("token expired")]
    TokenExpired,
    #[error("Dropbox API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("request to Dropbox failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Listing entry kind from the `.tag` field. Anything that is not a folder
/// is treated as a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    File,
}

impl<'de> Deserialize<'de> for EntryKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "folder" => EntryKind::Folder,
            _ => EntryKind::File,
        })
    }
}

/// One file-or-folder record from the folder listing.
#[derive(Clone, Debug, Deserialize)]
pub struct Entry {
    #[serde(rename = ".tag")]
    pub kind: EntryKind,
    pub name: String,
    #[serde(default)]
    pub path_lower: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Deserialize)]
struct ListFolderResponse {
    entries: Vec<Entry>,
}

#[derive(Clone)]
pub struct DropboxClient {
    http: reqwest::Client,
    api_base: String,
    content_base: String,
}

impl DropboxClient {
    pub fn new(http: reqwest::Client, api_base: &str, content_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            content_base: content_base.trim_end_matches('/').to_string(),
        }
    }

    /// List a folder. The root folder is addressed as `""`.
    pub async fn list_folder(&self, token: &str, path: &str) -> Result<Vec<Entry>, ProviderError> {
        let url = format!("{}/2/files/list_folder", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::TokenExpired);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }
        let data: ListFolderResponse = response.json().await?;
        Ok(data.entries)
    }

    /// Download a file. Every non-401 response is returned as-is so the
    /// caller can forward it (including the 409 folder-without-slash signal).
    pub async fn download(
        &self,
        token: &str,
        path: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/2/files/download", self.content_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg(path))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::TokenExpired);
        }
        Ok(response)
    }
}

/// Build the `Dropbox-API-Arg` header value. Header values must stay within
/// the visible ASCII range, so non-ASCII path characters are `\u`-escaped.
fn api_arg(path: &str) -> String {
    let json = serde_json::json!({ "path": path }).to_string();
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_arg_passes_ascii_through() {
        assert_eq!(api_arg("/docs/report.pdf"), r#"{"path":"/docs/report.pdf"}"#);
    }

    #[test]
    fn api_arg_escapes_non_ascii() {
        assert_eq!(api_arg("/café"), "{\"path\":\"/caf\\u00e9\"}");
        // Characters outside the BMP become surrogate pairs.
        assert_eq!(api_arg("/📁"), "{\"path\":\"/\\ud83d\\udcc1\"}");
    }

    #[test]
    fn entry_tag_maps_to_kind() {
        let folder: Entry =
            serde_json::from_str(r#"{".tag":"folder","name":"docs","path_lower":"/docs"}"#)
                .expect("folder entry");
        assert_eq!(folder.kind, EntryKind::Folder);
        assert_eq!(folder.size, 0);

        let file: Entry = serde_json::from_str(
            r#"{".tag":"file","name":"a.txt","path_lower":"/a.txt","size":42}"#,
        )
        .expect("file entry");
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, 42);
    }

    #[test]
    fn unknown_tags_fall_back_to_file() {
        let entry: Entry =
            serde_json::from_str(r#"{".tag":"deleted","name":"gone","path_lower":"/gone"}"#)
                .expect("deleted entry");
        assert_eq!(entry.kind, EntryKind::File);
    }
}
