//! Minimal Google Drive v3 client: permission listing only.

use serde::Deserialize;
use tracing::debug;

use crate::config::FlowConfig;
use crate::credential::Credential;
use crate::error::{GoogleError, GoogleResult};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Anything that can list the permissions on a Drive file or folder.
pub trait PermissionLister {
    fn list_permissions(&self, file_id: &str) -> GoogleResult<PermissionList>;
}

/// One access grant on a Drive item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    /// `user`, `group`, `domain` or `anyone`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `owner`, `organizer`, `writer`, `commenter`, `reader`, ...
    pub role: String,
    #[serde(default)]
    pub email_address: Option<String>,
}

/// Response of `permissions.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionList {
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Blocking Drive client authorized with a bearer token.
#[derive(Debug)]
pub struct DriveClient {
    http_client: reqwest::blocking::Client,
    access_token: String,
    base_url: String,
}

impl DriveClient {
    pub fn new(
        credential: &Credential,
        application_name: &str,
        config: &FlowConfig,
    ) -> GoogleResult<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(application_name)
            .build()
            .map_err(|e| {
                GoogleError::internal(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            access_token: credential.access_token.clone(),
            base_url: DRIVE_API_BASE.to_string(),
        })
    }

    /// Points the client at another API root (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn permissions_url(&self, file_id: &str) -> String {
        format!(
            "{}/files/{}/permissions",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(file_id)
        )
    }
}

impl PermissionLister for DriveClient {
    fn list_permissions(&self, file_id: &str) -> GoogleResult<PermissionList> {
        let url = self.permissions_url(file_id);
        debug!("listing permissions: {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GoogleError::network("request timed out")
                } else if e.is_connect() {
                    GoogleError::network(format!("connection failed: {}", e))
                } else {
                    GoogleError::network(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| GoogleError::network(format!("failed to read response: {}", e)))?;

        if let Some(err) = status_error(status, &body) {
            return Err(err);
        }

        parse_permission_list(&body)
    }
}

/// Maps a non-success HTTP status to an error.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> Option<GoogleError> {
    use reqwest::StatusCode;

    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::UNAUTHORIZED => GoogleError::authentication("access token expired or invalid"),
        StatusCode::FORBIDDEN => GoogleError::authorization("access denied to file"),
        StatusCode::NOT_FOUND => GoogleError::not_found("file not found or not shared"),
        StatusCode::TOO_MANY_REQUESTS => GoogleError::rate_limited("rate limit exceeded"),
        StatusCode::BAD_REQUEST => GoogleError::bad_request(format!("bad request: {}", body)),
        _ => GoogleError::server(format!("API error ({}): {}", status, body)),
    })
}

fn parse_permission_list(body: &str) -> GoogleResult<PermissionList> {
    serde_json::from_str(body)
        .map_err(|e| GoogleError::invalid_response(format!("failed to parse response: {}", e)))
}
