//! OAuth credential record and its JSON file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GoogleError, GoogleResult};

/// Seconds shaved off the reported lifetime so a token is renewed before
/// Google starts rejecting it.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A cached OAuth credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the tokens were last obtained or refreshed.
    pub last_refresh: DateTime<Utc>,

    /// Set once the credential is known to be unusable (e.g. revoked).
    #[serde(default)]
    pub invalid: bool,
}

impl Credential {
    /// Builds a credential from a token endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(expiry_from_now),
            scopes,
            last_refresh: Utc::now(),
            invalid: false,
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns true if the credential cannot be used or renewed as-is.
    pub fn is_invalid(&self) -> bool {
        self.invalid
            || self.access_token.is_empty()
            || (self.is_expired() && self.refresh_token.is_none())
    }

    /// Returns true if every scope in `required` was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Flags the credential as unusable.
    pub fn mark_invalid(&mut self) {
        self.invalid = true;
    }

    /// Replaces the access token after a refresh.
    pub fn update_access_token(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
    ) {
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(expiry_from_now);
        self.last_refresh = Utc::now();
        self.invalid = false;
    }

    /// Returns the time until the token expires, if known.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }
}

fn expiry_from_now(expires_in_secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in_secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// One credential cache entry on disk.
///
/// Writes go through a temporary file and a rename; on Unix the file is
/// restricted to the owner.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the credential, `Ok(None)` if the file does not exist.
    pub fn load(&self) -> GoogleResult<Option<Credential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no credential file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => {
                return Err(GoogleError::storage(
                    format!("failed to read credential file {}", self.path.display()),
                    e,
                ));
            }
        };

        let credential: Credential = serde_json::from_str(&content).map_err(|e| {
            GoogleError::invalid_response(format!(
                "failed to parse credential file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("loaded credential from {:?}", self.path);
        Ok(Some(credential))
    }

    /// Writes the credential, creating the parent directory if needed.
    pub fn save(&self, credential: &Credential) -> GoogleResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GoogleError::storage(
                    format!("failed to create credential directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let content = serde_json::to_string_pretty(credential)
            .map_err(|e| GoogleError::internal(format!("failed to serialize credential: {}", e)))?;

        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, &content).map_err(|e| {
            GoogleError::storage(
                format!("failed to write credential file {}", temp_path.display()),
                e,
            )
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            GoogleError::storage(
                format!("failed to move credential file into {}", self.path.display()),
                e,
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }

        debug!("saved credential to {:?}", self.path);
        Ok(())
    }

    /// Deletes the file. Returns whether a file was actually removed.
    pub fn remove(&self) -> GoogleResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("removed credential file {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GoogleError::storage(
                format!("failed to remove credential file {}", self.path.display()),
                e,
            )),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
