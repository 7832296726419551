//! Per-machine credential cache under `~/.credentials`.

use std::fs;
use std::path::{Path, PathBuf};

use sheetkit_core::with_quiet_stdout;
use tracing::{debug, info, warn};

use crate::config::{ClientSecret, FlowConfig};
use crate::credential::{Credential, CredentialFile};
use crate::error::{GoogleError, GoogleResult};
use crate::oauth::{ConsentFlow, InstalledAppFlow};

/// Directory name, relative to the home directory, holding cached credentials.
pub const CREDENTIALS_DIR_NAME: &str = ".credentials";

/// A directory of named credential files.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    dir: PathBuf,
}

impl CredentialCache {
    /// Creates a cache rooted at `dir`. Nothing is touched on disk yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns `<home>/.credentials`.
    pub fn default_dir() -> GoogleResult<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CREDENTIALS_DIR_NAME))
            .ok_or_else(|| GoogleError::configuration("could not determine home directory"))
    }

    /// The cache in the current user's home directory.
    pub fn in_home() -> GoogleResult<Self> {
        Ok(Self::new(Self::default_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps a cache file name to its path, creating the cache directory if
    /// it does not exist yet.
    pub fn path_for(&self, cache_file_name: &str) -> GoogleResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            GoogleError::storage(
                format!("failed to create credential directory {}", self.dir.display()),
                e,
            )
        })?;
        let path = self.dir.join(cache_file_name);
        debug!("credential path for {}: {:?}", cache_file_name, path);
        Ok(path)
    }

    fn file_for(&self, cache_file_name: &str) -> GoogleResult<CredentialFile> {
        Ok(CredentialFile::new(self.path_for(cache_file_name)?))
    }

    /// Returns a usable credential for `scopes`, running `flow` when the
    /// cache cannot provide one.
    ///
    /// An expired credential with a refresh token is renewed first; if Google
    /// rejects the refresh the full consent flow runs instead. Whatever was
    /// obtained is written back to the cache.
    pub fn load_or_obtain(
        &self,
        cache_file_name: &str,
        flow: &dyn ConsentFlow,
        scopes: &[String],
    ) -> GoogleResult<Credential> {
        let file = self.file_for(cache_file_name)?;

        let cached = match file.load() {
            Ok(cached) => cached,
            Err(e) if e.code() == crate::GoogleErrorCode::InvalidResponse => {
                warn!("ignoring unreadable credential cache: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        let credential = match cached {
            Some(credential) if !credential.is_invalid() && credential.has_scopes(scopes) => {
                if !credential.is_expired() {
                    debug!("using cached credential from {:?}", file.path());
                    return Ok(credential);
                }
                refresh_or_consent(credential, flow, scopes)?
            }
            Some(_) => {
                info!("cached credential is unusable, requesting consent");
                run_consent(flow, scopes)?
            }
            None => run_consent(flow, scopes)?,
        };

        info!("storing credentials to {}", file.path().display());
        file.save(&credential)?;
        Ok(credential)
    }

    /// Deletes the cached credential and returns the error to hand back to
    /// the caller.
    ///
    /// The result is a `CredentialInvalidated` error, or a storage error if
    /// the file could not be removed. A file that is already gone is fine.
    pub fn invalidate(&self, cache_file_name: &str) -> GoogleError {
        let file = match self.file_for(cache_file_name) {
            Ok(file) => file,
            Err(e) => return e,
        };
        info!("removing credentials from {}", file.path().display());
        match file.remove() {
            Ok(_) => GoogleError::credential_invalidated(format!(
                "removed cached credentials {}, re-authentication required",
                file.path().display()
            )),
            Err(e) => e,
        }
    }
}

fn run_consent(flow: &dyn ConsentFlow, scopes: &[String]) -> GoogleResult<Credential> {
    with_quiet_stdout(|| flow.obtain(scopes))
}

fn refresh_or_consent(
    mut credential: Credential,
    flow: &dyn ConsentFlow,
    scopes: &[String],
) -> GoogleResult<Credential> {
    let Some(refresh_token) = credential.refresh_token.clone() else {
        return run_consent(flow, scopes);
    };

    match flow.refresh(&refresh_token) {
        Ok((access_token, expires_in)) => {
            credential.update_access_token(access_token, expires_in);
            Ok(credential)
        }
        Err(e) if e.is_auth_failure() => {
            warn!("token refresh rejected, requesting consent: {}", e);
            run_consent(flow, scopes)
        }
        Err(e) => Err(e),
    }
}

/// Path of `cache_file_name` in the home credential cache.
pub fn get_credential_path(cache_file_name: &str) -> GoogleResult<PathBuf> {
    CredentialCache::in_home()?.path_for(cache_file_name)
}

/// Loads the cached credential, or runs the installed-app consent flow with
/// the client secret read from `client_secret_file`.
pub fn get_credentials(
    cache_file_name: &str,
    client_secret_file: impl AsRef<Path>,
    scopes: &[String],
    application_name: &str,
    config: &FlowConfig,
) -> GoogleResult<Credential> {
    let cache = CredentialCache::in_home()?;
    let secret = ClientSecret::from_file(client_secret_file)?;
    let flow = InstalledAppFlow::new(secret, application_name, config.clone())?;
    cache.load_or_obtain(cache_file_name, &flow, scopes)
}

/// Removes `cache_file_name` from the home credential cache. Always
/// returns an error: `CredentialInvalidated` on success.
pub fn remove_file_from_cache(cache_file_name: &str) -> GoogleResult<()> {
    Err(CredentialCache::in_home()?.invalidate(cache_file_name))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use chrono::{Duration, Utc};

    use super::*;
    use crate::GoogleErrorCode;

    const DRIVE: &str = "https://www.googleapis.com/auth/drive";
    const SHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";

    /// Consent flow that hands out numbered tokens and counts its calls.
    #[derive(Default)]
    struct FakeFlow {
        obtained: Cell<usize>,
        refreshed: Cell<usize>,
        refresh_error: RefCell<Option<GoogleError>>,
    }

    impl ConsentFlow for FakeFlow {
        fn obtain(&self, scopes: &[String]) -> GoogleResult<Credential> {
            self.obtained.set(self.obtained.get() + 1);
            Ok(Credential::new(
                format!("consent-{}", self.obtained.get()),
                Some("refresh".to_string()),
                Some(3600),
                scopes.to_vec(),
            ))
        }

        fn refresh(&self, _refresh_token: &str) -> GoogleResult<(String, Option<i64>)> {
            self.refreshed.set(self.refreshed.get() + 1);
            match self.refresh_error.borrow_mut().take() {
                Some(e) => Err(e),
                None => Ok(("refreshed".to_string(), Some(3600))),
            }
        }
    }

    fn scopes() -> Vec<String> {
        vec![DRIVE.to_string(), SHEETS.to_string()]
    }

    fn seed(cache: &CredentialCache, name: &str, credential: &Credential) {
        CredentialFile::new(cache.path_for(name).unwrap())
            .save(credential)
            .unwrap();
    }

    #[test]
    fn default_dir_is_under_home() {
        let dir = CredentialCache::default_dir().unwrap();
        assert!(dir.ends_with(CREDENTIALS_DIR_NAME));
        assert_eq!(dir.parent(), dirs::home_dir().as_deref());
    }

    #[test]
    fn home_credential_path() {
        let path = get_credential_path("sheetkit-path-check.json").unwrap();
        assert!(path.ends_with("sheetkit-path-check.json"));
        assert_eq!(
            path.parent(),
            Some(CredentialCache::default_dir().unwrap().as_path())
        );
    }

    #[test]
    fn path_for_creates_directory_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path().join(CREDENTIALS_DIR_NAME));

        let first = cache.path_for("sheets.json").unwrap();
        assert!(first.ends_with("sheets.json"));
        assert!(cache.dir().is_dir());

        let second = cache.path_for("sheets.json").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn path_for_reports_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let err = CredentialCache::new(&blocker).path_for("x.json").unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::StorageError);
    }

    #[test]
    fn missing_cache_runs_flow_once_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        let flow = FakeFlow::default();

        let credential = cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.obtained.get(), 1);
        assert_eq!(credential.access_token, "consent-1");

        let stored = CredentialFile::new(tmp.path().join("sheets.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored, credential);

        let again = cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.obtained.get(), 1);
        assert_eq!(again.access_token, "consent-1");
    }

    #[test]
    fn invalid_cache_runs_flow() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        let mut revoked = Credential::new("old", Some("r".to_string()), Some(3600), scopes());
        revoked.mark_invalid();
        seed(&cache, "sheets.json", &revoked);

        let flow = FakeFlow::default();
        let credential = cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.obtained.get(), 1);
        assert_eq!(flow.refreshed.get(), 0);
        assert!(!credential.invalid);
    }

    #[test]
    fn missing_scope_runs_flow() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        seed(
            &cache,
            "sheets.json",
            &Credential::new("old", None, Some(3600), vec![DRIVE.to_string()]),
        );

        let flow = FakeFlow::default();
        let credential = cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.obtained.get(), 1);
        assert!(credential.has_scopes(&scopes()));
    }

    #[test]
    fn corrupt_cache_is_treated_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        fs::write(cache.path_for("sheets.json").unwrap(), "{ truncated").unwrap();

        let flow = FakeFlow::default();
        cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.obtained.get(), 1);
    }

    #[test]
    fn expired_cache_is_refreshed() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        let mut expired = Credential::new("stale", Some("r".to_string()), None, scopes());
        expired.expires_at = Some(Utc::now() - Duration::minutes(5));
        seed(&cache, "sheets.json", &expired);

        let flow = FakeFlow::default();
        let credential = cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.refreshed.get(), 1);
        assert_eq!(flow.obtained.get(), 0);
        assert_eq!(credential.access_token, "refreshed");
        assert!(!credential.is_expired());

        let stored = CredentialFile::new(tmp.path().join("sheets.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "refreshed");
    }

    #[test]
    fn rejected_refresh_falls_back_to_consent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        let mut expired = Credential::new("stale", Some("r".to_string()), None, scopes());
        expired.expires_at = Some(Utc::now() - Duration::minutes(5));
        seed(&cache, "sheets.json", &expired);

        let flow = FakeFlow::default();
        *flow.refresh_error.borrow_mut() = Some(GoogleError::authentication("invalid_grant"));
        let credential = cache.load_or_obtain("sheets.json", &flow, &scopes()).unwrap();
        assert_eq!(flow.refreshed.get(), 1);
        assert_eq!(flow.obtained.get(), 1);
        assert_eq!(credential.access_token, "consent-1");
    }

    #[test]
    fn refresh_network_error_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        let mut expired = Credential::new("stale", Some("r".to_string()), None, scopes());
        expired.expires_at = Some(Utc::now() - Duration::minutes(5));
        seed(&cache, "sheets.json", &expired);

        let flow = FakeFlow::default();
        *flow.refresh_error.borrow_mut() = Some(GoogleError::network("connection reset"));
        let err = cache
            .load_or_obtain("sheets.json", &flow, &scopes())
            .unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::NetworkError);
        assert_eq!(flow.obtained.get(), 0);
    }

    #[test]
    fn refresh_server_error_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        let mut expired = Credential::new("stale", Some("r".to_string()), None, scopes());
        expired.expires_at = Some(Utc::now() - Duration::minutes(5));
        seed(&cache, "sheets.json", &expired);

        let flow = FakeFlow::default();
        *flow.refresh_error.borrow_mut() = Some(GoogleError::server(
            "token refresh failed (503 Service Unavailable)",
        ));
        let err = cache
            .load_or_obtain("sheets.json", &flow, &scopes())
            .unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::ServerError);
        assert_eq!(flow.refreshed.get(), 1);
        assert_eq!(flow.obtained.get(), 0);

        let stored = CredentialFile::new(tmp.path().join("sheets.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "stale");
    }

    #[test]
    fn invalidate_removes_file_and_signals_reauth() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(tmp.path());
        seed(&cache, "sheets.json", &Credential::new("a", None, None, vec![]));

        let err = cache.invalidate("sheets.json");
        assert!(err.requires_reauth());
        assert!(!tmp.path().join("sheets.json").exists());
        let path = tmp.path().join("sheets.json");
        assert!(err.message().contains(&path.display().to_string()));

        // already gone
        assert!(cache.invalidate("sheets.json").requires_reauth());
    }
}
