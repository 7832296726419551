//! Access check against a Drive folder before any real work starts.

use sheetkit_core::with_quiet_stdout;
use tracing::{debug, warn};

use crate::cache::CredentialCache;
use crate::drive::PermissionLister;
use crate::error::{GoogleError, GoogleResult};

/// Line logged when Drive refuses the folder.
pub const ACCESS_DENIED_MESSAGE: &str = "You don't have permission to access these files.";

/// Lists the permissions on `folder_id` once.
///
/// If Drive refuses (401, 403 or 404) the cached credential `cache_file_name`
/// is deleted and a `CredentialInvalidated` error is returned. Its message
/// starts with [`ACCESS_DENIED_MESSAGE`] and names the removed file; the
/// refusal is kept as its source. Other errors are returned as they are.
pub fn check_access(
    lister: &dyn PermissionLister,
    cache: &CredentialCache,
    folder_id: &str,
    cache_file_name: &str,
) -> GoogleResult<()> {
    match with_quiet_stdout(|| lister.list_permissions(folder_id)) {
        Ok(list) => {
            debug!(
                "folder {} readable, {} permission(s)",
                folder_id,
                list.permissions.len()
            );
            Ok(())
        }
        Err(e) if e.is_auth_failure() => {
            warn!("{}", ACCESS_DENIED_MESSAGE);
            debug!("permission check on {} failed: {}", folder_id, e);
            let invalidated = cache.invalidate(cache_file_name);
            if !invalidated.requires_reauth() {
                return Err(invalidated);
            }
            Err(GoogleError::credential_invalidated(format!(
                "{} ({})",
                ACCESS_DENIED_MESSAGE,
                invalidated.message()
            ))
            .with_source(e))
        }
        Err(e) => Err(e),
    }
}

/// [`check_access`] against the home credential cache.
pub fn check_permissions(
    lister: &dyn PermissionLister,
    folder_id: &str,
    cache_file_name: &str,
) -> GoogleResult<()> {
    check_access(lister, &CredentialCache::in_home()?, folder_id, cache_file_name)
}
