//! Google OAuth credential cache and Drive access checks.
//!
//! - [`CredentialCache`] - named credential files under `~/.credentials`,
//!   loaded, refreshed or obtained through a [`ConsentFlow`]
//! - [`InstalledAppFlow`] - browser consent with PKCE and a loopback redirect
//! - [`check_access`] - verifies a Drive folder is readable, invalidating the
//!   cached credential when it is not
//! - [`GoogleError`] - error type for all of the above
//!
//! # Flow
//!
//! ```text
//! get_credentials ──► CredentialCache ──► cached? ── yes ──► expired? ── yes ──► refresh
//!                                            │                                     │
//!                                            no                                rejected
//!                                            ▼                                     ▼
//!                                      InstalledAppFlow ◄──────────────────────────┘
//!
//! check_permissions ──► DriveClient::list_permissions ── 401/403/404 ──► invalidate
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sheetkit_google::{DriveClient, FlowConfig, check_permissions, get_credentials};
//!
//! let config = FlowConfig::default();
//! let scopes = vec!["https://www.googleapis.com/auth/drive".to_string()];
//! let credential = get_credentials("sheets.json", "client_secret.json", &scopes, "sheetkit", &config)?;
//! let drive = DriveClient::new(&credential, "sheetkit", &config)?;
//! check_permissions(&drive, "folder-id", "sheets.json")?;
//! ```

pub mod cache;
pub mod config;
pub mod credential;
pub mod drive;
pub mod error;
pub mod oauth;
pub mod permissions;

pub use cache::{
    CREDENTIALS_DIR_NAME, CredentialCache, get_credential_path, get_credentials,
    remove_file_from_cache,
};
pub use config::{ClientSecret, FlowConfig};
pub use credential::{Credential, CredentialFile};
pub use drive::{DriveClient, Permission, PermissionList, PermissionLister};
pub use error::{GoogleError, GoogleErrorCode, GoogleResult};
pub use oauth::{ConsentFlow, InstalledAppFlow, PkceFlow};
pub use permissions::{ACCESS_DENIED_MESSAGE, check_access, check_permissions};
