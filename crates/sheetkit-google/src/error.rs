//! Error types for credential and Drive operations.

use std::fmt;
use thiserror::Error;

/// The category of a [`GoogleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoogleErrorCode {
    /// Credentials are missing, expired beyond repair, or rejected (401).
    AuthenticationFailed,
    /// The credential lacks permission for the resource (403).
    AuthorizationFailed,
    /// The cached credential was deleted; the caller must re-authenticate.
    CredentialInvalidated,
    /// Connection failed, timed out, DNS resolution, etc.
    NetworkError,
    /// Too many requests (429).
    RateLimited,
    /// Server returned a 5xx status.
    ServerError,
    /// Response body could not be parsed.
    InvalidResponse,
    /// Resource not found, or not visible to this credential (404).
    NotFound,
    /// Request was rejected as malformed (400).
    BadRequest,
    /// Missing or invalid configuration / client secret.
    ConfigurationError,
    /// Credential cache could not be read or written.
    StorageError,
    /// Unexpected internal state.
    InternalError,
}

impl GoogleErrorCode {
    /// Returns a stable snake_case name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::CredentialInvalidated => "credential_invalidated",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Returns true for the status classes Drive uses to refuse access.
    ///
    /// Drive answers 404 for files the caller is not allowed to see, so
    /// `NotFound` counts alongside 401 and 403.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::AuthorizationFailed | Self::NotFound
        )
    }
}

impl fmt::Display for GoogleErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from the credential cache, the consent flow, or a Drive call.
#[derive(Debug, Error)]
pub struct GoogleError {
    code: GoogleErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GoogleError {
    /// Creates a new error with the given code and message.
    pub fn new(code: GoogleErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::AuthorizationFailed, message)
    }

    /// The signal returned after a cached credential has been deleted.
    pub fn credential_invalidated(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::CredentialInvalidated, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::ConfigurationError, message)
    }

    /// Wraps a filesystem failure on the credential cache.
    pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::new(GoogleErrorCode::StorageError, message).with_source(source)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InternalError, message)
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> GoogleErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// See [`GoogleErrorCode::is_auth_failure`].
    pub fn is_auth_failure(&self) -> bool {
        self.code.is_auth_failure()
    }

    /// Returns true if the caller has to run the consent flow again.
    pub fn requires_reauth(&self) -> bool {
        self.code == GoogleErrorCode::CredentialInvalidated
    }
}

impl fmt::Display for GoogleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result alias for this crate.
pub type GoogleResult<T> = Result<T, GoogleError>;
