//! Interactive OAuth 2.0 consent flow for installed applications.
//!
//! Authorization Code flow with PKCE over a loopback redirect:
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Bind a local HTTP listener on the first free port of the configured range
//! 3. Open the browser on Google's consent page (or print the URL to stderr)
//! 4. Receive the redirect carrying the authorization code
//! 5. Exchange code + verifier for access and refresh tokens
//!
//! Everything here is blocking. The redirect is awaited on a helper thread so
//! the wait can time out.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::{ClientSecret, FlowConfig};
use crate::credential::Credential;
use crate::drive::status_error;
use crate::error::{GoogleError, GoogleResult};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// PKCE verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Something that can obtain a brand new credential from the user.
pub trait ConsentFlow {
    /// Runs the authorization and returns the granted credential.
    fn obtain(&self, scopes: &[String]) -> GoogleResult<Credential>;

    /// Renews an access token. Returns the new token and its lifetime.
    fn refresh(&self, refresh_token: &str) -> GoogleResult<(String, Option<i64>)>;
}

/// Loopback PKCE flow against Google's OAuth endpoints.
#[derive(Debug)]
pub struct InstalledAppFlow {
    secret: ClientSecret,
    config: FlowConfig,
    http_client: reqwest::blocking::Client,
}

impl InstalledAppFlow {
    /// Creates the flow. `application_name` is sent as the user agent.
    pub fn new(
        secret: ClientSecret,
        application_name: &str,
        config: FlowConfig,
    ) -> GoogleResult<Self> {
        secret
            .validate()
            .map_err(|e| GoogleError::configuration(format!("invalid client secret: {}", e)))?;
        config.validate().map_err(GoogleError::configuration)?;

        let http_client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(application_name)
            .build()
            .map_err(|e| {
                GoogleError::internal(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            secret,
            config,
            http_client,
        })
    }

    fn redirect_uri(&self, port: u16) -> String {
        format!("http://{}:{}/callback", self.config.auth_host_name, port)
    }

    /// Tries each port of the configured range in order.
    fn bind_loopback_server(&self) -> GoogleResult<(TcpListener, u16)> {
        let (first, last) = self.config.auth_host_port_range;
        for port in first..=last {
            if let Ok(listener) =
                TcpListener::bind((self.config.auth_host_name.as_str(), port))
            {
                debug!("bound loopback server on port {}", port);
                return Ok((listener, port));
            }
        }
        Err(GoogleError::configuration(format!(
            "no available port in range {}-{}",
            first, last
        )))
    }

    /// Waits for the redirect and returns `(code, state)`.
    fn wait_for_callback(&self, listener: TcpListener) -> GoogleResult<(String, String)> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = handle_callback(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        });

        match rx.recv_timeout(self.config.callback_timeout()) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(GoogleError::authentication("timed out waiting for OAuth redirect"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(GoogleError::internal("callback channel disconnected"))
            }
        }
    }

    fn post_token_form(&self, params: &[(&str, &str)], what: &str) -> GoogleResult<TokenResponse> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .map_err(|e| GoogleError::network(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| GoogleError::network(format!("failed to read response: {}", e)))?;

        if let Some(err) = token_status_error(status, what, &body) {
            return Err(err);
        }

        serde_json::from_str(&body)
            .map_err(|e| GoogleError::invalid_response(format!("invalid token response: {}", e)))
    }
}

impl ConsentFlow for InstalledAppFlow {
    fn obtain(&self, scopes: &[String]) -> GoogleResult<Credential> {
        let pkce = PkceFlow::new();
        let (listener, port) = self.bind_loopback_server()?;
        let redirect_uri = self.redirect_uri(port);
        let auth_url = pkce.build_auth_url(&self.secret.client_id, &redirect_uri, scopes);

        debug!("authorization URL: {}", auth_url);
        let opened = self.config.open_browser
            && match open::that(&auth_url) {
                Ok(()) => true,
                Err(e) => {
                    warn!("failed to open browser: {}", e);
                    false
                }
            };
        if !opened {
            eprintln!("\nOpen this URL in your browser to authorize access:\n\n{}\n", auth_url);
        }

        let (code, received_state) = self.wait_for_callback(listener)?;
        if received_state != pkce.state {
            return Err(GoogleError::authentication(
                "OAuth state mismatch - possible CSRF attack",
            ));
        }

        info!("received authorization code, exchanging for tokens");
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let token = self.post_token_form(&params, "token exchange")?;

        let granted = match token.scope {
            Some(ref scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => scopes.to_vec(),
        };

        Ok(Credential::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
            granted,
        ))
    }

    fn refresh(&self, refresh_token: &str) -> GoogleResult<(String, Option<i64>)> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let token = self.post_token_form(&params, "token refresh")?;

        info!("refreshed access token");
        Ok((token.access_token, token.expires_in))
    }
}

/// Classifies a failed token endpoint response.
///
/// Google answers `invalid_grant` and `invalid_client` with 400 or 401; only
/// those mean the grant itself is dead. Everything else keeps the code the
/// Drive table gives it.
fn token_status_error(
    status: reqwest::StatusCode,
    what: &str,
    body: &str,
) -> Option<GoogleError> {
    use reqwest::StatusCode;

    let message = format!("{} failed ({}): {}", what, status, body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
            Some(GoogleError::authentication(message))
        }
        _ => status_error(status, body).map(|e| GoogleError::new(e.code(), message)),
    }
}

/// Handles one request on the loopback server.
///
/// Returns `None` for requests that are not the redirect (favicon etc.).
fn handle_callback(mut stream: TcpStream) -> Option<GoogleResult<(String, String)>> {
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line).ok()?;

    let outcome = parse_callback_request(&request_line)?;

    let response = if outcome.is_ok() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authorization Successful</h1>\
        <p>You can close this window.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authorization Failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    Some(outcome)
}

/// Parses `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback_request(request_line: &str) -> Option<GoogleResult<(String, String)>> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let query = target.strip_prefix("/callback")?;
    let query = query.strip_prefix('?').unwrap_or(query);

    let mut code = None;
    let mut state = None;
    let mut denied = None;

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => denied = Some(value),
            _ => {}
        }
    }

    if let Some(reason) = denied {
        return Some(Err(GoogleError::authentication(format!(
            "authorization denied: {}",
            reason
        ))));
    }

    Some(match code {
        Some(code) => Ok((code, state.unwrap_or_default())),
        None => Err(GoogleError::authentication(
            "missing authorization code in callback",
        )),
    })
}

/// PKCE state (RFC 7636) for one authorization attempt.
#[derive(Debug)]
pub struct PkceFlow {
    /// High-entropy random code verifier.
    pub verifier: String,
    /// Base64url SHA-256 of the verifier.
    pub challenge: String,
    /// Random value echoed back by Google, checked against CSRF.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_urlsafe(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_urlsafe(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent page URL. Requests offline access so a refresh
    /// token is issued.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Response from Google's token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}
