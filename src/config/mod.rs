//! Configuration for the Drive node, its credentials and the admin server.

use secrecy::SecretString;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use url::{Host, Url};

use crate::errors::{NodeError, NodeResult};

/// Default Drive API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3/";

/// Default Drive upload URL.
pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/";

/// Google OAuth2 consent endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth 2.0 scopes for Google Drive.
pub mod scopes {
    /// Full access to Drive files.
    pub const DRIVE: &str = "https://www.googleapis.com/auth/drive";

    /// Read-only access to file metadata and content.
    pub const DRIVE_READONLY: &str = "https://www.googleapis.com/auth/drive.readonly";

    /// Access to files created by the app.
    pub const DRIVE_FILE: &str = "https://www.googleapis.com/auth/drive.file";
}

/// Parses an endpoint URL.
///
/// `https` is required unless the host is a loopback address.
pub fn parse_endpoint(name: &str, raw: &str) -> NodeResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| NodeError::configuration(format!("Invalid {name} '{raw}': {e}")))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        _ => Err(NodeError::configuration(format!(
            "{name} must use HTTPS: {raw}"
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn as_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Splits a scope list given as comma and/or space separated values.
///
/// An empty list falls back to the full Drive scope.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    let scopes: Vec<String> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if scopes.is_empty() {
        vec![scopes::DRIVE.to_string()]
    } else {
        scopes
    }
}

/// Drive API endpoints and request settings.
#[derive(Debug, Clone)]
pub struct DriveApiConfig {
    /// Base URL for metadata requests, always ending in `/`.
    pub base_url: Url,
    /// Base URL for media uploads, always ending in `/`.
    pub upload_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl DriveApiConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DriveApiConfigBuilder {
        DriveApiConfigBuilder::new()
    }
}

/// Builder for [`DriveApiConfig`].
#[derive(Debug, Clone)]
pub struct DriveApiConfigBuilder {
    base_url: Option<String>,
    upload_url: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl Default for DriveApiConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveApiConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            upload_url: None,
            timeout: Duration::from_secs(300),
            user_agent: None,
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the upload URL.
    pub fn upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = Some(url.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> NodeResult<DriveApiConfig> {
        let base_url = parse_endpoint(
            "Base URL",
            self.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
        )?;
        let upload_url = parse_endpoint(
            "Upload URL",
            self.upload_url.as_deref().unwrap_or(DEFAULT_UPLOAD_URL),
        )?;

        if self.timeout.is_zero() {
            return Err(NodeError::configuration("Timeout must be greater than zero"));
        }

        let user_agent = self.user_agent.unwrap_or_else(|| {
            format!("integrations-google-drive-node/{}", env!("CARGO_PKG_VERSION"))
        });

        Ok(DriveApiConfig {
            base_url: as_base(base_url),
            upload_url: as_base(upload_url),
            timeout: self.timeout,
            user_agent,
        })
    }
}

/// Provider endpoints used by the authorization flow and token refresh.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    /// Consent page the user agent is redirected to.
    pub authorization_url: Url,
    /// Token endpoint for code exchange and refresh.
    pub token_url: Url,
}

impl OAuthEndpoints {
    /// Google's production endpoints.
    pub fn google() -> NodeResult<Self> {
        Self::new(GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL)
    }

    /// Custom endpoints, e.g. a local mock provider.
    pub fn new(authorization_url: &str, token_url: &str) -> NodeResult<Self> {
        Ok(Self {
            authorization_url: parse_endpoint("Authorization URL", authorization_url)?,
            token_url: parse_endpoint("Token URL", token_url)?,
        })
    }
}

/// Static configuration of a credentials node.
#[derive(Debug, Clone)]
pub struct CredentialsNodeConfig {
    /// Node identity, the key of the credential record.
    pub node_id: String,
    /// Provider application id.
    pub client_id: String,
    /// Provider application secret.
    pub client_secret: SecretString,
    /// Redirect URI registered with the provider.
    pub redirect_uri: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl CredentialsNodeConfig {
    /// Creates a configuration requesting the full Drive scope.
    pub fn new(
        node_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            redirect_uri: None,
            scopes: vec![scopes::DRIVE.to_string()],
        }
    }

    /// Sets the redirect URI.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Sets the scopes from a comma or space separated list.
    pub fn with_scopes(mut self, scopes: &str) -> Self {
        self.scopes = parse_scopes(scopes);
        self
    }
}

/// Configuration of the stand-alone admin server.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Directory of the file credential store.
    pub store_dir: PathBuf,
    /// Drive API settings.
    pub drive: DriveApiConfig,
    /// Provider endpoints.
    pub oauth: OAuthEndpoints,
}

impl AdminConfig {
    /// Creates configuration from environment variables.
    ///
    /// Recognized variables: `DRIVE_NODE_BIND`, `DRIVE_NODE_STORE_DIR`,
    /// `DRIVE_NODE_API_BASE_URL`, `DRIVE_NODE_UPLOAD_URL`,
    /// `DRIVE_NODE_AUTH_URL`, `DRIVE_NODE_TOKEN_URL` and
    /// `DRIVE_NODE_TIMEOUT_SECS`.
    pub fn from_env() -> NodeResult<Self> {
        let bind_addr = match std::env::var("DRIVE_NODE_BIND") {
            Ok(raw) => raw.parse().map_err(|e| {
                NodeError::configuration(format!("Invalid DRIVE_NODE_BIND '{raw}': {e}"))
            })?,
            Err(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1880),
        };

        let store_dir = std::env::var("DRIVE_NODE_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".drive-node/credentials"));

        let mut drive = DriveApiConfig::builder();
        if let Ok(base_url) = std::env::var("DRIVE_NODE_API_BASE_URL") {
            drive = drive.base_url(base_url);
        }
        if let Ok(upload_url) = std::env::var("DRIVE_NODE_UPLOAD_URL") {
            drive = drive.upload_url(upload_url);
        }
        if let Ok(timeout) = std::env::var("DRIVE_NODE_TIMEOUT_SECS") {
            if let Ok(timeout_secs) = timeout.parse::<u64>() {
                drive = drive.timeout(Duration::from_secs(timeout_secs));
            }
        }

        let auth_url =
            std::env::var("DRIVE_NODE_AUTH_URL").unwrap_or_else(|_| GOOGLE_AUTH_URL.to_string());
        let token_url =
            std::env::var("DRIVE_NODE_TOKEN_URL").unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string());

        Ok(Self {
            bind_addr,
            store_dir,
            drive: drive.build()?,
            oauth: OAuthEndpoints::new(&auth_url, &token_url)?,
        })
    }
}
