//! OAuth2 credential lifecycle.
//!
//! - [`AuthorizationFlow`]: the two-step consent handshake (`/auth` and
//!   `/auth/callback`), CSRF protected.
//! - [`CredentialNode`]: hands out authenticated clients, refreshing the access
//!   token when it has expired.
//! - [`TokenEndpointClient`]: the provider's token endpoint (code exchange and
//!   refresh).
//!
//! State machine of one credential record:
//!
//! ```text
//! Unauthorized --authorize--> Authorized --expiry elapses--> Refreshing
//!                                  ^                             |
//!                                  +---------- success ----------+
//!                                  failure -> Unauthorized (until re-authorized)
//! ```

mod flow;
mod node;
mod token;

pub use flow::{
    AuthorizationFlow, AuthorizationRedirect, AuthorizationRequest, CallbackOutcome,
    CallbackRequest,
};
pub use node::{AuthenticatedClient, CredentialNode};
pub use token::{TokenEndpointClient, TokenEndpointError, TokenResponse};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Access token with metadata.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The token string.
    pub token: SecretString,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// Expiration time, when the provider reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Creates a new access token.
    pub fn new(
        token: SecretString,
        token_type: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token,
            token_type: token_type.into(),
            expires_at,
        }
    }

    /// Checks if the token is expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Utc::now() > expires_at)
            .unwrap_or(false)
    }

    /// Returns the authorization header value.
    pub fn authorization_header(&self) -> String {
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.token.expose_secret())
    }
}
