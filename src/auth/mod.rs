//! OAuth2 credentials and SASL bearer-token authentication.
//!
//! Covers the two bearer mechanisms this sender speaks:
//! - XOAUTH2 (Google/Microsoft)
//! - OAUTHBEARER (RFC 7628)
//!
//! Token acquisition and refresh are delegated to a [`CredentialProvider`];
//! refresh is value-in/value-out so callers always authenticate with the
//! token they were handed back.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::MailResult;

/// Scope granting full mailbox access, required for SMTP sending.
pub const MAIL_SCOPE: &str = "https://mail.google.com/";

/// Bearer authentication mechanisms supported by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Google/Microsoft XOAUTH2.
    XOAuth2,
    /// OAuth 2.0 Bearer Token (RFC 7628).
    OAuthBearer,
}

impl AuthMethod {
    /// Returns the SMTP AUTH mechanism name.
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            AuthMethod::XOAuth2 => "XOAUTH2",
            AuthMethod::OAuthBearer => "OAUTHBEARER",
        }
    }

    /// Parses from an SMTP capability string.
    pub fn from_capability(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "XOAUTH2" => Some(AuthMethod::XOAuth2),
            "OAUTHBEARER" => Some(AuthMethod::OAuthBearer),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mechanism_name())
    }
}

/// OAuth2 client identity used to obtain tokens.
#[derive(Clone)]
pub struct ProviderKeys {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret (protected).
    pub client_secret: SecretString,
}

impl ProviderKeys {
    /// Creates a new key pair.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
        }
    }
}

impl fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// OAuth2 token with expiry information.
#[derive(Clone)]
pub struct OAuth2Token {
    /// Access token (protected).
    pub access_token: SecretString,
    /// Refresh token if the provider issued one.
    pub refresh_token: Option<SecretString>,
    /// Token expiry time (Unix timestamp).
    pub expires_at: Option<u64>,
}

impl OAuth2Token {
    /// Creates a new token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Sets the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::new(token.into()));
        self
    }

    /// Sets the expiry time.
    pub fn with_expires_at(mut self, timestamp: u64) -> Self {
        self.expires_at = Some(timestamp);
        self
    }

    /// Returns true if the token is expired or will expire soon (5 min buffer).
    /// A token with no expiry is never stale.
    pub fn is_stale(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            expires_at <= now + 300
        } else {
            false
        }
    }
}

impl fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of OAuth2 tokens for the sender.
///
/// `refresh` takes the stale token by reference and returns a fresh one, so
/// implementations stay free of interior mutability and the caller decides
/// which token actually gets used.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Obtains a token for the given user and scopes.
    async fn obtain(
        &self,
        keys: &ProviderKeys,
        scopes: &[&str],
        user: &str,
    ) -> MailResult<OAuth2Token>;

    /// Exchanges a stale token for a fresh one.
    async fn refresh(&self, token: &OAuth2Token) -> MailResult<OAuth2Token>;
}

/// Provider returning a fixed token; refresh hands back a clone.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: OAuth2Token,
}

impl StaticTokenProvider {
    /// Creates a provider around an existing token.
    pub fn new(token: OAuth2Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn obtain(
        &self,
        _keys: &ProviderKeys,
        _scopes: &[&str],
        _user: &str,
    ) -> MailResult<OAuth2Token> {
        Ok(self.token.clone())
    }

    async fn refresh(&self, _token: &OAuth2Token) -> MailResult<OAuth2Token> {
        Ok(self.token.clone())
    }
}

/// SASL initial-response construction.
pub struct Authenticator;

impl Authenticator {
    /// Generates the XOAUTH2 initial response.
    pub fn xoauth2_initial_response(username: &str, access_token: &SecretString) -> String {
        // Format: user=username\x01auth=Bearer token\x01\x01
        let response = format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            username,
            access_token.expose_secret()
        );
        BASE64.encode(response)
    }

    /// Generates the OAUTHBEARER initial response.
    pub fn oauth_bearer_initial_response(
        access_token: &SecretString,
        host: Option<&str>,
        port: Option<u16>,
    ) -> String {
        // Format: n,a=user,\x01host=hostname\x01port=port\x01auth=Bearer token\x01\x01
        let mut parts = vec!["n,".to_string()];

        if let Some(h) = host {
            parts.push(format!("\x01host={}", h));
        }
        if let Some(p) = port {
            parts.push(format!("\x01port={}", p));
        }
        parts.push(format!(
            "\x01auth=Bearer {}\x01\x01",
            access_token.expose_secret()
        ));

        BASE64.encode(parts.join(""))
    }
}
