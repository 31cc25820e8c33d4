//! OAuth2 token grants

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::AuthError;
use crate::config::Credentials;

/// Copernicus data space token endpoint
pub const DEFAULT_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";

/// Public client id of the data space
pub const DEFAULT_CLIENT_ID: &str = "cdse-public";

/// Longest response excerpt kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Access and refresh token returned by a grant.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    /// Bearer token sent with every request
    pub access_token: String,
    /// Token used to obtain the next access token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenPair {
    /// Pair without a refresh token, e.g. a static API key
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Source of tokens; the HTTP implementation is [`OAuthClient`].
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange user credentials for a token pair.
    async fn password_grant(&self, credentials: &Credentials) -> Result<TokenPair, AuthError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
}

/// Form-encoded OAuth2 client for the identity service.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    token_url: String,
    client_id: String,
}

impl OAuthClient {
    /// Client posting to `token_url` as `client_id`.
    pub fn new(client: Client, token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
        }
    }

    /// Client for the public Copernicus endpoint.
    pub fn copernicus(client: Client) -> Self {
        Self::new(client, DEFAULT_TOKEN_URL, DEFAULT_CLIENT_ID)
    }

    async fn grant(
        &self,
        grant_type: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenPair, AuthError> {
        debug!(url = %self.token_url, grant_type, "Requesting token");

        let mut form = vec![
            ("grant_type", grant_type),
            ("client_id", self.client_id.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))
    }
}

#[async_trait]
impl TokenProvider for OAuthClient {
    async fn password_grant(&self, credentials: &Credentials) -> Result<TokenPair, AuthError> {
        self.grant(
            "password",
            &[
                ("username", credentials.username.as_str()),
                ("password", credentials.password()),
            ],
        )
        .await
        .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.grant("refresh_token", &[("refresh_token", refresh_token)])
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))
    }
}
