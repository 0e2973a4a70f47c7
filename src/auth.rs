//! Obtaining the bearer token used for the measurement API.
//!
//! A token can either be handed in directly (copied from a browser session,
//! with or without its `Bearer ` prefix) or obtained by logging in with the
//! account's email and password through an [`Authenticator`].

use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{
    AccessToken, AuthType, AuthUrl, ClientId, RefreshToken, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info};

use crate::config::{AuthMode, Config, OAuthSettings};
use crate::{FluviusError, Result};

/// Logs in with account credentials and hands back a token.
pub trait Authenticator {
    /// Returns the access token and, when the server issues one, a refresh token.
    fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        verbose: bool,
    ) -> Result<(AccessToken, Option<RefreshToken>)>;
}

/// Returns the token to use for this run. With a pre-supplied token the
/// authenticator is never called.
pub fn resolve_token(config: &Config, authenticator: &dyn Authenticator) -> Result<AccessToken> {
    match &config.auth {
        AuthMode::BearerToken(raw) => Ok(AccessToken::new(strip_bearer_prefix(raw))),
        AuthMode::Password { email, password } => {
            let (access_token, _) =
                authenticator.login(email, password, config.remember_me, config.verbose)?;
            Ok(access_token)
        }
    }
}

fn strip_bearer_prefix(token: &str) -> String {
    let token = token.trim();
    match token.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => token[7..].trim().to_string(),
        _ => token.to_string(),
    }
}

/// OAuth2 resource owner password grant against the portal's identity provider.
#[derive(Debug, Clone)]
pub struct PasswordGrant {
    settings: OAuthSettings,
}

impl PasswordGrant {
    pub fn new(settings: OAuthSettings) -> Self {
        Self { settings }
    }

    fn client(&self) -> Result<BasicClient> {
        let client_id = self.settings.client_id.clone().ok_or_else(|| {
            FluviusError::Authentication(
                "no OAuth client id configured (--client-id or FLUVIUS_CLIENT_ID)".to_string(),
            )
        })?;

        let authority = self.settings.authority.trim_end_matches('/');
        let auth_url = AuthUrl::new(format!("{}/authorize", authority))
            .map_err(|e| FluviusError::Authentication(format!("invalid authority URL: {}", e)))?;
        let token_url = TokenUrl::new(format!("{}/token", authority))
            .map_err(|e| FluviusError::Authentication(format!("invalid authority URL: {}", e)))?;

        Ok(
            BasicClient::new(ClientId::new(client_id), None, auth_url, Some(token_url))
                .set_auth_type(AuthType::RequestBody),
        )
    }
}

impl Authenticator for PasswordGrant {
    fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        verbose: bool,
    ) -> Result<(AccessToken, Option<RefreshToken>)> {
        let client = self.client()?;

        if verbose {
            info!(email = %email, remember_me, "logging in");
        } else {
            debug!(email = %email, remember_me, "logging in");
        }

        let username = ResourceOwnerUsername::new(email.to_string());
        let password = ResourceOwnerPassword::new(password.to_string());

        let mut request = client
            .exchange_password(&username, &password)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("offline_access".to_string()));
        if let Some(client_id) = &self.settings.client_id {
            request = request.add_scope(Scope::new(client_id.clone()));
        }
        if remember_me {
            request = request.add_extra_param("remember_me", "true");
        }

        let token_result = request.request(http_client).map_err(|e| match e {
            RequestTokenError::Request(e) => FluviusError::TokenTransport(e.to_string()),
            RequestTokenError::ServerResponse(response) => {
                FluviusError::Authentication(response.to_string())
            }
            RequestTokenError::Parse(e, _) => {
                FluviusError::Authentication(format!("unexpected token response: {}", e))
            }
            RequestTokenError::Other(message) => FluviusError::Authentication(message),
        })?;

        if verbose {
            info!(expires_in = ?token_result.expires_in(), "obtained access token");
        }

        Ok((
            token_result.access_token().clone(),
            token_result.refresh_token().cloned(),
        ))
    }
}
