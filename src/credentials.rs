// Credential resolution: turns the configured options into a token
// provider the pipeline asks for a bearer token on every request.
//
// Precedence is static token, then managed identity, then the interactive
// prompt. Nothing here touches the network until a token is requested.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MaestroError, Result};

/// Scope requested for user flows unless configured otherwise.
pub const DEFAULT_USER_SCOPE: &str = ".default";

/// Instance metadata service token endpoint.
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";

// Tokens this close to expiry are treated as expired.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// A bearer token and, when known, when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        AccessToken {
            token: token.into(),
            expires_on: None,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_on {
            Some(expires_on) => expires_on - Duration::minutes(REFRESH_MARGIN_MINUTES) > now,
            None => true,
        }
    }
}

/// Supplies bearer tokens. Implementations own caching and refresh.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, cancel: &CancellationToken) -> Result<AccessToken>;
}

/// Options driving credential resolution.
#[derive(Debug, Clone)]
pub struct AppCredentialResolverOptions {
    /// Client ID of the Entra application the token is requested for.
    pub app_id: String,
    /// Forbid the interactive prompt.
    pub disable_interactive_auth: bool,
    /// Token to use directly instead of authenticating.
    pub token: Option<String>,
    /// Managed identity client ID.
    pub managed_identity_id: Option<String>,
    /// Scope to request for user flows.
    pub user_scope: String,
}

impl AppCredentialResolverOptions {
    pub fn new(app_id: impl Into<String>) -> Self {
        AppCredentialResolverOptions {
            app_id: app_id.into(),
            disable_interactive_auth: false,
            token: None,
            managed_identity_id: None,
            user_scope: DEFAULT_USER_SCOPE.to_string(),
        }
    }
}

/// Which kind of provider the options resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    StaticToken,
    ManagedIdentity,
    Interactive,
}

pub struct AppCredentialResolver {
    options: AppCredentialResolverOptions,
    imds_endpoint: String,
    token_cache_path: Option<PathBuf>,
    prompt: Arc<dyn TokenPrompt>,
}

impl AppCredentialResolver {
    pub fn new(options: AppCredentialResolverOptions) -> Self {
        let token_cache_path = default_token_cache_path(&options.app_id);
        AppCredentialResolver {
            options,
            imds_endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
            token_cache_path,
            prompt: Arc::new(TerminalPrompt),
        }
    }

    #[must_use]
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.imds_endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_token_cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.token_cache_path = path;
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn TokenPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// The provider kind `resolve` would build, or an authentication error
    /// when nothing is usable.
    pub fn source(&self) -> Result<CredentialSource> {
        if non_empty(&self.options.token).is_some() {
            return Ok(CredentialSource::StaticToken);
        }
        if non_empty(&self.options.managed_identity_id).is_some() {
            return Ok(CredentialSource::ManagedIdentity);
        }
        if self.options.disable_interactive_auth {
            return Err(MaestroError::Authentication(
                "no token or managed identity configured and interactive authentication is disabled"
                    .to_string(),
            ));
        }
        Ok(CredentialSource::Interactive)
    }

    pub fn resolve(&self) -> Result<Arc<dyn TokenProvider>> {
        let source = self.source()?;
        info!(source = ?source, app_id = %self.options.app_id, "credential_source_resolved");

        let provider: Arc<dyn TokenProvider> = match source {
            CredentialSource::StaticToken => {
                let token = non_empty(&self.options.token).unwrap_or_default();
                Arc::new(StaticTokenProvider::new(token))
            }
            CredentialSource::ManagedIdentity => {
                let client_id = non_empty(&self.options.managed_identity_id).unwrap_or_default();
                Arc::new(ManagedIdentityTokenProvider::new(
                    &self.imds_endpoint,
                    &self.options.app_id,
                    client_id,
                )?)
            }
            CredentialSource::Interactive => Arc::new(InteractiveTokenProvider::new(
                user_scope(&self.options.app_id, &self.options.user_scope),
                self.token_cache_path.clone(),
                self.prompt.clone(),
            )),
        };
        Ok(provider)
    }
}

/// Always hands out the same configured token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _cancel: &CancellationToken) -> Result<AccessToken> {
        Ok(AccessToken::new(self.token.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ImdsTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
}

/// Fetches tokens for a user-assigned managed identity from the instance
/// metadata service.
pub struct ManagedIdentityTokenProvider {
    http: reqwest::Client,
    endpoint: Url,
    resource: String,
    client_id: String,
    cached: Mutex<Option<AccessToken>>,
}

impl ManagedIdentityTokenProvider {
    pub fn new(endpoint: &str, app_id: &str, client_id: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| MaestroError::InvalidUri(format!("{}: {}", endpoint, e)))?;
        let http = reqwest::Client::builder().build()?;
        Ok(ManagedIdentityTokenProvider {
            http,
            endpoint,
            resource: format!("api://{}", app_id),
            client_id: client_id.to_string(),
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("api-version", IMDS_API_VERSION)
            .append_pair("resource", &self.resource)
            .append_pair("client_id", &self.client_id);

        let request = self.http.get(url).header("Metadata", "true").send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MaestroError::Cancelled),
            result = request => result?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MaestroError::Cancelled),
            body = response.text() => body?,
        };
        if !status.is_success() {
            return Err(MaestroError::Authentication(format!(
                "managed identity token request failed with status {}: {}",
                status, body
            )));
        }

        let parsed: ImdsTokenResponse =
            serde_json::from_str(&body).map_err(MaestroError::Deserialize)?;
        let expires_on = parsed
            .expires_on
            .and_then(|secs| secs.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on,
        })
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn get_token(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.clone());
        }

        debug!(resource = %self.resource, "managed_identity_token_refresh");
        let token = self.fetch(cancel).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Asks a human for a token.
pub trait TokenPrompt: Send + Sync {
    fn prompt(&self, scope: &str) -> io::Result<String>;
}

/// Reads a token from the terminal without echoing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TokenPrompt for TerminalPrompt {
    fn prompt(&self, scope: &str) -> io::Result<String> {
        eprintln!("Paste an access token issued for scope {}", scope);
        dialoguer::Password::new()
            .with_prompt("Maestro access token")
            .interact()
    }
}

/// Prompts once, then reuses the token from memory or the on-disk cache
/// until it nears its `exp` claim.
pub struct InteractiveTokenProvider {
    scope: String,
    cache_path: Option<PathBuf>,
    prompt: Arc<dyn TokenPrompt>,
    cached: Mutex<Option<AccessToken>>,
}

impl InteractiveTokenProvider {
    pub fn new(scope: String, cache_path: Option<PathBuf>, prompt: Arc<dyn TokenPrompt>) -> Self {
        InteractiveTokenProvider {
            scope,
            cache_path,
            prompt,
            cached: Mutex::new(None),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn load_cached(&self) -> Option<AccessToken> {
        let path = self.cache_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        let token = token_from_raw(raw.trim())?;
        if token.is_fresh(Utc::now()) {
            debug!(path = %path.display(), "interactive_token_cache_hit");
            Some(token)
        } else {
            None
        }
    }

    async fn ask(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        let prompt = self.prompt.clone();
        let scope = self.scope.clone();
        let handle = tokio::task::spawn_blocking(move || prompt.prompt(&scope));

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MaestroError::Cancelled),
            joined = handle => joined.map_err(|e| io::Error::new(io::ErrorKind::Other, e))??,
        };

        let token = token_from_raw(raw.trim()).ok_or_else(|| {
            MaestroError::Authentication("no access token was provided".to_string())
        })?;
        if !token.is_fresh(Utc::now()) {
            return Err(MaestroError::Authentication(
                "the provided access token has expired".to_string(),
            ));
        }

        if let Some(path) = &self.cache_path {
            if let Err(err) = store_token(path, &token.token) {
                warn!(path = %path.display(), error = %err, "interactive_token_cache_write_failed");
            }
        }
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for InteractiveTokenProvider {
    async fn get_token(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.clone());
        }

        let token = match self.load_cached() {
            Some(token) => token,
            None => self.ask(cancel).await?,
        };
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Default location of the interactive token cache for `app_id`.
pub fn default_token_cache_path(app_id: &str) -> Option<PathBuf> {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("maestro-cli").join(format!("token-{}", app_id)))
}

/// Expiry encoded in a JWT's `exp` claim. `None` for opaque tokens.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.get("exp")?.as_i64()?, 0)
}

fn user_scope(app_id: &str, scope: &str) -> String {
    format!("api://{}/{}", app_id, scope)
}

fn token_from_raw(raw: &str) -> Option<AccessToken> {
    if raw.is_empty() {
        return None;
    }
    Some(AccessToken {
        token: raw.to_string(),
        expires_on: jwt_expiry(raw),
    })
}

fn store_token(path: &Path, token: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, token)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
