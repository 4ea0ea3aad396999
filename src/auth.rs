//! OAuth2 authentication for the Gmail API
//!
//! The hub and the [`OAuthAuthenticator`] share one `yup_oauth2` authenticator, so a
//! forced refresh through the authenticator is picked up by the next hub call.

use async_trait::async_trait;
use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, TriageError};
use crate::models::Credential;

/// Scopes needed to read, reply to, label and mark messages
///
/// - gmail.modify: read messages, send replies, change labels on messages
/// - gmail.labels: create labels
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
pub const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

type HttpsConnector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<HttpsConnector>;

type OAuth = yup_oauth2::authenticator::Authenticator<HttpsConnector>;

/// Source of access credentials for the mail provider
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return a currently valid credential, loading it from the token store
    async fn load_credentials(&self) -> Result<Credential>;

    /// Obtain a fresh credential after the current one was rejected
    async fn refresh(&self) -> Result<Credential>;
}

/// Authenticator backed by the installed-app OAuth2 flow with an on-disk token cache
#[derive(Clone)]
pub struct OAuthAuthenticator {
    inner: OAuth,
}

impl OAuthAuthenticator {
    pub fn new(inner: OAuth) -> Self {
        Self { inner }
    }
}

fn into_credential(token: yup_oauth2::AccessToken) -> Result<Credential> {
    token
        .token()
        .map(Credential::new)
        .ok_or_else(|| TriageError::AuthError("Token store returned no access token".to_string()))
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    async fn load_credentials(&self) -> Result<Credential> {
        // yup_oauth2 refreshes transparently when the cached token has expired
        let token = self
            .inner
            .token(REQUIRED_SCOPES)
            .await
            .map_err(|e| TriageError::AuthError(format!("Failed to obtain token: {}", e)))?;
        debug!("Loaded cached access token");
        into_credential(token)
    }

    async fn refresh(&self) -> Result<Credential> {
        info!("Forcing access token refresh");
        let token = self
            .inner
            .force_refreshed_token(REQUIRED_SCOPES)
            .await
            .map_err(|e| TriageError::AuthError(format!("Failed to refresh token: {}", e)))?;
        into_credential(token)
    }
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// This function sets up the complete Gmail API client with:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence to disk for automatic refresh
/// - HTTP/1 client with TLS support
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 credentials JSON file
/// * `token_cache_path` - Path where access tokens will be cached
///
/// # Returns
/// The hub together with an authenticator that shares its token store
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<(GmailHub, OAuthAuthenticator)> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to read credentials: {}", e)))?;

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| TriageError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the cached token carries every scope the pipeline uses
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to obtain token: {}", e)))?;

    #[cfg(unix)]
    secure_token_file(token_cache_path).await?;

    // HTTP/1 works better with google-gmail1 than the HTTP/2 default
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| TriageError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    let hub = Gmail::new(client, auth.clone());
    Ok((hub, OAuthAuthenticator::new(auth)))
}

/// Restrict the token cache to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}
