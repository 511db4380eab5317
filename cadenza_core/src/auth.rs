use crate::error::Error;
use crate::transport::{Request, Transport};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use url::Url;

const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Bearer credential plus its refresh metadata. Mutated in place by the
/// runtime on refresh for the lifetime of the client.
#[derive(Clone)]
pub struct TokenBundle {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Instant,
    scopes: Vec<String>,
}

impl TokenBundle {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Duration,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: Instant::now() + expires_in,
            scopes,
        }
    }

    /// Builds a bundle from the token wire shape, keeping `prior_refresh`
    /// when the response omits a new refresh token.
    pub fn from_response(resp: TokenResponse, prior_refresh: Option<String>) -> Self {
        let scopes = resp.scopes();
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(prior_refresh),
            expires_at: Instant::now() + Duration::from_secs(resp.expires_in),
            scopes,
        }
    }

    /// Explicit escape hatch; the secret never appears in `Debug`.
    #[inline]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[inline]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[inline]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    #[inline]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// True once the credential is inside `margin` of its expiry.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) <= margin
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<secret>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<secret>"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// OAuth2 token wire shape shared by all grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Space-separated `scope` string as individual grants.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TokenState {
    Valid,
    Expiring,
    Refreshing,
    Invalid,
}

pub type RefreshFuture = Pin<Box<dyn Future<Output = Result<TokenResponse, Error>> + Send>>;

/// Pluggable refresh strategy. The runtime guarantees at most one call is
/// in flight at a time.
pub trait Authenticator: Send + Sync + 'static {
    fn refresh(&self, current: &TokenBundle) -> RefreshFuture;
}

/// Closure adapter, mostly for tests and custom refresh strategies.
pub struct FnAuthenticator<F>(pub F);

impl<F> Authenticator for FnAuthenticator<F>
where
    F: Fn(&TokenBundle) -> RefreshFuture + Send + Sync + 'static,
{
    fn refresh(&self, current: &TokenBundle) -> RefreshFuture {
        (self.0)(current)
    }
}

/// Token-endpoint authenticator covering the client-credentials,
/// authorization-code and refresh-token grants.
pub struct HttpAuthenticator<T: Transport> {
    transport: Arc<T>,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl<T: Transport> HttpAuthenticator<T> {
    pub fn new(
        transport: Arc<T>,
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub async fn client_credentials(&self) -> Result<TokenBundle, Error> {
        let resp = self
            .token_request(&[("grant_type", "client_credentials")])
            .await?;
        Ok(TokenBundle::from_response(resp, None))
    }

    /// Exchanges an authorization code obtained out of band (the browser
    /// consent flow itself is not this crate's concern).
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenBundle, Error> {
        let resp = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .await?;
        Ok(TokenBundle::from_response(resp, None))
    }

    async fn token_request(&self, pairs: &[(&str, &str)]) -> Result<TokenResponse, Error> {
        let mut headers = HeaderMap::new();
        let basic = B64.encode(format!("{}:{}", self.client_id, self.client_secret));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {basic}"))
                .map_err(|_| Error::Authentication("client credentials are not header-safe".into()))?,
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let req = Request {
            method: Method::POST,
            url: self.token_url.clone(),
            headers,
            body: Some(form_body(pairs)),
            timeout: None,
        };
        let resp = self.transport.send(&req).await.map_err(Error::from)?;
        if !resp.status.is_success() {
            return Err(Error::from_response(resp.status, &resp.body));
        }
        crate::codec::Json::decode(&resp.body)
    }
}

impl<T: Transport> Authenticator for HttpAuthenticator<T> {
    fn refresh(&self, current: &TokenBundle) -> RefreshFuture {
        let transport = self.transport.clone();
        let token_url = self.token_url.clone();
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.clone();
        let refresh_token = current.refresh_token().map(str::to_owned);
        Box::pin(async move {
            let this = HttpAuthenticator {
                transport,
                token_url,
                client_id,
                client_secret,
            };
            match refresh_token {
                Some(rt) => {
                    this.token_request(&[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", &rt),
                    ])
                    .await
                }
                // Client-credentials grants carry no refresh token; a fresh
                // grant is the refresh.
                None => this.token_request(&[("grant_type", "client_credentials")]).await,
            }
        })
    }
}

fn form_body(pairs: &[(&str, &str)]) -> Bytes {
    let mut s = String::new();
    for (i, (k, v)) in pairs.iter().enumerate() {
        if i > 0 {
            s.push('&');
        }
        s.push_str(k);
        s.push('=');
        s.push_str(&urlencoding::encode(v));
    }
    Bytes::from(s)
}

/// Credential lifecycle manager: one per client, shared by all in-flight
/// actions.
///
/// Contract:
/// - A request observing `Expiring` awaits the refresh before dispatch.
/// - Exactly one refresh is in flight at a time; racers await it.
/// - Refresh failure leaves the stored credential unchanged and surfaces
///   `Error::ReAuthenticationNeeded`; there is no automatic second attempt.
pub struct AuthRuntime {
    bundle: Mutex<TokenBundle>,
    authenticator: Box<dyn Authenticator>,
    refresh_gate: tokio::sync::Mutex<()>,
    margin: Duration,
    invalid: AtomicBool,
    hooks: Mutex<Vec<Box<dyn Fn(&TokenBundle) + Send + Sync>>>,
}

impl AuthRuntime {
    pub fn new(bundle: TokenBundle, authenticator: impl Authenticator) -> Self {
        Self {
            bundle: Mutex::new(bundle),
            authenticator: Box::new(authenticator),
            refresh_gate: tokio::sync::Mutex::new(()),
            margin: DEFAULT_EXPIRY_MARGIN,
            invalid: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Safety margin before `expires_at` at which a credential counts as
    /// `Expiring`.
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn bundle(&self) -> TokenBundle {
        self.bundle.lock().clone()
    }

    /// Replaces the credential wholesale (manual re-authentication).
    pub fn set_bundle(&self, bundle: TokenBundle) {
        *self.bundle.lock() = bundle;
        self.invalid.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> TokenState {
        if self.invalid.load(Ordering::SeqCst) {
            return TokenState::Invalid;
        }
        if self.refresh_gate.try_lock().is_err() {
            return TokenState::Refreshing;
        }
        if self.expiring() {
            TokenState::Expiring
        } else {
            TokenState::Valid
        }
    }

    /// Registers a hook fired after every successful refresh, with the
    /// updated bundle.
    pub fn on_refresh(&self, hook: impl Fn(&TokenBundle) + Send + Sync + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// The authorization header value for the current (fresh) credential.
    pub async fn bearer(&self) -> Result<String, Error> {
        self.ensure_fresh().await?;
        Ok(format!("Bearer {}", self.bundle.lock().access_token()))
    }

    /// Blocks (cooperatively) until the credential is outside its expiry
    /// margin, refreshing it if this caller wins the gate.
    pub async fn ensure_fresh(&self) -> Result<(), Error> {
        if !self.expiring() {
            return Ok(());
        }
        let _gate = self.refresh_gate.lock().await;
        if !self.expiring() {
            // A racer refreshed while we waited on the gate.
            return Ok(());
        }
        let current = self.bundle();
        match self.authenticator.refresh(&current).await {
            Ok(resp) => {
                self.apply(resp);
                Ok(())
            }
            Err(e) => {
                self.invalid.store(true, Ordering::SeqCst);
                Err(Error::ReAuthenticationNeeded(
                    format!("token refresh failed: {e}").into(),
                ))
            }
        }
    }

    fn expiring(&self) -> bool {
        self.bundle.lock().expires_within(self.margin)
    }

    fn apply(&self, resp: TokenResponse) {
        let snapshot = {
            let mut bundle = self.bundle.lock();
            let prior_refresh = bundle.refresh_token().map(str::to_owned);
            *bundle = TokenBundle::from_response(resp, prior_refresh);
            bundle.clone()
        };
        self.invalid.store(false, Ordering::SeqCst);
        for hook in self.hooks.lock().iter() {
            hook(&snapshot);
        }
    }
}
