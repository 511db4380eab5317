use crate::action::{Action, BoxFuture};
use crate::auth::AuthRuntime;
use crate::cache::{Fingerprint, ResponseCache};
use crate::codec::Json;
use crate::debug::{DebugLevel, DebugSink, NoopDebugSink};
use crate::error::Error;
use crate::maintenance::{Maintenance, MaintenanceConfig};
use crate::pagination::{Caps, CursorPage, CursorWire, Decoder, Page, PageFetcher, PageWire};
use crate::transport::{Request, ReqwestTransport, Response, Transport};
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
// Fixed rate-limit policy: up to 2 extra attempts, Retry-After honored,
// 1s fallback backoff. Disable per client with `retry_rate_limited(false)`.
const MAX_RATE_LIMIT_RETRIES: u32 = 2;
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Client handle for one remote service: owns the shared transport, the
/// response cache, the credential runtime and the pagination caps.
///
/// Cloning is cheap and every clone shares the same cache and credential
/// (they are per-client singletons).
pub struct ApiClient<T: Transport = ReqwestTransport> {
    transport: Arc<T>,
    base_url: Url,
    cache: Arc<ResponseCache>,
    auth: Option<Arc<AuthRuntime>>,
    caps: Caps,
    debug_level: DebugLevel,
    sink: Arc<dyn DebugSink>,
    retry_rate_limited: bool,
    timeout: Option<Duration>,
}

impl<T: Transport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            base_url: self.base_url.clone(),
            cache: self.cache.clone(),
            auth: self.auth.clone(),
            caps: self.caps,
            debug_level: self.debug_level,
            sink: self.sink.clone(),
            retry_rate_limited: self.retry_rate_limited,
            timeout: self.timeout,
        }
    }
}

impl ApiClient<ReqwestTransport> {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::with_transport(base_url, ReqwestTransport::default())
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(base_url: &str, transport: T) -> Result<Self, Error> {
        let mut base = Url::parse(base_url)?;
        // Relative joins need the base path to end in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            transport: Arc::new(transport),
            base_url: base,
            cache: Arc::new(ResponseCache::new(DEFAULT_CACHE_CAPACITY)),
            auth: None,
            caps: Caps::default(),
            debug_level: DebugLevel::default(),
            sink: Arc::new(NoopDebugSink),
            retry_rate_limited: true,
            timeout: Some(DEFAULT_TIMEOUT),
        })
    }

    #[inline]
    pub fn with_auth(mut self, auth: AuthRuntime) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    #[inline]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Arc::new(ResponseCache::new(capacity));
        self
    }

    #[inline]
    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    #[inline]
    pub fn with_debug_level(mut self, level: DebugLevel) -> Self {
        self.debug_level = level;
        self
    }

    #[inline]
    pub fn with_debug_sink(mut self, sink: impl DebugSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[inline]
    pub fn retry_rate_limited(mut self, v: bool) -> Self {
        self.retry_rate_limited = v;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[inline]
    pub fn auth(&self) -> Option<&AuthRuntime> {
        self.auth.as_deref()
    }

    #[inline]
    pub fn caps(&self) -> Caps {
        self.caps
    }

    #[inline]
    pub fn set_caching_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Starts the client's background tasks (cache sweep, proactive token
    /// refresh). Must be called within a tokio runtime; dropping or
    /// stopping the returned handle aborts the tasks.
    pub fn start_maintenance(&self, config: MaintenanceConfig) -> Maintenance {
        Maintenance::start(self.cache.clone(), self.auth.clone(), config)
    }

    // ---------------- Action constructors ----------------

    /// Deferred GET decoding the response as `Out`.
    pub fn get<Out>(&self, path: &str) -> Action<Out>
    where
        Out: DeserializeOwned + Send + 'static,
    {
        self.request_json(Method::GET, path, None)
    }

    /// Deferred GET translating a not-found response into `None`. Local
    /// recovery for lookup endpoints that document it, not a global rule.
    pub fn get_optional<Out>(&self, path: &str) -> Action<Option<Out>>
    where
        Out: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let path = path.to_string();
        Action::new(move || {
            let client = client.clone();
            let path = path.clone();
            async move {
                let url = client.endpoint_url(&path)?;
                match client.execute(Method::GET, url, None).await {
                    Ok(bytes) => Json::decode(&bytes).map(Some),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            }
        })
    }

    /// Deferred request decoding the response as `Out`.
    pub fn request_json<Out>(&self, method: Method, path: &str, body: Option<Bytes>) -> Action<Out>
    where
        Out: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let path = path.to_string();
        Action::new(move || {
            let client = client.clone();
            let method = method.clone();
            let path = path.clone();
            let body = body.clone();
            async move {
                let url = client.endpoint_url(&path)?;
                let bytes = client.execute(method, url, body).await?;
                Json::decode(&bytes)
            }
        })
    }

    /// Deferred request discarding the response body (write endpoints).
    pub fn request_empty(&self, method: Method, path: &str, body: Option<Bytes>) -> Action<()> {
        let client = self.clone();
        let path = path.to_string();
        Action::new(move || {
            let client = client.clone();
            let method = method.clone();
            let path = path.clone();
            let body = body.clone();
            async move {
                let url = client.endpoint_url(&path)?;
                client.execute(method, url, body).await?;
                Ok(())
            }
        })
    }

    /// Deferred GET decoding an offset-paginated response. The JSON item
    /// decoder is captured by the returned page and reused for every
    /// neighbouring page it fetches.
    pub fn get_page<Item>(&self, path: &str) -> Action<Page<Item>>
    where
        Item: DeserializeOwned + Send + Sync + 'static,
    {
        let client = self.clone();
        let path = path.to_string();
        Action::new(move || {
            let client = client.clone();
            let path = path.clone();
            async move {
                let url = client.endpoint_url(&path)?;
                let bytes = client.execute(Method::GET, url, None).await?;
                client.decode_page(&bytes)
            }
        })
    }

    /// Deferred GET decoding a cursor-paginated response.
    pub fn get_cursor_page<Item>(&self, path: &str) -> Action<CursorPage<Item>>
    where
        Item: DeserializeOwned + Send + Sync + 'static,
    {
        let client = self.clone();
        let path = path.to_string();
        Action::new(move || {
            let client = client.clone();
            let path = path.clone();
            async move {
                let url = client.endpoint_url(&path)?;
                let bytes = client.execute(Method::GET, url, None).await?;
                client.decode_cursor_page(&bytes)
            }
        })
    }

    /// Decodes a fetched body as an offset page bound to this client.
    pub fn decode_page<Item>(&self, bytes: &Bytes) -> Result<Page<Item>, Error>
    where
        Item: DeserializeOwned + Send + Sync + 'static,
    {
        let decoder: Decoder<PageWire<Item>> = Decoder::json();
        let wire = decoder.decode(bytes)?;
        Ok(Page::from_wire(
            wire,
            Arc::new(self.clone()),
            decoder,
            self.caps,
        ))
    }

    /// Decodes a fetched body as a cursor page bound to this client.
    pub fn decode_cursor_page<Item>(&self, bytes: &Bytes) -> Result<CursorPage<Item>, Error>
    where
        Item: DeserializeOwned + Send + Sync + 'static,
    {
        let decoder: Decoder<CursorWire<Item>> = Decoder::json();
        let wire = decoder.decode(bytes)?;
        Ok(CursorPage::from_wire(
            wire,
            Arc::new(self.clone()),
            decoder,
            self.caps,
        ))
    }

    // ---------------- Execution path ----------------

    fn endpoint_url(&self, path_and_query: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path_and_query.trim_start_matches('/'))?)
    }

    /// Full request path: credential gate, cache consult, dispatch with
    /// the 202/429 policy, cache store.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Bytes>,
    ) -> Result<Bytes, Error> {
        let dbg = self.debug_level;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(Json::CONTENT_TYPE));
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(Json::CONTENT_TYPE));
        }

        // No request is dispatched on a credential known to be expired:
        // the bearer call awaits (or performs) the refresh first.
        if let Some(auth) = &self.auth {
            let bearer = auth.bearer().await?;
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer)
                    .map_err(|_| Error::Authentication("access token is not header-safe".into()))?,
            );
        }

        // Only GET-equivalent requests consult the cache; writes bypass it.
        let cacheable = method == Method::GET || method == Method::HEAD;
        let fingerprint = Fingerprint::new(&method, &url, body.as_ref());
        if cacheable
            && let Some(hit) = self.cache.get(&fingerprint)
        {
            if dbg.is_verbose() {
                self.sink.cache_hit(dbg, url.as_str());
            }
            return Ok(hit);
        }

        let req = Request {
            method,
            url,
            headers,
            body,
            timeout: self.timeout,
        };
        let resp = self.dispatch(&req).await?;

        if cacheable {
            self.cache.put(fingerprint, resp.body.clone());
        }
        Ok(resp.body)
    }

    async fn dispatch(&self, req: &Request) -> Result<Response, Error> {
        let dbg = self.debug_level;
        let mut accepted_retried = false;
        let mut rate_retries: u32 = 0;
        loop {
            if dbg.is_verbose() {
                self.sink.request_start(dbg, &req.method, req.url.as_str());
            }
            if dbg.is_very_verbose() {
                self.sink.request_headers(dbg, &req.headers);
            }

            let resp = match self.transport.send(req).await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return Err(Error::Timeout(req.timeout.unwrap_or(DEFAULT_TIMEOUT)));
                }
                Err(e) => return Err(e.into()),
            };

            // A 202 is retried exactly once before being treated as final.
            if resp.status == StatusCode::ACCEPTED && !accepted_retried {
                accepted_retried = true;
                continue;
            }

            if resp.status == StatusCode::TOO_MANY_REQUESTS
                && self.retry_rate_limited
                && rate_retries < MAX_RATE_LIMIT_RETRIES
            {
                rate_retries += 1;
                let wait = resp.retry_after().unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
                tokio::time::sleep(wait).await;
                continue;
            }

            let ok = resp.status.is_success();
            if dbg.is_verbose() {
                self.sink.response_status(dbg, resp.status, req.url.as_str(), ok);
            }
            if dbg.is_very_verbose() {
                self.sink.response_body(dbg, &resp.body);
            }
            if !ok {
                return Err(Error::from_response(resp.status, &resp.body));
            }
            return Ok(resp);
        }
    }
}

impl<T: Transport> PageFetcher for ApiClient<T> {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Bytes, Error>> {
        let client = self.clone();
        let url = url.to_string();
        Box::pin(async move {
            let url = Url::parse(&url)?;
            client.execute(Method::GET, url, None).await
        })
    }
}
