use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(u8)]
pub enum DebugLevel {
    #[default]
    None = 0,
    V = 1,
    VV = 2,
}

impl DebugLevel {
    #[inline]
    pub fn is_verbose(self) -> bool {
        self >= DebugLevel::V
    }

    #[inline]
    pub fn is_very_verbose(self) -> bool {
        self >= DebugLevel::VV
    }
}

impl core::fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DebugLevel::None => f.write_str("none"),
            DebugLevel::V => f.write_str("v"),
            DebugLevel::VV => f.write_str("vv"),
        }
    }
}

/// Sink for the engine's diagnostic events. Header values pass through
/// redaction before reaching a sink implementation.
pub trait DebugSink: Send + Sync + 'static {
    fn request_start(&self, dbg: DebugLevel, method: &Method, url: &str);
    fn request_headers(&self, dbg: DebugLevel, headers: &HeaderMap);
    fn response_status(&self, dbg: DebugLevel, status: StatusCode, url: &str, ok: bool);
    fn response_body(&self, dbg: DebugLevel, body: &[u8]);
    fn cache_hit(&self, dbg: DebugLevel, url: &str);
    fn token_refresh(&self, dbg: DebugLevel, ok: bool);
}

#[derive(Default)]
pub struct NoopDebugSink;

impl DebugSink for NoopDebugSink {
    #[inline]
    fn request_start(&self, _: DebugLevel, _: &Method, _: &str) {}
    #[inline]
    fn request_headers(&self, _: DebugLevel, _: &HeaderMap) {}
    #[inline]
    fn response_status(&self, _: DebugLevel, _: StatusCode, _: &str, _: bool) {}
    #[inline]
    fn response_body(&self, _: DebugLevel, _: &[u8]) {}
    #[inline]
    fn cache_hit(&self, _: DebugLevel, _: &str) {}
    #[inline]
    fn token_refresh(&self, _: DebugLevel, _: bool) {}
}

pub struct StderrDebugSink;

impl DebugSink for StderrDebugSink {
    fn request_start(&self, dbg: DebugLevel, method: &Method, url: &str) {
        eprintln!("[cadenza:{}] -> {} {}", dbg, method, url);
    }

    fn request_headers(&self, dbg: DebugLevel, headers: &HeaderMap) {
        eprintln!("[cadenza:{}] request headers:", dbg);
        for (k, v) in headers.iter() {
            eprintln!("  {}: {}", k, header_value_for_debug(k, v));
        }
    }

    fn response_status(&self, dbg: DebugLevel, status: StatusCode, url: &str, ok: bool) {
        let tag = if ok { "ok" } else { "error" };
        eprintln!("[cadenza:{}] <- {} {} ({})", dbg, status.as_u16(), url, tag);
    }

    fn response_body(&self, dbg: DebugLevel, body: &[u8]) {
        let preview = crate::codec::truncate_lossy(body, 32 * 1024);
        eprintln!(
            "[cadenza:{}] response body ({} bytes): {}",
            dbg,
            body.len(),
            preview
        );
    }

    fn cache_hit(&self, dbg: DebugLevel, url: &str) {
        eprintln!("[cadenza:{}] cache hit {}", dbg, url);
    }

    fn token_refresh(&self, dbg: DebugLevel, ok: bool) {
        let tag = if ok { "refreshed" } else { "refresh failed" };
        eprintln!("[cadenza:{}] token {}", dbg, tag);
    }
}

fn is_sensitive_header_name(name: &HeaderName) -> bool {
    // HeaderName::as_str() is normalized to lowercase.
    let n = name.as_str();
    matches!(n, "authorization" | "proxy-authorization" | "cookie" | "set-cookie")
        || n.contains("token")
        || n.contains("secret")
        || n.contains("api-key")
        || n.contains("apikey")
        || n.ends_with("-key")
}

fn header_value_for_debug(name: &HeaderName, value: &HeaderValue) -> String {
    if is_sensitive_header_name(name) {
        "<redacted>".to_string()
    } else {
        value.to_str().unwrap_or("<non-utf8>").to_string()
    }
}
