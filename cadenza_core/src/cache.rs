use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD as B64;
use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use url::Url;

/// Cache key derived from method, URL and body signature.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(method: &Method, url: &Url, body: Option<&Bytes>) -> Self {
        let mut key = format!("{} {}", method, url);
        if let Some(b) = body {
            key.push(' ');
            key.push_str(&B64.encode(b));
        }
        Self(key)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct Entry {
    body: Bytes,
    inserted_at: Instant,
}

struct Inner {
    enabled: bool,
    capacity: usize,
    entries: HashMap<Fingerprint, Entry>,
    // Insertion order; front is the oldest entry and evicts first.
    order: VecDeque<Fingerprint>,
}

/// Bounded response cache shared by all in-flight requests of one client.
///
/// Contract:
/// - Only GET-equivalent requests consult it; the client enforces that.
/// - When capacity is exceeded, the oldest-inserted entry evicts first.
/// - Disabling at runtime clears existing entries; re-enable starts empty.
pub struct ResponseCache {
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                enabled: true,
                capacity: capacity.max(1),
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<Bytes> {
        let inner = self.inner.lock();
        if !inner.enabled {
            return None;
        }
        inner.entries.get(fp).map(|e| e.body.clone())
    }

    pub fn put(&self, fp: Fingerprint, body: Bytes) {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return;
        }
        if inner.entries.contains_key(&fp) {
            // Refreshed entry counts as newest for eviction purposes.
            inner.order.retain(|k| k != &fp);
        }
        inner.order.push_back(fp.clone());
        inner.entries.insert(
            fp,
            Entry {
                body,
                inserted_at: Instant::now(),
            },
        );
        while inner.entries.len() > inner.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inserted_at(&self, fp: &Fingerprint) -> Option<Instant> {
        self.inner.lock().entries.get(fp).map(|e| e.inserted_at)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Disabling drops all entries so a later re-enable starts from empty.
    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if !enabled {
            inner.entries.clear();
            inner.order.clear();
        }
        inner.enabled = enabled;
    }
}
