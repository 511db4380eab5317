pub mod cursor;
pub mod offset;

pub use cursor::{CursorPage, CursorWire, Cursors};
pub use offset::{Page, PageWire};

use crate::action::BoxFuture;
use crate::codec::Json;
use crate::error::Error;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Traversal guards applied to every "fetch all pages" walk.
#[derive(Copy, Clone, Debug)]
pub struct Caps {
    pub max_pages: u32,
    pub max_items: u64,
    pub detect_loops: bool,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_items: 100_000,
            detect_loops: true,
        }
    }
}

impl Caps {
    #[inline]
    pub fn max_pages(mut self, v: u32) -> Self {
        self.max_pages = v;
        self
    }

    #[inline]
    pub fn max_items(mut self, v: u64) -> Self {
        self.max_items = v;
        self
    }

    #[inline]
    pub fn detect_loops(mut self, v: bool) -> Self {
        self.detect_loops = v;
        self
    }
}

/// Back-reference held by every page: the component able to issue further
/// HTTP calls for neighbouring pages. The engine's client implements this;
/// link URLs are absolute.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Bytes, Error>>;
}

/// Decoder strategy captured when a page is constructed. Following a
/// `next`/`previous` link decodes with the strategy bound to the original
/// page's item type, never by inspecting items already in hand.
pub struct Decoder<W>(Arc<dyn Fn(&Bytes) -> Result<W, Error> + Send + Sync>);

impl<W> Clone for Decoder<W> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<W> Decoder<W> {
    pub fn new(f: impl Fn(&Bytes) -> Result<W, Error> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn decode(&self, bytes: &Bytes) -> Result<W, Error> {
        (self.0)(bytes)
    }
}

impl<W: DeserializeOwned> Decoder<W> {
    pub fn json() -> Self {
        Self::new(|bytes| Json::decode(bytes))
    }
}

/// Shared walk bookkeeping: loop detection plus page/item caps.
pub(crate) struct WalkGuard {
    caps: Caps,
    seen: std::collections::HashSet<String>,
    pages_fetched: u32,
    items: u64,
}

impl WalkGuard {
    pub(crate) fn new(caps: Caps, seed_href: &str, seed_items: usize) -> Self {
        let mut seen = std::collections::HashSet::new();
        if caps.detect_loops {
            seen.insert(seed_href.to_string());
        }
        Self {
            caps,
            seen,
            pages_fetched: 0,
            items: seed_items as u64,
        }
    }

    /// Checked before fetching `url`; rejects revisits and the page cap.
    pub(crate) fn before_fetch(&mut self, url: &str) -> Result<(), Error> {
        if self.caps.detect_loops && !self.seen.insert(url.to_string()) {
            return Err(Error::Pagination(
                format!("loop detected (url={url})").into(),
            ));
        }
        self.pages_fetched += 1;
        if self.pages_fetched > self.caps.max_pages {
            return Err(Error::PaginationLimit(
                format!("max_pages reached (max_pages={})", self.caps.max_pages).into(),
            ));
        }
        Ok(())
    }

    /// Checked after a fetch with the fetched page's item count.
    pub(crate) fn after_fetch(&mut self, page_len: usize) -> Result<(), Error> {
        self.items = self
            .items
            .checked_add(page_len as u64)
            .ok_or_else(|| Error::Pagination("items overflow".into()))?;
        if self.items > self.caps.max_items {
            return Err(Error::PaginationLimit(
                format!(
                    "max_items reached (max={} seen={})",
                    self.caps.max_items, self.items
                )
                .into(),
            ));
        }
        Ok(())
    }
}
