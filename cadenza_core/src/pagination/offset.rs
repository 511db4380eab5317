use super::{Caps, Decoder, PageFetcher, WalkGuard};
use crate::action::Action;
use crate::error::Error;
use serde::Deserialize;
use std::sync::Arc;

/// Offset pagination wire shape:
/// `{href, items, limit, next|null, previous|null, offset, total}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageWire<T> {
    pub href: String,
    pub items: Vec<T>,
    pub limit: u32,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub offset: u32,
    pub total: u32,
}

/// One offset-based slice of a paginated result set, traversable in both
/// directions.
///
/// A page is a terminal snapshot: following a link produces a new `Action`
/// yielding the neighbouring page, never a mutation of this one. `total`
/// reflects the server's count at fetch time for this response only.
pub struct Page<T> {
    href: String,
    items: Vec<T>,
    limit: u32,
    offset: u32,
    total: u32,
    next: Option<String>,
    previous: Option<String>,
    fetcher: Arc<dyn PageFetcher>,
    decoder: Decoder<PageWire<T>>,
    caps: Caps,
}

impl<T: Clone> Clone for Page<T> {
    fn clone(&self) -> Self {
        Self {
            href: self.href.clone(),
            items: self.items.clone(),
            limit: self.limit,
            offset: self.offset,
            total: self.total,
            next: self.next.clone(),
            previous: self.previous.clone(),
            fetcher: self.fetcher.clone(),
            decoder: self.decoder.clone(),
            caps: self.caps,
        }
    }
}

impl<T: Send + 'static> Page<T> {
    pub fn from_wire(
        wire: PageWire<T>,
        fetcher: Arc<dyn PageFetcher>,
        decoder: Decoder<PageWire<T>>,
        caps: Caps,
    ) -> Self {
        Self {
            href: wire.href,
            items: wire.items,
            limit: wire.limit,
            offset: wire.offset,
            total: wire.total,
            next: wire.next,
            previous: wire.previous,
            fetcher,
            decoder,
            caps,
        }
    }

    #[inline]
    pub fn href(&self) -> &str {
        &self.href
    }

    #[inline]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[inline]
    pub fn next_url(&self) -> Option<&str> {
        self.next.as_deref()
    }

    #[inline]
    pub fn previous_url(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Action yielding the next page, or `None` on the last page.
    pub fn next_action(&self) -> Option<Action<Page<T>>> {
        self.next.clone().map(|url| self.follow(url))
    }

    /// Action yielding the previous page, or `None` on the first page.
    pub fn previous_action(&self) -> Option<Action<Page<T>>> {
        self.previous.clone().map(|url| self.follow(url))
    }

    fn follow(&self, url: String) -> Action<Page<T>> {
        let fetcher = self.fetcher.clone();
        let decoder = self.decoder.clone();
        let caps = self.caps;
        Action::new(move || {
            let url = url.clone();
            let fetcher = fetcher.clone();
            let decoder = decoder.clone();
            async move { fetch_page(&url, fetcher, decoder, caps).await }
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Page<T> {
    /// Action that walks the whole link chain and yields every page in
    /// forward chronological order, regardless of which page it starts
    /// from. Every run performs a fresh traversal.
    pub fn all_pages(&self) -> Action<Vec<Page<T>>> {
        let seed = self.clone();
        Action::new(move || {
            let seed = seed.clone();
            async move { collect_chain(seed).await }
        })
    }

    /// Action yielding the items of every page in the chain, concatenated
    /// in the single published ordering.
    pub fn all_items(&self) -> Action<Vec<T>> {
        self.all_pages()
            .map(|pages| pages.into_iter().flat_map(Page::into_items).collect())
    }
}

async fn fetch_page<T: Send + 'static>(
    url: &str,
    fetcher: Arc<dyn PageFetcher>,
    decoder: Decoder<PageWire<T>>,
    caps: Caps,
) -> Result<Page<T>, Error> {
    let body = fetcher.fetch(url).await?;
    let wire = decoder.decode(&body)?;
    Ok(Page::from_wire(wire, fetcher, decoder, caps))
}

/// Walks backward to the chain head, then forward to the tail:
/// reversed-backward pages, the seed, then the forward pages.
async fn collect_chain<T: Clone + Send + Sync + 'static>(
    seed: Page<T>,
) -> Result<Vec<Page<T>>, Error> {
    let mut guard = WalkGuard::new(seed.caps, &seed.href, seed.items.len());

    let mut back: Vec<Page<T>> = Vec::new();
    let mut prev_url = seed.previous.clone();
    while let Some(url) = prev_url {
        guard.before_fetch(&url)?;
        let page = fetch_page(&url, seed.fetcher.clone(), seed.decoder.clone(), seed.caps).await?;
        guard.after_fetch(page.items.len())?;
        prev_url = page.previous.clone();
        back.push(page);
    }
    back.reverse();

    let mut pages = back;
    pages.push(seed.clone());

    let mut next_url = seed.next.clone();
    while let Some(url) = next_url {
        guard.before_fetch(&url)?;
        let page = fetch_page(&url, seed.fetcher.clone(), seed.decoder.clone(), seed.caps).await?;
        guard.after_fetch(page.items.len())?;
        next_url = page.next.clone();
        pages.push(page);
    }

    Ok(pages)
}
