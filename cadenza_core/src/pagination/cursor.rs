use super::{Caps, Decoder, PageFetcher, WalkGuard};
use crate::action::Action;
use crate::error::Error;
use serde::Deserialize;
use std::sync::Arc;

/// Cursor pagination wire shape:
/// `{href, items, limit, next|null, cursors{before?, after?}, total}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorWire<T> {
    pub href: String,
    pub items: Vec<T>,
    pub limit: u32,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub cursors: Cursors,
    pub total: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

/// One cursor-based slice of a paginated result set. Forward-only: there
/// is no previous link, and asking for one is an invalid operation rather
/// than a silent no-op.
pub struct CursorPage<T> {
    href: String,
    items: Vec<T>,
    limit: u32,
    total: u32,
    next: Option<String>,
    cursors: Cursors,
    fetcher: Arc<dyn PageFetcher>,
    decoder: Decoder<CursorWire<T>>,
    caps: Caps,
}

impl<T: Clone> Clone for CursorPage<T> {
    fn clone(&self) -> Self {
        Self {
            href: self.href.clone(),
            items: self.items.clone(),
            limit: self.limit,
            total: self.total,
            next: self.next.clone(),
            cursors: self.cursors.clone(),
            fetcher: self.fetcher.clone(),
            decoder: self.decoder.clone(),
            caps: self.caps,
        }
    }
}

impl<T: Send + 'static> CursorPage<T> {
    pub fn from_wire(
        wire: CursorWire<T>,
        fetcher: Arc<dyn PageFetcher>,
        decoder: Decoder<CursorWire<T>>,
        caps: Caps,
    ) -> Self {
        Self {
            href: wire.href,
            items: wire.items,
            limit: wire.limit,
            total: wire.total,
            next: wire.next,
            cursors: wire.cursors,
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
    pub fn total(&self) -> u32 {
        self.total
    }

    #[inline]
    pub fn next_url(&self) -> Option<&str> {
        self.next.as_deref()
    }

    #[inline]
    pub fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    /// Action yielding the next page, or `None` on the last page.
    pub fn next_action(&self) -> Option<Action<CursorPage<T>>> {
        let url = self.next.clone()?;
        let fetcher = self.fetcher.clone();
        let decoder = self.decoder.clone();
        let caps = self.caps;
        Some(Action::new(move || {
            let url = url.clone();
            let fetcher = fetcher.clone();
            let decoder = decoder.clone();
            async move { fetch_page(&url, fetcher, decoder, caps).await }
        }))
    }

    /// Cursor pages cannot be walked backward.
    pub fn previous_action(&self) -> Result<Action<CursorPage<T>>, Error> {
        Err(Error::Pagination("cursor pages are forward-only".into()))
    }
}

impl<T: Clone + Send + Sync + 'static> CursorPage<T> {
    /// Action walking forward to the end of the chain; yields the seed
    /// page first. Every run performs a fresh traversal.
    pub fn all_pages(&self) -> Action<Vec<CursorPage<T>>> {
        let seed = self.clone();
        Action::new(move || {
            let seed = seed.clone();
            async move { collect_forward(seed).await }
        })
    }

    pub fn all_items(&self) -> Action<Vec<T>> {
        self.all_pages()
            .map(|pages| pages.into_iter().flat_map(CursorPage::into_items).collect())
    }
}

async fn fetch_page<T: Send + 'static>(
    url: &str,
    fetcher: Arc<dyn PageFetcher>,
    decoder: Decoder<CursorWire<T>>,
    caps: Caps,
) -> Result<CursorPage<T>, Error> {
    let body = fetcher.fetch(url).await?;
    let wire = decoder.decode(&body)?;
    Ok(CursorPage::from_wire(wire, fetcher, decoder, caps))
}

async fn collect_forward<T: Clone + Send + Sync + 'static>(
    seed: CursorPage<T>,
) -> Result<Vec<CursorPage<T>>, Error> {
    let mut guard = WalkGuard::new(seed.caps, &seed.href, seed.items.len());
    let mut pages = vec![seed.clone()];
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
