//! Page-numbered access to sequences fetched on demand.
//!
//! A [`LazySlice`] knows its length up front but only asks its
//! [`RangeSource`] for the window a page actually covers, so a list with
//! millions of entries costs one bounded range read per page.

use crate::error::BoardResult;
use async_trait::async_trait;
use serde::Serialize;

/// Something that can produce the half-open index window `[start, end)`.
#[async_trait]
pub trait RangeSource: Send {
    type Item: Send;

    async fn fetch_range(&mut self, start: u64, end: u64) -> BoardResult<Vec<Self::Item>>;
}

/// A sequence of known length whose items are fetched per slice.
pub struct LazySlice<S> {
    len: u64,
    source: S,
}

impl<S: RangeSource> LazySlice<S> {
    pub fn new(len: u64, source: S) -> Self {
        Self { len, source }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Items in `[start, end)`, clipped to the known length. Empty windows
    /// never reach the source.
    pub async fn slice(&mut self, start: u64, end: u64) -> BoardResult<Vec<S::Item>> {
        let end = end.min(self.len);
        if start >= end {
            return Ok(Vec::new());
        }
        let mut items = self.source.fetch_range(start, end).await?;
        // the sequence may have grown since its length was read
        items.truncate((end - start) as usize);
        Ok(items)
    }
}

/// Splits a sequence into fixed-size, 1-based pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: u64,
}

impl Paginator {
    /// A page size of zero is treated as one.
    pub fn new(per_page: usize) -> Self {
        Self {
            per_page: (per_page as u64).max(1),
        }
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Always at least one page, even for an empty sequence.
    pub fn num_pages(&self, count: u64) -> u64 {
        count.div_ceil(self.per_page).max(1)
    }

    /// Resolve a requested page. Missing or non-numeric input means page 1;
    /// numbers outside the valid range are clamped to the nearest page.
    pub fn resolve(&self, requested: Option<&str>, count: u64) -> u64 {
        let last = self.num_pages(count);
        match requested.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(n)) if n < 1 => 1,
            Some(Ok(n)) => (n as u64).min(last),
            _ => 1,
        }
    }

    /// Fetch page `number` (clamped to the valid range) from `slice`.
    pub async fn page<S: RangeSource>(
        &self,
        slice: &mut LazySlice<S>,
        number: u64,
    ) -> BoardResult<Page<S::Item>> {
        let count = slice.len();
        let num_pages = self.num_pages(count);
        let number = number.clamp(1, num_pages);
        let start = (number - 1) * self.per_page;
        let end = (start + self.per_page).min(count);
        let items = slice.slice(start, end).await?;

        Ok(Page {
            number,
            num_pages,
            count,
            per_page: self.per_page,
            start_index: if count == 0 { 0 } else { start + 1 },
            end_index: end,
            has_previous: number > 1,
            has_next: number < num_pages,
            items,
        })
    }
}

/// One page of items plus what a pager widget needs to render around it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub per_page: u64,
    /// 1-based index of the first item, 0 when empty.
    pub start_index: u64,
    /// 1-based index of the last item.
    pub end_index: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub items: Vec<T>,
}
