//! Lazy, paged result cursors
//!
//! A [`Cursor`] pulls one page at a time from its [`PageSource`]. Each
//! page is read under its own consistent view; the cursor keeps only the
//! position of the last item, so later pages reflect commits made in
//! between. An empty page ends the cursor.

use std::collections::VecDeque;
use std::sync::Arc;

use labcore_core::LabResult;
use labcore_storage::{KeyRange, Record, RecordKey, ShardedStore};

use crate::cancel::CancellationToken;
use crate::database::Database;

/// Producer of result pages
pub trait PageSource: Send {
    /// Item type
    type Item;

    /// Up to `limit` items after the previous page; empty when done
    fn fetch(&mut self, limit: usize) -> LabResult<Vec<Self::Item>>;
}

/// Iterator over paged results
///
/// Yields `Err` at most once; the cursor is finished afterwards.
pub struct Cursor<T> {
    source: Box<dyn PageSource<Item = T>>,
    page_size: usize,
    buffer: VecDeque<T>,
    cancel: Option<CancellationToken>,
    finished: bool,
}

impl<T> Cursor<T> {
    /// Wrap a page source
    pub fn new(source: impl PageSource<Item = T> + 'static, page_size: usize) -> Self {
        Cursor {
            source: Box::new(source),
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            cancel: None,
            finished: false,
        }
    }

    /// Check `token` before every page
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Items fetched per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Next page of items; empty once the cursor is exhausted
    pub fn next_page(&mut self) -> LabResult<Vec<T>> {
        if !self.buffer.is_empty() {
            return Ok(self.buffer.drain(..).collect());
        }
        self.pull()
    }

    /// Drain the cursor into a vector, stopping at the first error
    pub fn collect_all(self) -> LabResult<Vec<T>> {
        self.collect()
    }

    fn pull(&mut self) -> LabResult<Vec<T>> {
        if self.finished {
            return Ok(Vec::new());
        }
        let page = self
            .cancel
            .as_ref()
            .map_or(Ok(()), |token| token.check())
            .and_then(|_| self.source.fetch(self.page_size));
        match page {
            Ok(items) => {
                if items.is_empty() {
                    self.finished = true;
                }
                Ok(items)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }
}

impl<T> Iterator for Cursor<T> {
    type Item = LabResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.buffer.pop_front() {
            return Some(Ok(item));
        }
        match self.pull() {
            Ok(items) => {
                self.buffer.extend(items);
                self.buffer.pop_front().map(Ok)
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("page_size", &self.page_size)
            .field("buffered", &self.buffer.len())
            .field("finished", &self.finished)
            .finish()
    }
}

// =============================================================================
// Key range sources
// =============================================================================

/// Maps one stored row to a cursor item, or skips it with `None`
pub type RowMapper<T> =
    Box<dyn FnMut(&ShardedStore, RecordKey, Record) -> LabResult<Option<T>> + Send>;

/// Walks a list of key ranges in order, mapping and filtering rows
///
/// Filtering happens before the page limit, so pages are full until the
/// ranges run out.
pub struct RangeSource<T> {
    db: Arc<Database>,
    ranges: VecDeque<KeyRange>,
    resume: Option<RecordKey>,
    map: RowMapper<T>,
}

impl<T> RangeSource<T> {
    /// Source over `ranges`, visited in the given order
    pub fn new(db: Arc<Database>, ranges: Vec<KeyRange>, map: RowMapper<T>) -> Self {
        RangeSource {
            db,
            ranges: ranges.into(),
            resume: None,
            map,
        }
    }
}

impl<T: Send> PageSource for RangeSource<T> {
    type Item = T;

    fn fetch(&mut self, limit: usize) -> LabResult<Vec<T>> {
        let db = Arc::clone(&self.db);
        db.read(|store| {
            let mut out = Vec::new();
            while out.len() < limit {
                let Some(base) = self.ranges.front() else {
                    break;
                };
                let range = match &self.resume {
                    Some(key) => base.clone().after(key.clone()),
                    None => base.clone(),
                };
                let want = limit - out.len();
                let rows = store.range(&range, want)?;
                let exhausted = rows.len() < want;
                for (key, versioned) in rows {
                    self.resume = Some(key.clone());
                    if let Some(item) = (self.map)(store, key, versioned.record)? {
                        out.push(item);
                    }
                }
                if exhausted {
                    self.ranges.pop_front();
                    self.resume = None;
                }
            }
            Ok(out)
        })
    }
}
