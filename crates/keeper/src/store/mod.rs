// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value storage shared by sessions and refresh markers.
//!
//! Backends only guarantee per-key atomicity. Enumeration is keyset-paginated
//! so callers never hold the full key space in memory.

pub mod fs;
pub mod memory;

use async_trait::async_trait;

pub use fs::FsKv;
pub use memory::MemoryKv;

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Up to `limit` keys starting with `prefix` and strictly greater than
    /// `after`, in ascending byte order.
    async fn scan(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<String>>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;

    /// Write `value` only if the key currently holds exactly `expected`.
    ///
    /// Returns `false` and leaves the key untouched when it is missing or
    /// holds anything else. The check and the write are atomic with respect
    /// to every other write through the same store.
    async fn compare_and_put(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> anyhow::Result<bool>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;
}

/// Walk every key under `prefix`, one page at a time.
pub struct KeyPager<'a> {
    kv: &'a dyn KvStore,
    prefix: &'a str,
    cursor: Option<String>,
    page_size: usize,
    done: bool,
}

impl<'a> KeyPager<'a> {
    pub fn new(kv: &'a dyn KvStore, prefix: &'a str, page_size: usize) -> Self {
        Self { kv, prefix, cursor: None, page_size: page_size.max(1), done: false }
    }

    /// Fetch the next page. `None` once the key space is exhausted.
    pub async fn next_page(&mut self) -> anyhow::Result<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let page = self.kv.scan(self.prefix, self.cursor.as_deref(), self.page_size).await?;
        if page.len() < self.page_size {
            self.done = true;
        }
        match page.last() {
            Some(last) => self.cursor = Some(last.clone()),
            None => return Ok(None),
        }
        Ok(Some(page))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
