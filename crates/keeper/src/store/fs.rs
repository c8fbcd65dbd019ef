// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-backed store: one file per key with atomic writes.

use std::collections::hash_map::DefaultHasher;
use std::collections::BinaryHeap;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::KvStore;

const TMP_SUFFIX: &str = ".tmp";

/// Number of write lock stripes; keys hash onto one of them.
const LOCK_STRIPES: usize = 64;

/// Stores each key as a file named by the hex encoding of the key.
///
/// Hex keeps DIDs (which contain `:` and `%`) filesystem-safe and preserves
/// byte order between names and keys. Writes to one key are serialized
/// through a striped lock so `compare_and_put` is atomic in-process.
#[derive(Debug)]
pub struct FsKv {
    root: PathBuf,
    tmp_seq: AtomicU32,
    stripes: Vec<Mutex<()>>,
}

impl FsKv {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let stripes = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Ok(Self { root, tmp_seq: AtomicU32::new(0), stripes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key))
    }

    fn key_for(name: &str) -> Option<String> {
        if name.ends_with(TMP_SUFFIX) {
            return None;
        }
        let bytes = hex::decode(name).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % LOCK_STRIPES as u64) as usize;
        self.stripes[idx].lock().await
    }

    async fn read(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a unique temp file, then rename over the target.
    ///
    /// The temp name carries PID + counter so concurrent writers never share
    /// a temp file. Callers hold the key's stripe lock.
    async fn write(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!("{}.{}.{}{TMP_SUFFIX}", hex::encode(key), std::process::id(), seq);
        let tmp_path = self.root.join(tmp_name);
        tokio::fs::write(&tmp_path, value).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FsKv {
    /// Streams the directory once, keeping only the `limit` smallest
    /// qualifying keys in a bounded max-heap.
    async fn scan(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut smallest: BinaryHeap<String> = BinaryHeap::with_capacity(limit + 1);
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(Self::key_for) else {
                continue;
            };
            if !key.starts_with(prefix) || after.is_some_and(|a| key.as_str() <= a) {
                continue;
            }
            if smallest.len() == limit {
                match smallest.peek() {
                    Some(largest) if key < *largest => {
                        smallest.pop();
                    }
                    _ => continue,
                }
            }
            smallest.push(key);
        }
        Ok(smallest.into_sorted_vec())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.read(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let _guard = self.lock(key).await;
        self.write(key, value).await
    }

    async fn compare_and_put(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> anyhow::Result<bool> {
        let _guard = self.lock(key).await;
        match self.read(key).await? {
            Some(current) if current == expected => {
                self.write(key, value).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let _guard = self.lock(key).await;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
