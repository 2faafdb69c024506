//! # Previously, on gzmv...
//!
//! 🎬 The buckets were real. The credentials were real. The bill was very real.
//! Somebody had to rehearse the whole migration without touching any of it.
//!
//! That somebody was this module.
//!
//! `InMemoryObjectStore` is a bucket that lives in a `BTreeMap` behind an
//! `Arc<Mutex<...>>`. Clones share the same map, so a test can hand one copy to
//! the pipeline and keep another to peek at the aftermath. It also comes with a
//! box of sabotage tools: keys that refuse to open, streams that die halfway, uploads
//! that bail, deletes that fail, and listings that fall over on a chosen page.
//!
//! ⚠️ Tests only. If you find this in a production binary, please also deploy a therapist.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context as TaskContext, Poll};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::Mutex;

use crate::backends::{ListPage, ObjectReader, ObjectStore};
use crate::pipe::PipeReader;

// -- 📃 small on purpose: tests should hit pagination without seeding a thousand objects
const DEFAULT_PAGE_SIZE: usize = 7;

/// 🧨 The sabotage kit. Each set names the keys a given verb should fail on.
#[derive(Debug, Clone, Default)]
struct Faults {
    fail_open: HashSet<String>,
    fail_mid_read: HashSet<String>,
    fail_upload: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_listing_at_page: Option<usize>,
}

/// 📦 A bucket that never forgets. Unless you drop it.
#[derive(Debug, Clone)]
pub(crate) struct InMemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Bytes>>>,
    /// 🧾 Every committed upload key, in commit order. Lets tests catch double writes.
    commits: Arc<Mutex<Vec<String>>>,
    pages_served: Arc<AtomicUsize>,
    faults: Arc<Faults>,
    page_size: usize,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub(crate) fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            commits: Arc::new(Mutex::new(Vec::new())),
            pages_served: Arc::new(AtomicUsize::new(0)),
            faults: Arc::new(Faults::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub(crate) fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub(crate) fn failing_open(mut self, key: &str) -> Self {
        Arc::make_mut(&mut self.faults)
            .fail_open
            .insert(key.to_string());
        self
    }

    /// 💔 The stream for `key` delivers half the object, then the connection "resets".
    pub(crate) fn failing_mid_read(mut self, key: &str) -> Self {
        Arc::make_mut(&mut self.faults)
            .fail_mid_read
            .insert(key.to_string());
        self
    }

    /// 📵 Uploads to `key` read one chunk, then give up without draining the pipe.
    pub(crate) fn failing_upload(mut self, key: &str) -> Self {
        Arc::make_mut(&mut self.faults)
            .fail_upload
            .insert(key.to_string());
        self
    }

    pub(crate) fn failing_delete(mut self, key: &str) -> Self {
        Arc::make_mut(&mut self.faults)
            .fail_delete
            .insert(key.to_string());
        self
    }

    /// 📃 The `page`-th page fetch (1-based) blows up.
    pub(crate) fn failing_listing_at_page(mut self, page: usize) -> Self {
        Arc::make_mut(&mut self.faults).fail_listing_at_page = Some(page);
        self
    }

    pub(crate) async fn put(&self, key: &str, body: impl Into<Bytes>) {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), body.into());
    }

    pub(crate) async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().await.get(key).cloned()
    }

    pub(crate) async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub(crate) async fn commits(&self) -> Vec<String> {
        self.commits.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    /// 📃 Pages are slices of the sorted key space. The continuation token is simply
    /// the last key handed out, which is exactly as clever as it needs to be.
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let page_number = self.pages_served.fetch_add(1, Ordering::SeqCst) + 1;
        if self.faults.fail_listing_at_page == Some(page_number) {
            bail!("💀 simulated listing failure on page {page_number}");
        }

        let objects = self.objects.lock().await;
        let mut matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.as_ref().is_none_or(|after| *key > after));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let truncated = matching.next().is_some();
        let next_continuation = if truncated { keys.last().cloned() } else { None };

        Ok(ListPage {
            keys,
            next_continuation,
            truncated,
        })
    }

    async fn open_read(&self, key: &str) -> Result<ObjectReader> {
        if self.faults.fail_open.contains(key) {
            bail!("💀 simulated transient failure opening '{key}'");
        }
        let body = self
            .get(key)
            .await
            .ok_or_else(|| anyhow!("💀 no such key '{key}'"))?;

        if self.faults.fail_mid_read.contains(key) {
            let half = body.slice(..body.len() / 2);
            return Ok(Box::new(io::Cursor::new(half).chain(ResetReader)));
        }
        Ok(Box::new(io::Cursor::new(body)))
    }

    async fn upload(&self, key: &str, body: &mut PipeReader) -> Result<()> {
        let mut buffered = Vec::new();

        if self.faults.fail_upload.contains(key) {
            // -- 📵 take one bite, then hang up mid-meal
            let _ = body.next_chunk().await;
            bail!("💀 simulated upload failure for '{key}'");
        }

        while let Some(chunk) = body.next_chunk().await? {
            buffered.extend_from_slice(&chunk);
        }

        self.objects
            .lock()
            .await
            .insert(key.to_string(), Bytes::from(buffered));
        self.commits.lock().await.push(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.faults.fail_delete.contains(key) {
            bail!("💀 simulated delete failure for '{key}'");
        }
        // -- ✅ already gone? still a success.
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

/// 💔 A reader whose only skill is failing.
struct ResetReader;

impl AsyncRead for ResetReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "simulated connection reset",
        )))
    }
}
