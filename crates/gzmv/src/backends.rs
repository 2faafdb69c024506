//! 🔌 Backends — where the real I/O happens.
//!
//! 🪣 An object store does four things: list keys a page at a time, open an object
//! for reading, swallow an upload, and delete. Everything else in gzmv is plumbing
//! between those four verbs.
//!
//! 🎭 This module is the casting agency. S3 plays the lead. The in-memory store is
//! the understudy that shows up for every test rehearsal and never complains.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::{Context, Result, bail};
use async_channel::Sender;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::pipe::PipeReader;

#[cfg(test)]
pub(crate) mod in_mem;
pub(crate) mod s3;

/// 🧠 Type-erased byte stream for one source object. Backends hand out whatever
/// reader they have; the bridge only needs bytes.
pub(crate) type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// 📃 One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ListPage {
    pub(crate) keys: Vec<String>,
    pub(crate) next_continuation: Option<String>,
    /// 🔄 The backend's word on whether more pages exist.
    pub(crate) truncated: bool,
}

/// 🪣 The four verbs of object storage.
///
/// # Contract 📜
/// - `list_page` returns one page; `continuation` is whatever the previous page handed back.
/// - `open_read` fails when the object is missing or unreadable.
/// - `upload` pulls from the pipe until end-of-stream and only then commits the object.
///   An error chunk from the pipe means "abort": nothing may be committed.
/// - `delete` of a key that's already gone is a success. Flaky retries shouldn't page anyone.
#[async_trait]
pub(crate) trait ObjectStore: std::fmt::Debug + Send + Sync {
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage>;

    async fn open_read(&self, key: &str) -> Result<ObjectReader>;

    async fn upload(&self, key: &str, body: &mut PipeReader) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// 🎭 The many faces of an object store — a polymorphic casting call for buckets.
///
/// Cheap to clone: every variant is a handle around shared state, so each worker
/// gets its own copy without anyone fighting over a lock.
#[derive(Debug, Clone)]
pub(crate) enum StoreBackend {
    S3(s3::S3ObjectStore),
    #[cfg(test)]
    InMemory(in_mem::InMemoryObjectStore),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        match self {
            StoreBackend::S3(store) => store.list_page(prefix, continuation).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.list_page(prefix, continuation).await,
        }
    }

    async fn open_read(&self, key: &str) -> Result<ObjectReader> {
        match self {
            StoreBackend::S3(store) => store.open_read(key).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.open_read(key).await,
        }
    }

    async fn upload(&self, key: &str, body: &mut PipeReader) -> Result<()> {
        match self {
            StoreBackend::S3(store) => store.upload(key, body).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.upload(key, body).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            StoreBackend::S3(store) => store.delete(key).await,
            #[cfg(test)]
            StoreBackend::InMemory(store) => store.delete(key).await,
        }
    }
}

/// 📊 How far a listing got before it stopped, successfully or otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ListingReport {
    pub(crate) listed: usize,
    pub(crate) pages: usize,
}

/// 🚰 The listing producer. Walks every page under `prefix` and feeds keys into the
/// queue one at a time, so workers start chewing before the listing is done.
///
/// Returns `Ok` when the backend runs out of pages, or when every worker hung up
/// (nobody left to feed; stopping quietly is the polite move). A page fetch failure
/// returns `Err`; keys already queued stay queued. `report` is updated as it goes so
/// the caller still knows how far we got when it fails.
pub(crate) async fn list_objects(
    store: &impl ObjectStore,
    prefix: &str,
    keys: &Sender<String>,
    report: &mut ListingReport,
) -> Result<()> {
    let mut continuation = None;

    loop {
        let page = store
            .list_page(prefix, continuation.take())
            .await
            .with_context(|| {
                format!(
                    "💀 can't list objects under prefix '{prefix}' (page {})",
                    report.pages + 1
                )
            })?;
        report.pages += 1;

        info!(
            "📃 got {} objects, more available: {}",
            page.keys.len(),
            page.truncated
        );

        for key in page.keys {
            if keys.send(key).await.is_err() {
                debug!("🚪 every worker left the building. listing stops here.");
                return Ok(());
            }
            report.listed += 1;
        }

        if !page.truncated {
            return Ok(());
        }
        match page.next_continuation {
            Some(token) => continuation = Some(token),
            None => bail!(
                "💀 backend says more objects exist under '{prefix}' but gave no continuation token. \
                 A cliffhanger with no sequel."
            ),
        }
    }
}
