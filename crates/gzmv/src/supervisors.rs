//! 🎬 *[camera pans across two buckets, one bloated, one empty]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where objects sat uncompressed for years..."
//! 🎬 "One supervisor dared to squeeze them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor wires the whole run together:
//! ```text
//!   lister ──keys──▶ bounded queue ──▶ WorkerPool (N × TransferWorker)
//!      │                                     │
//!      └──────────── failures ───────────────┴──▶ ErrorAggregator
//! ```
//! It starts the aggregator, the lister and the pool, waits for the pool to drain and
//! the lister to finish, then waits for the aggregator to hear the last complaint.
//!
//! ⚠️ The workers are the supervisor's private minions. Nobody outside gets to `pub` them.

mod aggregator;
mod worker_pool;

use anyhow::Result;
use async_channel::Sender;
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::{ListingReport, StoreBackend, list_objects};
use crate::transfer::TransferTask;
use aggregator::{ErrorAggregator, Failure, FailureOrigin, FailureSink};
use worker_pool::WorkerPool;

/// 📊 The final word on a run.
///
/// `succeeded + failed == listed` whenever every worker survived; a listing failure
/// only shrinks `listed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub listing_failed: bool,
    /// 🧯 Every failure the aggregator heard about: per-object, listing, and worker crashes.
    pub failures: usize,
    pub first_failure: Option<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures == 0 && !self.listing_failed
    }
}

/// 📦 The Supervisor: part middle manager, part helicopter parent.
/// Holds the config, owns nothing else until `run` is called.
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Move everything under the source prefix. Per-object failures never make
    /// this return `Err`: they end up in the summary. `Err` means the run's own
    /// machinery broke.
    pub(crate) async fn run(&self, source: StoreBackend, destination: StoreBackend) -> Result<RunSummary> {
        let runtime = &self.app_config.runtime;
        let (failures, the_aggregator) = ErrorAggregator::start();
        let (keys_tx, keys_rx) = async_channel::bounded(runtime.queue_capacity);

        let the_lister = tokio::spawn(feed_queue(
            source.clone(),
            self.app_config.source.prefix.clone(),
            keys_tx,
            failures.clone(),
        ));

        let the_task = TransferTask {
            source,
            destination,
            destination_prefix: self.app_config.destination.prefix.clone(),
            keep_originals: self.app_config.keep_originals,
            chunk_size: runtime.chunk_size_bytes,
        };
        info!(
            "🚀 moving s3://{}/{}* → s3://{}/{} with {} workers (keep originals: {})",
            self.app_config.source.bucket,
            self.app_config.source.prefix,
            self.app_config.destination.bucket,
            self.app_config.destination.prefix,
            runtime.worker_count,
            self.app_config.keep_originals
        );
        let the_pool = WorkerPool::start(runtime.worker_count, keys_rx, the_task, failures.clone());

        let tally = the_pool.drain().await;
        let listing = match the_lister.await {
            Ok(listing) => listing,
            Err(join_error) => {
                failures.report(Failure {
                    origin: FailureOrigin::Listing,
                    key: None,
                    error: anyhow::Error::new(join_error).context("the listing task did not finish"),
                });
                ListingReport::default()
            }
        };

        // -- 📮 last sink out turns off the lights; the aggregator can finish now
        drop(failures);
        let aggregate = the_aggregator.drain().await?;

        let summary = RunSummary {
            listed: listing.listed,
            pages: listing.pages,
            succeeded: tally.succeeded,
            failed: tally.failed,
            deleted: tally.deleted,
            bytes_read: tally.bytes_read,
            bytes_written: tally.bytes_written,
            listing_failed: aggregate.listing_failed,
            failures: aggregate.failures,
            first_failure: aggregate.first_failure,
        };
        info!(
            "📊 listed {} in {} page(s): {} succeeded, {} failed, {} deleted, {} → {} bytes",
            summary.listed,
            summary.pages,
            summary.succeeded,
            summary.failed,
            summary.deleted,
            summary.bytes_read,
            summary.bytes_written
        );
        Ok(summary)
    }
}

/// 🚰 The lister task. Owns the queue's only sender, so the queue closes the moment
/// this returns, whether the listing finished or broke.
async fn feed_queue(
    source: StoreBackend,
    prefix: String,
    keys: Sender<String>,
    failures: FailureSink,
) -> ListingReport {
    let mut report = ListingReport::default();
    if let Err(error) = list_objects(&source, &prefix, &keys, &mut report).await {
        failures.report(Failure {
            origin: FailureOrigin::Listing,
            key: None,
            error,
        });
    }
    report
}
