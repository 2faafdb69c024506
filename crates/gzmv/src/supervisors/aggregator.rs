//! 🎬 *[INT. COMPLAINTS DEPARTMENT — a single clerk, infinitely many windows]*
//!
//! 🧯 The ErrorAggregator. Listing can fail, every worker can fail, every object can
//! fail in several places at once, and all of them want to file a complaint
//! *right now*. One clerk takes every complaint, logs it, keeps a tally, and
//! remembers the first one for the final verdict.
//!
//! Filing never blocks: the counter is an unbounded channel. A slow clerk means a
//! long queue, never a stuck worker. 🦆

use std::fmt;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::error::TransferOutcome;

/// 🗺️ Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOrigin {
    Listing,
    Transfer(TransferOutcome),
    /// 🧵 A worker task itself fell over (panicked) rather than a single object.
    Worker,
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureOrigin::Listing => f.write_str("listing failed"),
            FailureOrigin::Transfer(outcome) => write!(f, "transfer {outcome}"),
            FailureOrigin::Worker => f.write_str("worker crashed"),
        }
    }
}

/// 📨 One complaint.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) origin: FailureOrigin,
    pub(crate) key: Option<String>,
    pub(crate) error: anyhow::Error,
}

/// 📮 The complaint slot. Clone it freely; every clone feeds the same clerk.
#[derive(Debug, Clone)]
pub(crate) struct FailureSink {
    tx: Sender<Failure>,
}

impl FailureSink {
    pub(crate) fn report(&self, failure: Failure) {
        // -- 📮 unbounded: try_send only fails once the clerk has gone home
        if let Err(rejected) = self.tx.try_send(failure) {
            let failure = rejected.into_inner();
            warn!(
                "⚠️ failure arrived after the aggregator closed ({}): {:#}",
                failure.origin, failure.error
            );
        }
    }
}

/// 📊 The clerk's end-of-shift summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AggregateReport {
    pub(crate) failures: usize,
    pub(crate) listing_failed: bool,
    pub(crate) first_failure: Option<String>,
}

/// 🧯 The clerk.
#[derive(Debug)]
pub(crate) struct ErrorAggregator {
    handle: JoinHandle<AggregateReport>,
}

impl ErrorAggregator {
    /// 🚀 Open the window. Hand the sink to whoever might fail (everyone).
    pub(crate) fn start() -> (FailureSink, Self) {
        let (tx, rx) = async_channel::unbounded();
        let handle = tokio::spawn(consume(rx));
        (FailureSink { tx }, Self { handle })
    }

    /// 🏁 Wait for the last complaint. Returns once every `FailureSink` clone
    /// has been dropped and the queue is empty.
    pub(crate) async fn drain(self) -> Result<AggregateReport> {
        self.handle
            .await
            .context("💀 the error aggregator task died before it could report")
    }
}

async fn consume(rx: Receiver<Failure>) -> AggregateReport {
    let mut report = AggregateReport::default();
    while let Ok(failure) = rx.recv().await {
        let described = match &failure.key {
            Some(key) => format!("{} for '{key}': {:#}", failure.origin, failure.error),
            None => format!("{}: {:#}", failure.origin, failure.error),
        };
        error!("💀 {described}");

        report.failures += 1;
        report.listing_failed |= failure.origin == FailureOrigin::Listing;
        if report.first_failure.is_none() {
            report.first_failure = Some(described);
        }
    }
    report
}
