//! 🎬 *[a queue fills with keys. somewhere, four workers crack their knuckles.]*
//!
//! 🧵 The worker pool. A fixed crew of `TransferWorker`s sharing one key queue, one
//! failure sink, and one `JoinSet` to wait on. Each worker pulls a key, moves the
//! object, files a complaint if it went badly, and goes back for more until the
//! queue is closed and empty.
//!
//! 🔄 Worker life cycle: `Idle → Running(key) → Idle → … → Terminated`.
//! A worker never stops because one object failed. It stops because there's
//! nothing left to do, which is the only acceptable reason to stop working. 🦆

use std::ops::AddAssign;

use async_channel::Receiver;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use super::aggregator::{Failure, FailureOrigin, FailureSink};
use crate::transfer::{TransferReport, TransferTask};

/// 📊 What one worker (or, summed up, the whole pool) got done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WorkerTally {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) deleted: usize,
    pub(crate) bytes_read: u64,
    pub(crate) bytes_written: u64,
}

impl WorkerTally {
    fn record(&mut self, report: &TransferReport) {
        if report.outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if report.deleted {
            self.deleted += 1;
        }
        self.bytes_read += report.bytes_read;
        self.bytes_written += report.bytes_written;
    }
}

impl AddAssign for WorkerTally {
    fn add_assign(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.deleted += other.deleted;
        self.bytes_read += other.bytes_read;
        self.bytes_written += other.bytes_written;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Running(String),
    Terminated,
}

/// 👷 One member of the crew.
#[derive(Debug)]
struct TransferWorker {
    id: usize,
    keys: Receiver<String>,
    task: TransferTask,
    failures: FailureSink,
    state: WorkerState,
}

impl TransferWorker {
    fn new(id: usize, keys: Receiver<String>, task: TransferTask, failures: FailureSink) -> Self {
        Self {
            id,
            keys,
            task,
            failures,
            state: WorkerState::Idle,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        match &next {
            WorkerState::Running(key) => trace!("👷 worker {} picked up '{key}'", self.id),
            WorkerState::Idle => trace!("👷 worker {} is idle again", self.id),
            WorkerState::Terminated if self.state != WorkerState::Idle => {
                debug!("⚠️ worker {} terminated from {:?}", self.id, self.state)
            }
            WorkerState::Terminated => trace!("👷 worker {} terminated", self.id),
        }
        self.state = next;
    }

    async fn run(mut self) -> WorkerTally {
        debug!("👷 worker {} clocked in", self.id);
        let mut tally = WorkerTally::default();

        // -- 🏁 recv fails only once the queue is closed *and* empty
        while let Ok(key) = self.keys.recv().await {
            self.transition(WorkerState::Running(key.clone()));

            let mut report = self.task.execute(&key).await;
            tally.record(&report);
            if let Some(cause) = report.cause.take() {
                self.failures.report(Failure {
                    origin: FailureOrigin::Transfer(report.outcome),
                    key: Some(report.key),
                    error: cause,
                });
            }

            self.transition(WorkerState::Idle);
        }

        self.transition(WorkerState::Terminated);
        debug!(
            "🏁 worker {} clocked out: {} ok, {} failed",
            self.id, tally.succeeded, tally.failed
        );
        tally
    }
}

/// 🧵 The crew, plus the barrier that tells us when they've all gone home.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    workers: JoinSet<WorkerTally>,
    failures: FailureSink,
}

impl WorkerPool {
    /// 🚀 Spawn `worker_count` workers on `keys`. The pool keeps no receiver of its
    /// own, so once every worker is gone the listing producer's sends fail
    /// and it stops.
    pub(crate) fn start(
        worker_count: usize,
        keys: Receiver<String>,
        task: TransferTask,
        failures: FailureSink,
    ) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let the_worker = TransferWorker::new(id, keys.clone(), task.clone(), failures.clone());
            workers.spawn(the_worker.run());
        }
        drop(keys);
        Self { workers, failures }
    }

    /// 🏁 Wait for every worker and sum up their tallies. A worker that panicked
    /// is reported as a failure; its tally is lost with it.
    pub(crate) async fn drain(mut self) -> WorkerTally {
        let mut total = WorkerTally::default();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(tally) => total += tally,
                Err(join_error) => self.failures.report(Failure {
                    origin: FailureOrigin::Worker,
                    key: None,
                    error: anyhow::Error::new(join_error).context("a transfer worker did not finish"),
                }),
            }
        }
        total
    }
}
