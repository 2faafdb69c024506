//! 📦 One key, one journey: open → squeeze → upload → (maybe) delete.
//!
//! `TransferTask` is the per-object unit of work. A worker hands it a key; it hands
//! back a `TransferReport`. It never returns an error and it never panics at you.
//! Whatever went wrong is written down in the report, and the worker takes it
//! from there. 🦆

use anyhow::Context;
use tracing::info;

use crate::backends::{ObjectStore, StoreBackend};
use crate::bridge;
use crate::error::{StageError, TransferOutcome};

pub(crate) const COMPRESSED_SUFFIX: &str = ".gz";

/// 🏷️ The last `/`-separated element of `key`, trailing slashes ignored.
/// `""` → `"."`, `"///"` → `"/"`, `"a/b/"` → `"b"`.
pub(crate) fn base_name(key: &str) -> &str {
    if key.is_empty() {
        return ".";
    }
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(slash) => &trimmed[slash + 1..],
        None => trimmed,
    }
}

/// 🎯 `prefix + base_name(key) + ".gz"`. Plain concatenation: the prefix brings its
/// own trailing slash if it wants one.
pub(crate) fn destination_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{}{COMPRESSED_SUFFIX}", base_name(key))
}

/// 🧾 How one object's journey ended.
#[derive(Debug)]
pub(crate) struct TransferReport {
    pub(crate) key: String,
    pub(crate) destination_key: String,
    pub(crate) outcome: TransferOutcome,
    pub(crate) bytes_read: u64,
    pub(crate) bytes_written: u64,
    /// 🗑️ `true` only if the source object was actually removed.
    pub(crate) deleted: bool,
    /// 💀 Set whenever `outcome` isn't `Succeeded`.
    pub(crate) cause: Option<anyhow::Error>,
}

impl TransferReport {
    fn new(key: &str, destination_key: String) -> Self {
        Self {
            key: key.to_string(),
            destination_key,
            outcome: TransferOutcome::Succeeded,
            bytes_read: 0,
            bytes_written: 0,
            deleted: false,
            cause: None,
        }
    }

    fn failed(mut self, outcome: TransferOutcome, cause: anyhow::Error) -> Self {
        self.outcome = outcome;
        self.cause = Some(cause);
        self
    }

    fn failed_at(self, stage: StageError) -> Self {
        self.failed(stage.outcome(), stage.into())
    }
}

/// 🚚 Everything a worker needs to move objects. Cloned once per worker;
/// the backends inside are shared handles.
#[derive(Debug, Clone)]
pub(crate) struct TransferTask {
    pub(crate) source: StoreBackend,
    pub(crate) destination: StoreBackend,
    pub(crate) destination_prefix: String,
    pub(crate) keep_originals: bool,
    pub(crate) chunk_size: usize,
}

impl TransferTask {
    pub(crate) async fn execute(&self, key: &str) -> TransferReport {
        let report = TransferReport::new(key, destination_key(&self.destination_prefix, key));

        let source = match self.source.open_read(key).await {
            Ok(source) => source,
            Err(error) => {
                return report.failed_at(StageError::Read(
                    error.context(format!("can't open '{key}' for reading")),
                ));
            }
        };

        let bridged = bridge::compress_and_upload(
            source,
            &self.destination,
            &report.destination_key,
            self.chunk_size,
        )
        .await;
        let mut report = match bridged {
            Ok(stats) => TransferReport {
                bytes_read: stats.bytes_read,
                bytes_written: stats.bytes_written,
                ..report
            },
            Err(bridge_error) => {
                let outcome = bridge_error.outcome();
                let cause = anyhow::Error::new(bridge_error)
                    .context(format!("can't move '{key}' to '{}'", report.destination_key));
                return report.failed(outcome, cause);
            }
        };

        info!(
            "📦 copied {} → {} ({} → {} bytes)",
            report.key, report.destination_key, report.bytes_read, report.bytes_written
        );

        if self.keep_originals {
            return report;
        }

        // -- 🗑️ the copy is the source of truth now. a failed delete doesn't undo it.
        match self
            .source
            .delete(key)
            .await
            .with_context(|| format!("copied '{key}' but can't remove the original"))
        {
            Ok(()) => {
                report.deleted = true;
                info!("🗑️ removed {key}");
                report
            }
            Err(error) => report.failed_at(StageError::Delete(error)),
        }
    }
}
