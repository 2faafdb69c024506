//! 💀 Errors with name tags.
//!
//! Most of gzmv is happy with `anyhow` and a good `.context(...)`. The per-object
//! pipeline is the exception: when a transfer goes sideways we need to know *where*
//! (read? compress? write? close? delete?) so the outcome can be reported, and a
//! single bridge run can fail in several places at once. So the stages get an enum,
//! and the bridge gets a composite that carries every one of them. 🦆

use std::fmt;

use thiserror::Error;

/// 🎯 What happened to one object. Logged and counted, never retried.
///
/// Variant order is pipeline order. `Ord` leans on that: when a transfer fails in
/// several stages at once, the earliest stage is the one that gets the blame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransferOutcome {
    Succeeded,
    FailedAtRead,
    FailedAtCompress,
    FailedAtWrite,
    FailedAtClose,
    FailedAtDelete,
}

impl TransferOutcome {
    pub fn is_success(self) -> bool {
        self == TransferOutcome::Succeeded
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferOutcome::Succeeded => "succeeded",
            TransferOutcome::FailedAtRead => "failed at read",
            TransferOutcome::FailedAtCompress => "failed at compress",
            TransferOutcome::FailedAtWrite => "failed at write",
            TransferOutcome::FailedAtClose => "failed at close",
            TransferOutcome::FailedAtDelete => "failed at delete",
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 🧯 One thing that broke while moving one object.
#[derive(Debug, Error)]
pub(crate) enum StageError {
    #[error("can't read source object: {0:#}")]
    Read(anyhow::Error),

    #[error("can't compress: {0:#}")]
    Compress(anyhow::Error),

    #[error("can't write to destination: {0:#}")]
    Write(anyhow::Error),

    #[error("can't close {resource}: {error:#}")]
    Close {
        resource: &'static str,
        error: anyhow::Error,
    },

    #[error("can't delete source object: {0:#}")]
    Delete(anyhow::Error),

    /// 🧵 The copy stage task panicked or got aborted before reporting back.
    #[error("copy stage did not finish: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StageError {
    pub(crate) fn outcome(&self) -> TransferOutcome {
        match self {
            StageError::Read(_) => TransferOutcome::FailedAtRead,
            StageError::Compress(_) | StageError::Join(_) => TransferOutcome::FailedAtCompress,
            StageError::Write(_) => TransferOutcome::FailedAtWrite,
            StageError::Close { .. } => TransferOutcome::FailedAtClose,
            StageError::Delete(_) => TransferOutcome::FailedAtDelete,
        }
    }
}

/// 📦 Everything that went wrong during one bridge run, in the order it was recorded.
/// Never empty: a bridge with nothing to complain about returns `Ok`.
#[derive(Debug)]
pub(crate) struct BridgeError {
    pub(crate) failures: Vec<StageError>,
}

impl BridgeError {
    /// The earliest pipeline stage that failed. A broken read usually drags the
    /// upload down with it; the read is the story, the upload is the epilogue.
    pub(crate) fn outcome(&self) -> TransferOutcome {
        self.failures
            .iter()
            .map(StageError::outcome)
            .min()
            .unwrap_or(TransferOutcome::FailedAtWrite)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s) in the compression bridge", self.failures.len())?;
        for (index, failure) in self.failures.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(f, "{separator}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BridgeError {}
