//! 🗜️ gzmv — list a bucket, squeeze every object through gzip on the way to another
//! bucket, and (unless told to keep them) delete the originals.
//!
//! The library owns the whole pipeline; `gzmv-cli` just parses flags, loads config,
//! calls [`run`], and prints the verdict. 🦆

pub mod app_config;
mod backends;
mod bridge;
mod error;
mod pipe;
mod supervisors;
mod transfer;

use std::fmt;

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::backends::s3::S3ObjectStore;
use crate::supervisors::Supervisor;

pub use error::TransferOutcome;
pub use supervisors::RunSummary;

/// 💀 The run finished, but not cleanly. The summary is attached so the caller can
/// still show what did get done. Individual failures were already logged as they
/// happened; this error only carries the headline.
#[derive(Debug)]
pub struct RunFailed {
    pub summary: RunSummary,
}

impl fmt::Display for RunFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "finished with errors: {} failure(s)", self.summary.failures)?;
        if self.summary.listing_failed {
            f.write_str(", listing incomplete")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunFailed {}

/// 🚀 Validate the config, connect to both buckets, move everything.
///
/// Returns `Err` if the config is invalid, if either S3 client can't be built
/// (nothing has moved yet in both cases), or if the run recorded any failure, in
/// which case the error is a [`RunFailed`] carrying the summary.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    app_config.validate()?;

    let source = S3ObjectStore::connect(&app_config.source)
        .await
        .context("💀 can't create source s3 client")?;
    let destination = S3ObjectStore::connect(&app_config.destination)
        .await
        .context("💀 can't create destination s3 client")?;

    let summary = Supervisor::new(app_config)
        .run(StoreBackend::S3(source), StoreBackend::S3(destination))
        .await?;

    if summary.is_success() {
        Ok(summary)
    } else {
        Err(RunFailed { summary }.into())
    }
}
