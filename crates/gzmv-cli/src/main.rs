//! 🚀 gzmv-cli — the front door, the bouncer, the maitre d' of gzmv.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, loads config,
//! sets up logging, and then lets the library do the heavy lifting.
//! Like a manager. 🦆

mod summary;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use gzmv::RunFailed;
use gzmv::app_config::{ConfigOverrides, LocationOverrides, RuntimeOverrides};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🗜️ Move objects between buckets, gzipping them on the way.
///
/// Every flag can also come from a TOML file (`--config`) or from `GZMV_*`
/// environment variables (`GZMV_SOURCE__BUCKET=...`). Flags win.
#[derive(Debug, Parser)]
#[command(name = "gzmv", version, about)]
struct Cli {
    /// Region of the source bucket [default: us-east-1]
    #[arg(long)]
    src_region: Option<String>,
    /// Source bucket name
    #[arg(long)]
    src_bucket: Option<String>,
    /// Only move keys starting with this prefix
    #[arg(long)]
    src_prefix: Option<String>,
    /// Region of the destination bucket [default: us-east-1]
    #[arg(long)]
    dst_region: Option<String>,
    /// Destination bucket name
    #[arg(long)]
    dst_bucket: Option<String>,
    /// Prepended to every destination key, as-is (bring your own trailing slash)
    #[arg(long)]
    dst_prefix: Option<String>,
    /// Keep the source objects instead of deleting them after upload
    #[arg(long)]
    keep: bool,
    /// S3 endpoint override for both buckets (localstack, minio, ...)
    #[arg(long)]
    endpoint: Option<String>,
    /// Number of concurrent transfers [default: 4]
    #[arg(long)]
    workers: Option<usize>,
    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// 🔧 Only the flags that were actually given make it into the overrides, so an
    /// omitted flag never stomps on the config file or the environment.
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source: LocationOverrides {
                region: self.src_region.clone(),
                bucket: self.src_bucket.clone(),
                prefix: self.src_prefix.clone(),
                endpoint: self.endpoint.clone(),
            },
            destination: LocationOverrides {
                region: self.dst_region.clone(),
                bucket: self.dst_bucket.clone(),
                prefix: self.dst_prefix.clone(),
                endpoint: self.endpoint.clone(),
            },
            keep_originals: self.keep.then_some(true),
            runtime: RuntimeOverrides {
                worker_count: self.workers,
            },
        }
    }
}

/// 🚀 main() — where it all begins. The "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse flags, load config (the moment of truth)
/// 3. Run the thing (send it and pray 🙏)
/// 4. Print the scoreboard, then either celebrate or exit 1
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing. `RUST_LOG` wins; otherwise info, which is one line per
    // page, per object, per delete, and one at the end.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let started = Instant::now();

    let result = match gzmv::app_config::load_config(cli.config.as_deref(), cli.overrides())
        .context("💀 couldn't load the configuration. Check the flags, the TOML file and any GZMV_* env vars.")
    {
        Ok(app_config) => gzmv::run(app_config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(run_summary) => {
            println!("{}", summary::render(&run_summary, started.elapsed()));
            info!("✅ finished successfully");
            Ok(())
        }
        Err(err) => {
            // -- 📊 a run happened, just not a clean one: show what did get done
            if let Some(failed) = err.downcast_ref::<RunFailed>() {
                println!("{}", summary::render(&failed.summary, started.elapsed()));
            }

            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
            let mut the_vibes_are_giving_credential_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("credentials")
                    || cause_str.contains("AccessDenied")
                    || cause_str.contains("InvalidAccessKeyId")
                {
                    the_vibes_are_giving_credential_issues = true;
                }
            }
            if the_vibes_are_giving_credential_issues {
                error!(
                    "🔧 hint: this smells like an AWS credentials problem. \
                    Check AWS_PROFILE / AWS_ACCESS_KEY_ID, or run `aws sts get-caller-identity` \
                    to see who the SDK thinks you are. ☕"
                );
            }

            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }
}
