//! 🔧 App Configuration — the sacred TOML-to-struct pipeline, now with buckets.
//!
//! 📡 "Bucket not found: We looked everywhere. Under the couch. Behind the fridge.
//! In us-east-1. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Three layers, merged in this order, last one wins:
//!   1. `GZMV_*` environment variables (nested keys split on `__`)
//!   2. an optional TOML file
//!   3. flags from the command line (only the ones actually passed)

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// 🌎 Where buckets live when nobody bothered to say otherwise. The Florida of AWS.
pub const DEFAULT_REGION: &str = "us-east-1";

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the gzip bind them.
///
/// Immutable once loaded; the supervisor gets its own copy and nobody mutates it
/// behind anyone's back. No package-level globals were harmed.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// 🚰 Where the uncompressed objects are lounging right now.
    #[serde(default)]
    pub source: Location,
    /// 🕳️ Where the `.gz` versions will land.
    #[serde(default)]
    pub destination: Location,
    /// 🔒 Keep the originals after a successful copy. Default: no, they get deleted.
    #[serde(default, alias = "keep")]
    pub keep_originals: bool,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🪣 A path in object storage: region, bucket, and a key prefix.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Location {
    #[serde(default = "default_region")]
    pub region: String,
    /// 💀 Empty means "nobody told us". `validate()` turns that into an error.
    #[serde(default)]
    pub bucket: String,
    /// 🎯 Source side: a key filter. Destination side: glued in front of every new key.
    #[serde(default)]
    pub prefix: String,
    /// 🧪 Endpoint override for S3-compatible stores and localstack. Flips on path-style addressing.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for Location {
    fn default() -> Self {
        Self {
            region: default_region(),
            bucket: String::new(),
            prefix: String::new(),
            endpoint: None,
        }
    }
}

/// 🧵 Knobs for the pipeline itself. How many workers, how deep the key queue,
/// how big a bite we take out of each source object per read.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_count", alias = "workers")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,
}

// 🧵 four workers. the original number, chosen by a committee of one.
fn default_worker_count() -> usize {
    4
}

// 📬 keys are tiny. sixteen of them in flight costs less than this comment.
fn default_queue_capacity() -> usize {
    16
}

// 📏 64 KiB per read — 64 * 1024 = 65536. yes, the comment is doing the math again.
fn default_chunk_size_bytes() -> usize {
    64 * 1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            chunk_size_bytes: default_chunk_size_bytes(),
        }
    }
}

/// 🚩 Values that came from the command line. Every field is optional, and only the
/// ones that are `Some` get layered on top of env + file. `None` means "I didn't say".
#[derive(Debug, Serialize, Clone, Default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "LocationOverrides::is_empty")]
    pub source: LocationOverrides,
    #[serde(skip_serializing_if = "LocationOverrides::is_empty")]
    pub destination: LocationOverrides,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_originals: Option<bool>,
    #[serde(skip_serializing_if = "RuntimeOverrides::is_empty")]
    pub runtime: RuntimeOverrides,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct LocationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl LocationOverrides {
    fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.bucket.is_none()
            && self.prefix.is_none()
            && self.endpoint.is_none()
    }
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct RuntimeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,
}

impl RuntimeOverrides {
    fn is_empty(&self) -> bool {
        self.worker_count.is_none()
    }
}

/// 🚀 Load the config — env vars, then the optional TOML file, then CLI flags.
///
/// 📐 DESIGN NOTE (no cap, this is tribal knowledge):
///   - `config_file_name` None → env + flags. No file. No assumptions.
///   - `config_file_name` Some → env + file + flags. The file beats env, flags beat everyone.
///
/// Returns the merged config, already validated. An invalid config is fatal before
/// a single object moves.
pub fn load_config(
    config_file_name: Option<&Path>,
    overrides: ConfigOverrides,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("GZMV_").split("__"));

    let config = match config_file_name {
        // -- 🔒 figment shrugs at a missing file; a typo'd --config path deserves better
        Some(file_name) if !file_name.exists() => bail!(
            "💀 Configuration file '{}' doesn't exist. If it's a relative path, double check the cwd, \
             or use an absolute path to be absolutely certain.",
            file_name.display()
        ),
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let config = config.merge(Serialized::defaults(overrides));

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables (GZMV_*) \
             and flags. The file exists in our hearts, but apparently not in valid TOML.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (GZMV_*) and flags. \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config.validate()?;
    Ok(app_config)
}

impl AppConfig {
    /// 🔒 The bouncer. Empty regions, empty buckets and zero-sized pools don't get in.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;

        if self.runtime.worker_count == 0 {
            bail!("💀 invalid worker count 0. Zero workers migrate zero objects, very efficiently.");
        }
        if self.runtime.queue_capacity == 0 {
            bail!("💀 invalid queue capacity 0. The key queue needs room for at least one key.");
        }
        if self.runtime.chunk_size_bytes == 0 {
            bail!("💀 invalid chunk size 0. Reading zero bytes at a time is a lifestyle, not a plan.");
        }
        Ok(())
    }
}

impl Location {
    fn validate(&self, side: &str) -> anyhow::Result<()> {
        if self.region.trim().is_empty() {
            bail!("💀 invalid {side} region '{}'", self.region);
        }
        if self.bucket.trim().is_empty() {
            bail!("💀 invalid {side} bucket '{}'", self.bucket);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    // 🔒 Every test runs inside a Jail: env vars and cwd are process-global, and
    // parallel tests poking at GZMV_* would otherwise read each other's mail.
    fn load_in_jail(overrides: ConfigOverrides) -> figment::error::Result<AppConfig> {
        load_config(Some(Path::new("gzmv.toml")), overrides)
            .map_err(|e| figment::Error::from(format!("{e:#}")))
    }

    #[test]
    fn the_one_where_a_full_toml_file_parses_into_both_locations() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "gzmv.toml",
                r#"
                keep_originals = true

                [source]
                region = "eu-west-1"
                bucket = "fat-logs"
                prefix = "a-"

                [destination]
                bucket = "skinny-logs"
                prefix = "new-dir/"
                endpoint = "http://localhost:4566"

                [runtime]
                worker_count = 8
                "#,
            )?;

            let app_config = load_in_jail(ConfigOverrides::default())?;

            assert_eq!(app_config.source.region, "eu-west-1");
            assert_eq!(app_config.source.bucket, "fat-logs");
            assert_eq!(app_config.source.prefix, "a-");
            assert_eq!(app_config.destination.region, DEFAULT_REGION);
            assert_eq!(app_config.destination.prefix, "new-dir/");
            assert_eq!(
                app_config.destination.endpoint.as_deref(),
                Some("http://localhost:4566")
            );
            assert!(app_config.keep_originals);
            assert_eq!(app_config.runtime.worker_count, 8);
            assert_eq!(app_config.runtime.queue_capacity, 16);
            assert_eq!(app_config.runtime.chunk_size_bytes, 64 * 1024);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_flags_beat_the_file_and_the_file_beats_env() {
        Jail::expect_with(|jail| {
            jail.set_env("GZMV_SOURCE__BUCKET", "from-env");
            jail.set_env("GZMV_SOURCE__PREFIX", "env-prefix-");
            jail.set_env("GZMV_DESTINATION__BUCKET", "env-dst");
            jail.create_file(
                "gzmv.toml",
                r#"
                [source]
                bucket = "from-file"
                "#,
            )?;

            let overrides = ConfigOverrides {
                destination: LocationOverrides {
                    bucket: Some("from-flag".to_string()),
                    ..Default::default()
                },
                keep_originals: Some(true),
                runtime: RuntimeOverrides {
                    worker_count: Some(2),
                },
                ..Default::default()
            };

            let app_config = load_in_jail(overrides)?;

            assert_eq!(app_config.source.bucket, "from-file");
            // -- 🎯 the file said nothing about the prefix, so env still gets a word in
            assert_eq!(app_config.source.prefix, "env-prefix-");
            assert_eq!(app_config.destination.bucket, "from-flag");
            assert!(app_config.keep_originals);
            assert_eq!(app_config.runtime.worker_count, 2);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_env_alone_is_enough_without_a_file() {
        Jail::expect_with(|jail| {
            jail.set_env("GZMV_SOURCE__BUCKET", "env-src");
            jail.set_env("GZMV_DESTINATION__BUCKET", "env-dst");
            jail.set_env("GZMV_RUNTIME__QUEUE_CAPACITY", "3");

            let app_config = load_config(None, ConfigOverrides::default())
                .map_err(|e| figment::Error::from(format!("{e:#}")))?;

            assert_eq!(app_config.source.bucket, "env-src");
            assert_eq!(app_config.destination.bucket, "env-dst");
            assert_eq!(app_config.runtime.queue_capacity, 3);
            assert!(!app_config.keep_originals);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_a_missing_bucket_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "gzmv.toml",
                r#"
                [source]
                bucket = "only-half-configured"
                "#,
            )?;

            let the_error = load_in_jail(ConfigOverrides::default())
                .expect_err("💀 No destination bucket should not be a valid config.");
            assert!(
                the_error.to_string().contains("invalid destination bucket"),
                "unexpected error: {the_error}"
            );
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_old_keep_flag_name_still_works() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "gzmv.toml",
                r#"
                keep = true

                [source]
                bucket = "s"

                [destination]
                bucket = "d"

                [runtime]
                workers = 3
                "#,
            )?;

            let app_config = load_in_jail(ConfigOverrides::default())?;
            assert!(app_config.keep_originals);
            assert_eq!(app_config.runtime.worker_count, 3);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_a_typo_in_the_config_path_is_not_silently_ignored() {
        Jail::expect_with(|_jail| {
            let the_error = load_in_jail(ConfigOverrides::default())
                .expect_err("a missing config file must be reported");
            assert!(the_error.to_string().contains("doesn't exist"));
            Ok(())
        });
    }

    #[test]
    fn the_one_where_an_empty_region_is_rejected() {
        let app_config = AppConfig {
            source: Location {
                region: String::new(),
                bucket: "b".to_string(),
                ..Default::default()
            },
            destination: Location {
                bucket: "d".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let the_error = app_config.validate().expect_err("empty region must fail");
        assert!(the_error.to_string().contains("invalid source region"));
    }

    #[test]
    fn the_one_where_zero_workers_get_shown_the_door() {
        let mut app_config = AppConfig {
            source: Location {
                bucket: "b".to_string(),
                ..Default::default()
            },
            destination: Location {
                bucket: "d".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(app_config.validate().is_ok());

        app_config.runtime.worker_count = 0;
        assert!(app_config.validate().is_err());
    }
}
