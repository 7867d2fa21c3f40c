use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;

/// Upper bound the engine enforces on query budgets, matching the widest
/// range the API accepts.
pub const MAX_BUDGET_MINUTES: u32 = 120;

/// Runtime settings, each overridable through a `TRANSITREACH_*` environment
/// variable. Defaults point at the Munich MVV open-data feed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gtfs_url: String,
    /// Attribution string surfaced through the metadata endpoint.
    pub data_source: String,
    pub data_dir: PathBuf,
    /// Seconds assumed for a transfer rule that carries no duration.
    pub default_transfer_time: u32,
    pub port: u16,
    /// Bearer token guarding the admin update endpoint; unset disables it.
    pub admin_token: Option<String>,
}

impl Settings {
    pub fn from_env() -> Settings {
        Settings {
            gtfs_url: env_or(
                "TRANSITREACH_GTFS_URL",
                "https://www.mvv-muenchen.de/fileadmin/mediapool/02-Fahrplanauskunft/03-Downloads/openData/gesamt_gtfs.zip",
            ),
            data_source: env_or(
                "TRANSITREACH_DATA_SOURCE",
                "Münchner Verkehrs- und Tarifverbund GmbH (MVV)",
            ),
            data_dir: PathBuf::from(env_or("TRANSITREACH_DATA_DIR", "data")),
            default_transfer_time: env_or_parsed("TRANSITREACH_DEFAULT_TRANSFER_TIME", 180),
            port: env_or_parsed("TRANSITREACH_PORT", 3030),
            admin_token: env::var("TRANSITREACH_ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }

    pub fn zip_path(&self) -> PathBuf {
        self.data_dir.join("gtfs.zip")
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.data_dir.join("gtfs")
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.data_dir.join("graphs")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.json")
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_or_parsed<T: FromStr + Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{key}={raw} is not valid, using default {default}");
            default
        }),
        Err(_) => default,
    }
}
