//! Fetches the GTFS archive, gates updates on its sha256 checksum, extracts
//! and validates it, and records attribution metadata next to the data.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::configuration::Settings;
use crate::error::Error;

const REQUIRED_FILES: [&str; 6] = [
    "agency.txt",
    "stops.txt",
    "routes.txt",
    "trips.txt",
    "stop_times.txt",
    "calendar.txt",
];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FeedMetadata {
    pub checksum: Option<String>,
    pub download_date: Option<String>,
    pub feed_version: Option<String>,
    pub last_updated: Option<String>,
}

pub struct GtfsDownloader {
    settings: Arc<Settings>,
}

impl GtfsDownloader {
    pub fn new(settings: Arc<Settings>) -> GtfsDownloader {
        GtfsDownloader { settings }
    }

    async fn download(&self) -> Result<PathBuf> {
        let url = &self.settings.gtfs_url;
        info!("downloading GTFS feed from {url}");
        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("fetch {url}"))?;
        let body = response.bytes().await?;

        let zip_path = self.settings.zip_path();
        if let Some(parent) = zip_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&zip_path, &body).with_context(|| format!("write {}", zip_path.display()))?;
        info!("downloaded {} bytes to {}", body.len(), zip_path.display());
        Ok(zip_path)
    }

    /// Unpacks the downloaded archive, replacing any previous extract.
    fn extract(&self) -> Result<PathBuf> {
        let zip_path = self.settings.zip_path();
        let extract_dir = self.settings.extract_dir();
        if extract_dir.exists() {
            fs::remove_dir_all(&extract_dir)?;
        }
        fs::create_dir_all(&extract_dir)?;

        let file = File::open(&zip_path).with_context(|| format!("open {}", zip_path.display()))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
        archive.extract(&extract_dir)?;
        info!("extracted feed to {}", extract_dir.display());
        Ok(extract_dir)
    }

    pub fn validate(dir: &Path) -> Result<(), Error> {
        for file in REQUIRED_FILES {
            if !dir.join(file).exists() {
                return Err(Error::MissingFile(file.to_owned()));
            }
        }
        Ok(())
    }

    fn checksum(path: &Path) -> Result<String> {
        let mut hasher = Sha256::new();
        let mut reader = BufReader::new(File::open(path)?);
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn feed_version(dir: &Path) -> Option<String> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(dir.join("feed_info.txt"))
            .ok()?;
        let headers = reader.headers().ok()?.clone();
        let idx = headers.iter().position(|h| h == "feed_version")?;
        let record = reader.records().next()?.ok()?;
        record.get(idx).map(str::to_owned)
    }

    pub fn load_metadata(&self) -> FeedMetadata {
        let path = self.settings.metadata_path();
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("unreadable metadata at {}: {e}", path.display());
                FeedMetadata::default()
            }),
            Err(_) => FeedMetadata::default(),
        }
    }

    fn save_metadata(&self, metadata: &FeedMetadata) -> Result<()> {
        let path = self.settings.metadata_path();
        fs::write(&path, serde_json::to_string_pretty(metadata)?)
            .with_context(|| format!("write {}", path.display()))?;
        info!("metadata saved to {}", path.display());
        Ok(())
    }

    /// Downloads the feed and reports whether it changed. A matching
    /// checksum leaves the current extract and metadata untouched.
    pub async fn check_and_update(&self) -> Result<bool> {
        let zip_path = self.download().await?;
        let new_checksum = Self::checksum(&zip_path)?;

        let metadata = self.load_metadata();
        if metadata.checksum.as_deref() == Some(new_checksum.as_str()) {
            info!("feed unchanged, checksums match");
            return Ok(false);
        }

        let dir = self.extract()?;
        Self::validate(&dir)?;
        self.save_metadata(&FeedMetadata {
            checksum: Some(new_checksum),
            download_date: Some(Utc::now().format("%Y-%m-%d").to_string()),
            feed_version: Self::feed_version(&dir),
            last_updated: Some(Utc::now().to_rfc3339()),
        })?;
        info!("feed updated");
        Ok(true)
    }

    /// Unconditional download + extract + validate, for first-time setup.
    pub async fn force_download(&self) -> Result<()> {
        let zip_path = self.download().await?;
        let dir = self.extract()?;
        Self::validate(&dir)?;
        self.save_metadata(&FeedMetadata {
            checksum: Some(Self::checksum(&zip_path)?),
            download_date: Some(Utc::now().format("%Y-%m-%d").to_string()),
            feed_version: Self::feed_version(&dir),
            last_updated: Some(Utc::now().to_rfc3339()),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("transitreach-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn validation_requires_all_core_files() {
        let dir = scratch_dir("validate");
        for file in REQUIRED_FILES {
            fs::write(dir.join(file), "header\n").unwrap();
        }
        assert!(GtfsDownloader::validate(&dir).is_ok());

        fs::remove_file(dir.join("stop_times.txt")).unwrap();
        let err = GtfsDownloader::validate(&dir).unwrap_err();
        assert!(matches!(err, Error::MissingFile(f) if f == "stop_times.txt"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn feed_version_comes_from_feed_info() {
        let dir = scratch_dir("feedinfo");
        fs::write(
            dir.join("feed_info.txt"),
            "feed_publisher_name,feed_version\nMVV,2024-31\n",
        )
        .unwrap();
        assert_eq!(
            GtfsDownloader::feed_version(&dir),
            Some("2024-31".to_owned())
        );
        assert_eq!(GtfsDownloader::feed_version(Path::new("/nonexistent")), None);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn metadata_defaults_when_absent() {
        let dir = scratch_dir("metadata");
        let settings = Arc::new(Settings {
            gtfs_url: String::new(),
            data_source: String::new(),
            data_dir: dir.clone(),
            default_transfer_time: 180,
            port: 0,
            admin_token: None,
        });
        let downloader = GtfsDownloader::new(settings);

        let empty = downloader.load_metadata();
        assert_eq!(empty.checksum, None);

        downloader
            .save_metadata(&FeedMetadata {
                checksum: Some("abc".to_owned()),
                download_date: Some("2024-01-01".to_owned()),
                feed_version: None,
                last_updated: None,
            })
            .unwrap();
        let loaded = downloader.load_metadata();
        assert_eq!(loaded.checksum.as_deref(), Some("abc"));
        assert_eq!(loaded.download_date.as_deref(), Some("2024-01-01"));

        let _ = fs::remove_dir_all(dir);
    }
}
