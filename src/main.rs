mod builder;
mod calendar;
mod configuration;
mod downloader;
mod error;
mod graph;
mod gtfs;
mod reachability;
mod store;
mod time;
mod timeline;
mod web;

use std::sync::Arc;

use anyhow::{bail, Result};
use log::info;

use crate::builder::build_all;
use crate::configuration::Settings;
use crate::downloader::GtfsDownloader;
use crate::graph::GraphSet;
use crate::gtfs::Feed;
use crate::store::GraphStore;

fn main() -> Result<()> {
    env_logger::init();
    let settings = Arc::new(Settings::from_env());
    let mode = std::env::args().nth(1).unwrap_or_else(|| "serve".to_owned());

    let rt = tokio::runtime::Runtime::new()?;
    match mode.as_str() {
        "init" => rt.block_on(init(settings)),
        "update" => rt.block_on(update(settings)),
        "serve" => rt.block_on(serve(settings)),
        other => bail!("unknown command '{other}'; expected init, update or serve"),
    }
}

/// First-time setup: download the feed unconditionally, then build and
/// persist all graphs.
async fn init(settings: Arc<Settings>) -> Result<()> {
    GtfsDownloader::new(settings.clone())
        .force_download()
        .await?;
    rebuild(&settings)?;
    info!("data initialization complete");
    Ok(())
}

/// Checksum-gated refresh, meant for a scheduler.
async fn update(settings: Arc<Settings>) -> Result<()> {
    if GtfsDownloader::new(settings.clone())
        .check_and_update()
        .await?
    {
        rebuild(&settings)?;
        info!("update complete");
    } else {
        info!("no update needed");
    }
    Ok(())
}

fn rebuild(settings: &Settings) -> Result<GraphSet> {
    let feed = Feed::from_dir(&settings.extract_dir())?;
    let set = build_all(&feed, settings.default_transfer_time)?;
    GraphStore::new(settings.graph_dir()).save(&set)?;
    Ok(set)
}

async fn serve(settings: Arc<Settings>) -> Result<()> {
    let store = GraphStore::new(settings.graph_dir());
    let graphs = if store.is_complete() {
        store.load()?
    } else if settings.extract_dir().join("stops.txt").exists() {
        info!("graph snapshots missing, building from the extracted feed");
        rebuild(&settings)?
    } else {
        bail!(
            "no graph snapshots and no extracted feed under {}; run `transitreach init` first",
            settings.data_dir.display()
        );
    };

    web::serve(settings, graphs).await;
    Ok(())
}
