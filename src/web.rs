use std::collections::hash_map::DefaultHasher;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use lazy_static::lazy_static;
use log::{error, info};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::Filter;

use crate::builder::build_all;
use crate::calendar::DayType;
use crate::configuration::{Settings, MAX_BUDGET_MINUTES};
use crate::downloader::GtfsDownloader;
use crate::error::Error;
use crate::graph::GraphSet;
use crate::gtfs::Feed;
use crate::reachability::{ReachabilityEngine, ReachableStop, StopInfo};
use crate::store::GraphStore;
use crate::time::parse_clock;
use crate::timeline::{bucket, TimelineFrame};

lazy_static! {
    static ref CACHE: Mutex<LruCache<u64, Value>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(32).unwrap()));
}

/// Shared server state. The graph snapshot is swapped wholesale on rebuild;
/// in-flight queries keep the Arc they cloned.
pub struct AppData {
    pub settings: Arc<Settings>,
    graphs: RwLock<Arc<GraphSet>>,
    generation: AtomicU64,
}

impl AppData {
    pub fn new(settings: Arc<Settings>, graphs: GraphSet) -> AppData {
        AppData {
            settings,
            graphs: RwLock::new(Arc::new(graphs)),
            generation: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> Arc<GraphSet> {
        self.graphs.read().unwrap().clone()
    }

    fn publish(&self, graphs: Arc<GraphSet>) {
        *self.graphs.write().unwrap() = graphs;
        // new generation keys the response cache away from stale entries
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

fn default_departure() -> String {
    "09:00".to_owned()
}

fn default_budget() -> u32 {
    30
}

fn default_step() -> u32 {
    5
}

#[derive(Deserialize)]
struct StopsQuery {
    #[serde(default)]
    day_type: DayType,
}

#[derive(Deserialize)]
struct ReachabilityRequest {
    origin_stop_id: String,
    #[serde(default = "default_budget")]
    max_time_minutes: u32,
    #[serde(default = "default_departure")]
    departure_time: String,
    #[serde(default)]
    day_type: DayType,
}

#[derive(Deserialize)]
struct TimelineRequest {
    origin_stop_id: String,
    #[serde(default = "default_budget")]
    max_time_minutes: u32,
    #[serde(default = "default_step")]
    time_step_minutes: u32,
    #[serde(default = "default_departure")]
    departure_time: String,
    #[serde(default)]
    day_type: DayType,
}

#[derive(Serialize)]
struct ReachabilityResponse {
    origin: StopInfo,
    reachable_stops: Vec<ReachableStop>,
}

#[derive(Serialize)]
struct TimelineResponse {
    origin: StopInfo,
    timeline: Vec<TimelineFrame>,
}

#[derive(Serialize)]
struct MetadataResponse {
    source: String,
    download_date: Option<String>,
    feed_version: Option<String>,
    last_updated: Option<String>,
}

#[derive(Serialize)]
struct UpdateResponse {
    updated: bool,
    message: String,
}

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn error_reply(status: StatusCode, message: &str) -> JsonReply {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
}

fn reply_for_error(err: &Error) -> JsonReply {
    let status = match err {
        Error::StopNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidVariant(_) | Error::BudgetOutOfRange(_) | Error::InvalidTime(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_reply(status, &err.to_string())
}

fn ok_reply<T: Serialize>(body: &T) -> JsonReply {
    warp::reply::with_status(warp::reply::json(body), StatusCode::OK)
}

fn cache_key(
    generation: u64,
    day: DayType,
    origin: &str,
    departure_time: &str,
    max_minutes: u32,
    step_minutes: Option<u32>,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    generation.hash(&mut hasher);
    day.key().hash(&mut hasher);
    origin.hash(&mut hasher);
    departure_time.hash(&mut hasher);
    max_minutes.hash(&mut hasher);
    step_minutes.hash(&mut hasher);
    hasher.finish()
}

fn with_appdata(
    ad: Arc<AppData>,
) -> impl Filter<Extract = (Arc<AppData>,), Error = Infallible> + Clone {
    warp::any().map(move || ad.clone())
}

fn handle_stops(ad: Arc<AppData>, query: StopsQuery) -> JsonReply {
    let engine = ReachabilityEngine::new(ad.snapshot());
    match engine.all_stops(query.day_type) {
        Ok(stops) => ok_reply(&stops),
        Err(e) => reply_for_error(&e),
    }
}

fn handle_metadata(ad: Arc<AppData>) -> JsonReply {
    let metadata = GtfsDownloader::new(ad.settings.clone()).load_metadata();
    ok_reply(&MetadataResponse {
        source: ad.settings.data_source.clone(),
        download_date: metadata.download_date,
        feed_version: metadata.feed_version,
        last_updated: metadata.last_updated,
    })
}

fn handle_reachability(ad: Arc<AppData>, req: ReachabilityRequest) -> JsonReply {
    let departure = match parse_clock(&req.departure_time) {
        Ok(t) => t,
        Err(e) => return reply_for_error(&e),
    };
    if !(1..=MAX_BUDGET_MINUTES).contains(&req.max_time_minutes) {
        return reply_for_error(&Error::BudgetOutOfRange(req.max_time_minutes));
    }

    let engine = ReachabilityEngine::new(ad.snapshot());
    let origin = match engine.stop_info(req.day_type, &req.origin_stop_id) {
        Ok(origin) => origin,
        Err(e) => return reply_for_error(&e),
    };

    let key = cache_key(
        ad.generation(),
        req.day_type,
        &req.origin_stop_id,
        &req.departure_time,
        req.max_time_minutes,
        None,
    );
    if let Some(hit) = CACHE.lock().unwrap().get(&key) {
        return ok_reply(hit);
    }

    match engine.reachable_from(
        req.day_type,
        &req.origin_stop_id,
        departure,
        req.max_time_minutes,
    ) {
        Ok(reachable_stops) => {
            let response = ReachabilityResponse {
                origin,
                reachable_stops,
            };
            match serde_json::to_value(&response) {
                Ok(value) => {
                    CACHE.lock().unwrap().put(key, value.clone());
                    ok_reply(&value)
                }
                Err(e) => {
                    error!("response serialization failed: {e}");
                    error_reply(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
                }
            }
        }
        Err(e) => reply_for_error(&e),
    }
}

fn handle_timeline(ad: Arc<AppData>, req: TimelineRequest) -> JsonReply {
    let departure = match parse_clock(&req.departure_time) {
        Ok(t) => t,
        Err(e) => return reply_for_error(&e),
    };
    if !(1..=MAX_BUDGET_MINUTES).contains(&req.max_time_minutes) {
        return reply_for_error(&Error::BudgetOutOfRange(req.max_time_minutes));
    }
    if !(1..=30).contains(&req.time_step_minutes) {
        return error_reply(
            StatusCode::BAD_REQUEST,
            "time_step_minutes must be between 1 and 30",
        );
    }

    let engine = ReachabilityEngine::new(ad.snapshot());
    let origin = match engine.stop_info(req.day_type, &req.origin_stop_id) {
        Ok(origin) => origin,
        Err(e) => return reply_for_error(&e),
    };

    let key = cache_key(
        ad.generation(),
        req.day_type,
        &req.origin_stop_id,
        &req.departure_time,
        req.max_time_minutes,
        Some(req.time_step_minutes),
    );
    if let Some(hit) = CACHE.lock().unwrap().get(&key) {
        return ok_reply(hit);
    }

    match engine.reachable_from(
        req.day_type,
        &req.origin_stop_id,
        departure,
        req.max_time_minutes,
    ) {
        Ok(reachable) => {
            let response = TimelineResponse {
                origin,
                timeline: bucket(&reachable, req.max_time_minutes, req.time_step_minutes),
            };
            match serde_json::to_value(&response) {
                Ok(value) => {
                    CACHE.lock().unwrap().put(key, value.clone());
                    ok_reply(&value)
                }
                Err(e) => {
                    error!("response serialization failed: {e}");
                    error_reply(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
                }
            }
        }
        Err(e) => reply_for_error(&e),
    }
}

fn handle_health(ad: Arc<AppData>) -> JsonReply {
    ok_reply(&json!({
        "status": "healthy",
        "graphs_loaded": ad.snapshot().len(),
    }))
}

async fn handle_update(
    ad: Arc<AppData>,
    authorization: Option<String>,
) -> Result<JsonReply, warp::Rejection> {
    if let Some(token) = &ad.settings.admin_token {
        if authorization.as_deref() != Some(format!("Bearer {token}").as_str()) {
            return Ok(error_reply(StatusCode::UNAUTHORIZED, "unauthorized"));
        }
    }

    match run_update(&ad).await {
        Ok(true) => Ok(ok_reply(&UpdateResponse {
            updated: true,
            message: "GTFS data updated and graphs rebuilt".to_owned(),
        })),
        Ok(false) => Ok(ok_reply(&UpdateResponse {
            updated: false,
            message: "no update needed, data is current".to_owned(),
        })),
        Err(e) => {
            error!("update failed: {e:#}");
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("update failed: {e}"),
            ))
        }
    }
}

/// Re-downloads the feed and, if it changed, rebuilds and publishes a fresh
/// graph set. Any failure leaves the currently published set serving.
async fn run_update(ad: &Arc<AppData>) -> anyhow::Result<bool> {
    let downloader = GtfsDownloader::new(ad.settings.clone());
    if !downloader.check_and_update().await? {
        return Ok(false);
    }

    let feed = Feed::from_dir(&ad.settings.extract_dir())?;
    let set = build_all(&feed, ad.settings.default_transfer_time)?;
    GraphStore::new(ad.settings.graph_dir()).save(&set)?;
    ad.publish(Arc::new(set));
    info!("new graph set published");
    Ok(true)
}

pub async fn serve(settings: Arc<Settings>, graphs: GraphSet) {
    let appdata = Arc::new(AppData::new(settings.clone(), graphs));

    let cors_policy = warp::cors()
        .allow_any_origin()
        .allow_headers(vec![
            "Access-Control-Allow-Origin",
            "Origin",
            "Accept",
            "X-Requested-With",
            "Content-Type",
            "Authorization",
        ])
        .allow_methods(["POST", "GET"]);

    let log = warp::log("transitreach");

    let stops = warp::get()
        .and(with_appdata(appdata.clone()))
        .and(warp::path!("api" / "stops"))
        .and(warp::query::<StopsQuery>())
        .map(handle_stops);

    let metadata = warp::get()
        .and(with_appdata(appdata.clone()))
        .and(warp::path!("api" / "metadata"))
        .map(handle_metadata);

    let reachability = warp::post()
        .and(with_appdata(appdata.clone()))
        .and(warp::path!("api" / "reachability"))
        .and(warp::body::json())
        .map(handle_reachability);

    let timeline = warp::post()
        .and(with_appdata(appdata.clone()))
        .and(warp::path!("api" / "reachability-timeline"))
        .and(warp::body::json())
        .map(handle_timeline);

    let update = warp::post()
        .and(with_appdata(appdata.clone()))
        .and(warp::path!("api" / "admin" / "update-gtfs"))
        .and(warp::header::optional::<String>("authorization"))
        .and_then(handle_update);

    let health = warp::get()
        .and(with_appdata(appdata.clone()))
        .and(warp::path!("health"))
        .map(handle_health);

    let routes = stops
        .or(metadata)
        .or(reachability)
        .or(timeline)
        .or(update)
        .or(health)
        .with(cors_policy)
        .with(log);

    let port = settings.port;
    info!("listening on 0.0.0.0:{port}");
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}
