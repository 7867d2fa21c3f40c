//! Turns a parsed feed into one time-dependent multigraph per day type.

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::calendar::{service_ids_by_day_type, DayType};
use crate::error::Error;
use crate::gtfs::{Feed, RawStopTime};
use crate::graph::{Edge, GraphSet, Stop, TransferLink, TransitGraph, TripSegment};

/// Builds the full graph set. Fails fast on an unusable feed; tolerates
/// stray references inside an otherwise valid one by counted omission.
pub fn build_all(feed: &Feed, default_transfer_time: u32) -> Result<GraphSet, Error> {
    if feed.stops.is_empty() {
        return Err(Error::BuildFailure("feed contains no stops".to_owned()));
    }
    if feed.calendar.is_empty() {
        return Err(Error::BuildFailure(
            "feed contains no calendar rules".to_owned(),
        ));
    }

    let service_ids = service_ids_by_day_type(&feed.calendar);

    let route_names: FxHashMap<&str, &str> = feed
        .routes
        .iter()
        .map(|r| {
            (
                r.route_id.as_str(),
                r.route_short_name.as_deref().unwrap_or("Unknown"),
            )
        })
        .collect();

    // stop_times grouped by trip and ordered by stop_sequence, shared by all
    // three per-day builds.
    let mut visits: FxHashMap<&str, Vec<&RawStopTime>> = FxHashMap::default();
    for st in &feed.stop_times {
        visits.entry(st.trip_id.as_str()).or_default().push(st);
    }
    for trip_visits in visits.values_mut() {
        trip_visits.sort_by_key(|st| st.stop_sequence);
    }

    let mut set = GraphSet::default();
    for day in DayType::ALL {
        let empty = FxHashSet::default();
        let active = service_ids.get(&day).unwrap_or(&empty);
        let graph = build_for_day_type(feed, day, active, &visits, &route_names, default_transfer_time);
        set.insert(day, graph);
    }
    Ok(set)
}

fn build_for_day_type(
    feed: &Feed,
    day: DayType,
    active_services: &FxHashSet<String>,
    visits: &FxHashMap<&str, Vec<&RawStopTime>>,
    route_names: &FxHashMap<&str, &str>,
    default_transfer_time: u32,
) -> TransitGraph {
    let mut graph = TransitGraph::default();

    // Every stop becomes a node, even when nothing serves it on this day.
    for stop in &feed.stops {
        graph.add_stop(Stop {
            id: stop.stop_id.clone(),
            name: stop.stop_name.clone(),
            lat: stop.stop_lat.unwrap_or_default(),
            lon: stop.stop_lon.unwrap_or_default(),
        });
    }

    let mut dropped_segments = 0usize;
    let mut untimed_segments = 0usize;

    for trip in &feed.trips {
        if !active_services.contains(&trip.service_id) {
            continue;
        }
        let Some(trip_visits) = visits.get(trip.trip_id.as_str()) else {
            continue;
        };
        let route_name = route_names
            .get(trip.route_id.as_str())
            .copied()
            .unwrap_or("Unknown");

        for pair in trip_visits.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if !graph.contains(&from.stop_id) || !graph.contains(&to.stop_id) {
                dropped_segments += 1;
                continue;
            }
            let (Some(departure), Some(mut arrival)) = (from.departure_time, to.arrival_time)
            else {
                untimed_segments += 1;
                continue;
            };
            if arrival < departure {
                // The trip crosses midnight within this segment.
                arrival = arrival.next_day();
            }
            graph.add_edge(
                &from.stop_id,
                Edge::Trip(TripSegment {
                    to_stop: to.stop_id.clone(),
                    departure,
                    arrival,
                    duration: arrival - departure,
                    trip_id: trip.trip_id.clone(),
                    route_name: route_name.to_owned(),
                }),
            );
        }
    }

    let mut dropped_transfers = 0usize;
    if let Some(transfers) = &feed.transfers {
        for rule in transfers {
            if !graph.contains(&rule.from_stop_id) || !graph.contains(&rule.to_stop_id) {
                dropped_transfers += 1;
                continue;
            }
            graph.add_edge(
                &rule.from_stop_id,
                Edge::Transfer(TransferLink {
                    to_stop: rule.to_stop_id.clone(),
                    duration: rule.min_transfer_time.unwrap_or(default_transfer_time),
                }),
            );
        }
    }

    info!(
        "{day} graph: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    if dropped_segments + dropped_transfers + untimed_segments > 0 {
        warn!(
            "{day} graph: dropped {dropped_segments} segments with unknown stops, \
             {untimed_segments} without timestamps, {dropped_transfers} transfers"
        );
    }
    graph
}
