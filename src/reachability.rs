//! Earliest-arrival search over one day-type graph: a label-correcting
//! Dijkstra variant where trip edges are time-gated (you wait for the
//! scheduled departure) instead of weight-summed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::calendar::DayType;
use crate::configuration::MAX_BUDGET_MINUTES;
use crate::error::Error;
use crate::graph::{Edge, GraphSet};
use crate::time::Time;

/// Waiting longer than this between arrival and the boarded departure counts
/// as a transfer; shorter waits are treated as staying on the same vehicle.
/// This is a heuristic, not a same-trip check.
pub const TRANSFER_WAIT_THRESHOLD: u32 = 120;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopInfo {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReachableStop {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
    pub travel_time_minutes: f64,
    pub num_transfers: u32,
}

/// Min-heap entry; the heap is a max-heap, so ordering is reversed on the
/// arrival time alone.
#[derive(Debug)]
struct QueueEntry<'a> {
    arrival: Time,
    stop: &'a str,
    transfers: u32,
}

impl PartialEq for QueueEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.arrival == other.arrival
    }
}

impl Eq for QueueEntry<'_> {}

impl PartialOrd for QueueEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.arrival.cmp(&other.arrival).reverse()
    }
}

/// Answers reachability queries against a published graph snapshot. Each
/// query owns its queue and arrival map; the snapshot is never mutated.
pub struct ReachabilityEngine {
    graphs: Arc<GraphSet>,
}

impl ReachabilityEngine {
    pub fn new(graphs: Arc<GraphSet>) -> ReachabilityEngine {
        ReachabilityEngine { graphs }
    }

    pub fn stop_info(&self, day: DayType, stop_id: &str) -> Result<StopInfo, Error> {
        let graph = self
            .graphs
            .get(day)
            .ok_or_else(|| Error::InvalidVariant(day.to_string()))?;
        let stop = graph
            .stop(stop_id)
            .ok_or_else(|| Error::StopNotFound(stop_id.to_owned()))?;
        Ok(StopInfo {
            stop_id: stop.id.clone(),
            stop_name: stop.name.clone(),
            lat: stop.lat,
            lon: stop.lon,
        })
    }

    /// All stops of the day's graph, sorted by display name.
    pub fn all_stops(&self, day: DayType) -> Result<Vec<StopInfo>, Error> {
        let graph = self
            .graphs
            .get(day)
            .ok_or_else(|| Error::InvalidVariant(day.to_string()))?;
        let mut stops: Vec<StopInfo> = graph
            .stops()
            .map(|stop| StopInfo {
                stop_id: stop.id.clone(),
                stop_name: stop.name.clone(),
                lat: stop.lat,
                lon: stop.lon,
            })
            .collect();
        stops.sort_by(|a, b| a.stop_name.cmp(&b.stop_name));
        Ok(stops)
    }

    /// Every stop reachable from `origin` within `max_minutes`, with its
    /// earliest arrival converted to elapsed minutes and its transfer count,
    /// sorted ascending by travel time.
    pub fn reachable_from(
        &self,
        day: DayType,
        origin: &str,
        departure: Time,
        max_minutes: u32,
    ) -> Result<Vec<ReachableStop>, Error> {
        let graph = self
            .graphs
            .get(day)
            .ok_or_else(|| Error::InvalidVariant(day.to_string()))?;
        let origin = graph
            .stop(origin)
            .map(|stop| stop.id.as_str())
            .ok_or_else(|| Error::StopNotFound(origin.to_owned()))?;
        if max_minutes > MAX_BUDGET_MINUTES {
            return Err(Error::BudgetOutOfRange(max_minutes));
        }
        let budget = max_minutes * 60;

        // stop -> (earliest arrival found so far, transfers on that arrival)
        let mut arrivals: FxHashMap<&str, (Time, u32)> = FxHashMap::default();
        arrivals.insert(origin, (departure, 0));

        if budget > 0 {
            let mut queue = BinaryHeap::new();
            queue.push(QueueEntry {
                arrival: departure,
                stop: origin,
                transfers: 0,
            });
            let mut settled: FxHashSet<&str> = FxHashSet::default();

            while let Some(entry) = queue.pop() {
                if !settled.insert(entry.stop) {
                    // Stale entry; a better arrival was already processed.
                    continue;
                }
                if entry.arrival - departure > budget {
                    continue;
                }

                // Best admissible candidate per neighbor across all parallel
                // edges of this expansion.
                let mut best: FxHashMap<&str, (Time, u32)> = FxHashMap::default();
                for edge in graph.outgoing(entry.stop) {
                    let candidate = match edge {
                        Edge::Transfer(link) => {
                            Some((entry.arrival + link.duration, entry.transfers + 1))
                        }
                        Edge::Trip(seg) => {
                            let mut seg_departure = seg.departure;
                            let mut seg_arrival = seg.arrival;
                            // A departure more than a day behind the current
                            // time belongs to the next service day.
                            if seg_departure.next_day() < entry.arrival {
                                seg_departure = seg_departure.next_day();
                                seg_arrival = seg_arrival.next_day();
                            }
                            if seg_departure >= entry.arrival {
                                let wait = seg_departure - entry.arrival;
                                let transfers = entry.transfers
                                    + u32::from(wait > TRANSFER_WAIT_THRESHOLD);
                                Some((seg_arrival, transfers))
                            } else {
                                None
                            }
                        }
                    };
                    let Some((arrival, transfers)) = candidate else {
                        continue;
                    };
                    if arrival - departure > budget {
                        continue;
                    }
                    match best.get(edge.to_stop()) {
                        Some((current, _)) if arrival >= *current => {}
                        _ => {
                            best.insert(edge.to_stop(), (arrival, transfers));
                        }
                    }
                }

                for (neighbor, (arrival, transfers)) in best {
                    let improves = match arrivals.get(neighbor) {
                        Some((recorded, _)) => arrival < *recorded,
                        None => true,
                    };
                    if improves {
                        arrivals.insert(neighbor, (arrival, transfers));
                        queue.push(QueueEntry {
                            arrival,
                            stop: neighbor,
                            transfers,
                        });
                    }
                }
            }
        }

        let mut results: Vec<ReachableStop> = arrivals
            .iter()
            .filter_map(|(&stop_id, &(arrival, transfers))| {
                if stop_id == origin {
                    return None;
                }
                graph.stop(stop_id).map(|stop| ReachableStop {
                    stop_id: stop.id.clone(),
                    stop_name: stop.name.clone(),
                    lat: stop.lat,
                    lon: stop.lon,
                    travel_time_minutes: round_minutes(arrival - departure),
                    num_transfers: transfers,
                })
            })
            .collect();
        results.sort_by(|a, b| a.travel_time_minutes.total_cmp(&b.travel_time_minutes));
        Ok(results)
    }
}

fn round_minutes(seconds: u32) -> f64 {
    (seconds as f64 / 60.0 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tests::{stop, trip, visit, weekday_service};
    use crate::builder::build_all;
    use crate::gtfs::{Feed, RawRoute, RawTransfer};
    use crate::time::parse_clock;

    fn route(id: &str, name: &str) -> RawRoute {
        RawRoute {
            route_id: id.to_owned(),
            route_short_name: Some(name.to_owned()),
        }
    }

    /// A -> B departing 09:00 arriving 09:10, B -> C departing 09:20
    /// arriving 09:30, on two different trips.
    fn two_leg_feed() -> Feed {
        Feed {
            stops: vec![stop("a", "A"), stop("b", "B"), stop("c", "C")],
            routes: vec![route("r1", "R1")],
            trips: vec![trip("t1", "r1", "wk"), trip("t2", "r1", "wk")],
            stop_times: vec![
                visit("t1", "a", 1, "09:00:00", "09:00:00"),
                visit("t1", "b", 2, "09:10:00", "09:10:00"),
                visit("t2", "b", 1, "09:20:00", "09:20:00"),
                visit("t2", "c", 2, "09:30:00", "09:30:00"),
            ],
            calendar: vec![weekday_service("wk")],
            transfers: None,
        }
    }

    fn engine(feed: &Feed) -> ReachabilityEngine {
        ReachabilityEngine::new(Arc::new(build_all(feed, 180).unwrap()))
    }

    fn query(
        engine: &ReachabilityEngine,
        origin: &str,
        departure: &str,
        minutes: u32,
    ) -> Vec<ReachableStop> {
        engine
            .reachable_from(
                DayType::Weekday,
                origin,
                parse_clock(departure).unwrap(),
                minutes,
            )
            .unwrap()
    }

    #[test]
    fn two_legs_within_budget() {
        let feed = two_leg_feed();
        let result = query(&engine(&feed), "a", "09:00", 30);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].stop_id, "b");
        assert_eq!(result[0].travel_time_minutes, 10.0);
        assert_eq!(result[0].num_transfers, 0);
        // ten minutes of waiting at B exceeds the continuation threshold
        assert_eq!(result[1].stop_id, "c");
        assert_eq!(result[1].travel_time_minutes, 30.0);
        assert_eq!(result[1].num_transfers, 1);
    }

    #[test]
    fn tight_budget_cuts_the_second_leg() {
        let feed = two_leg_feed();
        let result = query(&engine(&feed), "a", "09:00", 15);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].stop_id, "b");
        assert_eq!(result[0].travel_time_minutes, 10.0);
    }

    #[test]
    fn zero_budget_reaches_nothing() {
        let feed = two_leg_feed();
        assert!(query(&engine(&feed), "a", "09:00", 0).is_empty());
    }

    #[test]
    fn budget_growth_is_monotonic() {
        let feed = two_leg_feed();
        let eng = engine(&feed);
        let small = query(&eng, "a", "09:00", 15);
        let large = query(&eng, "a", "09:00", 30);

        for reached in &small {
            let also = large
                .iter()
                .find(|r| r.stop_id == reached.stop_id)
                .expect("larger budget must keep every stop");
            // travel time depends only on the graph, not the budget
            assert_eq!(also.travel_time_minutes, reached.travel_time_minutes);
        }
        assert!(large.len() >= small.len());
    }

    #[test]
    fn repeat_runs_are_identical() {
        let feed = two_leg_feed();
        let eng = engine(&feed);
        let first = query(&eng, "a", "09:00", 30);
        let second = query(&eng, "a", "09:00", 30);
        assert_eq!(first, second);
    }

    #[test]
    fn short_wait_is_a_continuation_not_a_transfer() {
        let mut feed = two_leg_feed();
        // B departure one minute after arrival: same-vehicle heuristic
        feed.stop_times[2] = visit("t2", "b", 1, "09:11:00", "09:11:00");
        feed.stop_times[3] = visit("t2", "c", 2, "09:21:00", "09:21:00");
        let result = query(&engine(&feed), "a", "09:00", 30);

        let c = result.iter().find(|r| r.stop_id == "c").unwrap();
        assert_eq!(c.num_transfers, 0);
    }

    #[test]
    fn walking_transfer_always_counts() {
        let mut feed = two_leg_feed();
        feed.transfers = Some(vec![RawTransfer {
            from_stop_id: "a".to_owned(),
            to_stop_id: "c".to_owned(),
            min_transfer_time: Some(180),
        }]);
        let result = query(&engine(&feed), "a", "09:00", 30);

        let c = result.iter().find(|r| r.stop_id == "c").unwrap();
        // walking a -> c in 3 minutes beats riding via B
        assert_eq!(c.travel_time_minutes, 3.0);
        assert_eq!(c.num_transfers, 1);
    }

    #[test]
    fn parallel_trips_pick_the_earliest_arrival() {
        let mut feed = two_leg_feed();
        // a second, faster departure a -> b
        feed.trips.push(trip("t3", "r1", "wk"));
        feed.stop_times.push(visit("t3", "a", 1, "09:01:00", "09:01:00"));
        feed.stop_times.push(visit("t3", "b", 2, "09:05:00", "09:05:00"));
        let result = query(&engine(&feed), "a", "09:00", 30);

        let b = result.iter().find(|r| r.stop_id == "b").unwrap();
        assert_eq!(b.travel_time_minutes, 5.0);
    }

    #[test]
    fn journey_across_midnight() {
        let feed = Feed {
            stops: vec![stop("a", "A"), stop("b", "B"), stop("c", "C")],
            routes: vec![route("r1", "R1")],
            trips: vec![trip("t1", "r1", "wk"), trip("t2", "r1", "wk")],
            stop_times: vec![
                visit("t1", "a", 1, "23:50:00", "23:50:00"),
                visit("t1", "b", 2, "00:10:00", "00:10:00"),
                // encoded as a post-midnight continuation of the service day
                visit("t2", "b", 1, "24:20:00", "24:20:00"),
                visit("t2", "c", 2, "24:30:00", "24:30:00"),
            ],
            calendar: vec![weekday_service("wk")],
            transfers: None,
        };
        let result = query(&engine(&feed), "a", "23:45", 60);

        // the five-minute wait before boarding already counts as a transfer
        let b = result.iter().find(|r| r.stop_id == "b").unwrap();
        assert_eq!(b.travel_time_minutes, 25.0);
        assert_eq!(b.num_transfers, 1);
        let c = result.iter().find(|r| r.stop_id == "c").unwrap();
        assert_eq!(c.travel_time_minutes, 40.0);
        assert_eq!(c.num_transfers, 2);
    }

    #[test]
    fn results_are_sorted_by_travel_time() {
        let feed = two_leg_feed();
        let result = query(&engine(&feed), "a", "09:00", 30);
        let times: Vec<f64> = result.iter().map(|r| r.travel_time_minutes).collect();
        let mut sorted = times.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(times, sorted);
    }

    #[test]
    fn unknown_origin_is_rejected() {
        let feed = two_leg_feed();
        let err = engine(&feed)
            .reachable_from(DayType::Weekday, "nowhere", Time(0), 30)
            .unwrap_err();
        assert!(matches!(err, Error::StopNotFound(_)));
    }

    #[test]
    fn missing_graph_is_rejected() {
        let eng = ReachabilityEngine::new(Arc::new(GraphSet::default()));
        let err = eng
            .reachable_from(DayType::Weekday, "a", Time(0), 30)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVariant(_)));
    }

    #[test]
    fn oversized_budget_is_rejected() {
        let feed = two_leg_feed();
        let err = engine(&feed)
            .reachable_from(DayType::Weekday, "a", Time(0), MAX_BUDGET_MINUTES + 1)
            .unwrap_err();
        assert!(matches!(err, Error::BudgetOutOfRange(_)));
    }

    #[test]
    fn all_stops_sorted_by_name() {
        let feed = two_leg_feed();
        let stops = engine(&feed).all_stops(DayType::Weekday).unwrap();
        assert_eq!(stops.len(), 3);
        let names: Vec<&str> = stops.iter().map(|s| s.stop_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }
}
