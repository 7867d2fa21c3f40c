use rkyv::{Archive, Deserialize, Serialize};
use rustc_hash::FxHashMap;

use crate::calendar::DayType;
use crate::time::Time;

#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// One scheduled ride between two consecutive stops of one trip. Parallel
/// segments between the same stop pair are distinct edges.
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct TripSegment {
    pub to_stop: String,
    pub departure: Time,
    pub arrival: Time,
    pub duration: u32,
    pub trip_id: String,
    pub route_name: String,
}

/// A walking/interchange link, usable at any time of day.
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct TransferLink {
    pub to_stop: String,
    pub duration: u32,
}

#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum Edge {
    Trip(TripSegment),
    Transfer(TransferLink),
}

impl Edge {
    pub fn to_stop(&self) -> &str {
        match self {
            Edge::Trip(seg) => &seg.to_stop,
            Edge::Transfer(link) => &link.to_stop,
        }
    }
}

/// Directed multigraph for one day type. Every stop of the feed is a node,
/// edges included or not; adjacency is an owned edge list per stop.
#[derive(Archive, Serialize, Deserialize, Debug, Default)]
#[archive(check_bytes)]
pub struct TransitGraph {
    stops: FxHashMap<String, Stop>,
    outgoing: FxHashMap<String, Vec<Edge>>,
    edge_count: usize,
}

impl TransitGraph {
    pub fn add_stop(&mut self, stop: Stop) {
        self.stops.insert(stop.id.clone(), stop);
    }

    /// Appends an edge to `from`'s adjacency list; parallel edges between
    /// the same stop pair accumulate.
    pub fn add_edge(&mut self, from: &str, edge: Edge) {
        self.outgoing.entry(from.to_owned()).or_default().push(edge);
        self.edge_count += 1;
    }

    pub fn contains(&self, stop_id: &str) -> bool {
        self.stops.contains_key(stop_id)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.values()
    }

    pub fn outgoing(&self, stop_id: &str) -> &[Edge] {
        self.outgoing.get(stop_id).map_or(&[], Vec::as_slice)
    }

    pub fn node_count(&self) -> usize {
        self.stops.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

/// The published set of graphs, one per day type. Immutable once built;
/// shared read-only across concurrent queries.
#[derive(Debug, Default)]
pub struct GraphSet {
    graphs: FxHashMap<DayType, TransitGraph>,
}

impl GraphSet {
    pub fn insert(&mut self, day: DayType, graph: TransitGraph) {
        self.graphs.insert(day, graph);
    }

    pub fn get(&self, day: DayType) -> Option<&TransitGraph> {
        self.graphs.get(&day)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DayType, &TransitGraph)> {
        self.graphs.iter().map(|(day, graph)| (*day, graph))
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }
}
