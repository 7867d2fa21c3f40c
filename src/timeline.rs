//! Buckets one finished reachability result into fixed time slices for
//! progressive-disclosure animation. A pure filter; the search is never
//! re-run per frame.

use serde::Serialize;

use crate::reachability::ReachableStop;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineFrame {
    pub elapsed_minutes: u32,
    pub reachable_stops: Vec<ReachableStop>,
}

/// One frame per `step_minutes` up to and including the largest multiple not
/// exceeding `max_minutes`, each holding the stops reachable within that
/// elapsed time, in the result's original order.
pub fn bucket(
    reachable: &[ReachableStop],
    max_minutes: u32,
    step_minutes: u32,
) -> Vec<TimelineFrame> {
    if step_minutes == 0 {
        return Vec::new();
    }
    let mut frames = Vec::with_capacity((max_minutes / step_minutes) as usize);
    let mut elapsed = step_minutes;
    while elapsed <= max_minutes {
        frames.push(TimelineFrame {
            elapsed_minutes: elapsed,
            reachable_stops: reachable
                .iter()
                .filter(|stop| stop.travel_time_minutes <= elapsed as f64)
                .cloned()
                .collect(),
        });
        elapsed += step_minutes;
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reached(stop_id: &str, minutes: f64) -> ReachableStop {
        ReachableStop {
            stop_id: stop_id.to_owned(),
            stop_name: stop_id.to_uppercase(),
            lat: 48.1,
            lon: 11.5,
            travel_time_minutes: minutes,
            num_transfers: 0,
        }
    }

    fn frame_ids(frame: &TimelineFrame) -> Vec<&str> {
        frame
            .reachable_stops
            .iter()
            .map(|s| s.stop_id.as_str())
            .collect()
    }

    #[test]
    fn frames_grow_with_elapsed_time() {
        let result = [reached("b", 10.0), reached("c", 30.0)];
        let frames = bucket(&result, 30, 10);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].elapsed_minutes, 10);
        assert_eq!(frame_ids(&frames[0]), ["b"]);
        assert_eq!(frame_ids(&frames[1]), ["b"]);
        assert_eq!(frame_ids(&frames[2]), ["b", "c"]);
    }

    #[test]
    fn last_frame_is_the_largest_step_multiple() {
        let frames = bucket(&[reached("b", 1.0)], 25, 10);
        assert_eq!(
            frames.iter().map(|f| f.elapsed_minutes).collect::<Vec<_>>(),
            [10, 20]
        );
    }

    #[test]
    fn empty_result_still_produces_frames() {
        let frames = bucket(&[], 15, 5);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.reachable_stops.is_empty()));
    }

    #[test]
    fn zero_step_produces_no_frames() {
        assert!(bucket(&[reached("b", 1.0)], 30, 0).is_empty());
    }

    #[test]
    fn order_is_preserved_within_frames() {
        let result = [reached("x", 3.0), reached("y", 2.0), reached("z", 3.5)];
        let frames = bucket(&result, 5, 5);
        assert_eq!(frame_ids(&frames[0]), ["x", "y", "z"]);
    }
}
