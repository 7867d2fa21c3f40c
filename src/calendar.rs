use std::fmt;
use std::str::FromStr;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::gtfs::RawCalendar;

/// Which service-day graph to build or query. One service id may land in
/// several day types when its active-days pattern is not one of the three
/// canonical ones.
#[derive(Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    #[default]
    Weekday,
    Saturday,
    Sunday,
}

impl DayType {
    pub const ALL: [DayType; 3] = [DayType::Weekday, DayType::Saturday, DayType::Sunday];

    pub fn key(&self) -> &'static str {
        match self {
            DayType::Weekday => "weekday",
            DayType::Saturday => "saturday",
            DayType::Sunday => "sunday",
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekday" => Ok(DayType::Weekday),
            "saturday" => Ok(DayType::Saturday),
            "sunday" => Ok(DayType::Sunday),
            _ => {
                log::error!("{s} is not a day type");
                Err(format!("{s} is not a day type"))
            }
        }
    }
}

/// Buckets service ids by day type.
///
/// The three canonical weekly patterns map to exactly one day type; any other
/// pattern lands in every day type whose flag is set, so a Sat+Sun service
/// appears under both saturday and sunday. A service active on no day is
/// dropped.
pub fn service_ids_by_day_type(rules: &[RawCalendar]) -> FxHashMap<DayType, FxHashSet<String>> {
    let mut out: FxHashMap<DayType, FxHashSet<String>> = FxHashMap::default();
    for day in DayType::ALL {
        out.insert(day, FxHashSet::default());
    }

    for rule in rules {
        let on_weekdays =
            rule.monday && rule.tuesday && rule.wednesday && rule.thursday && rule.friday;
        let weekday_only = on_weekdays && !rule.saturday && !rule.sunday;
        let saturday_only = rule.saturday
            && !rule.sunday
            && !rule.monday
            && !rule.tuesday
            && !rule.wednesday
            && !rule.thursday
            && !rule.friday;
        let sunday_only = rule.sunday
            && !rule.saturday
            && !rule.monday
            && !rule.tuesday
            && !rule.wednesday
            && !rule.thursday
            && !rule.friday;

        let mut add = |day: DayType| {
            if let Some(set) = out.get_mut(&day) {
                set.insert(rule.service_id.clone());
            }
        };

        if weekday_only {
            add(DayType::Weekday);
        } else if saturday_only {
            add(DayType::Saturday);
        } else if sunday_only {
            add(DayType::Sunday);
        } else {
            if rule.monday || rule.tuesday || rule.wednesday || rule.thursday || rule.friday {
                add(DayType::Weekday);
            }
            if rule.saturday {
                add(DayType::Saturday);
            }
            if rule.sunday {
                add(DayType::Sunday);
            }
        }
    }

    for (day, ids) in &out {
        log::info!("{day}: {} active services", ids.len());
    }
    out
}
