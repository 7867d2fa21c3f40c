use std::ops::{Add, Sub};

use rkyv::{Archive, Deserialize, Serialize};
use serde::de::{self, Deserializer};

use crate::error::Error;

/// Seconds since the service-day midnight. Values above 86400 are legal and
/// represent post-midnight service still belonging to the previous service
/// day (a "25:10:00" departure).
#[derive(
    Archive, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug, Default,
)]
#[archive(check_bytes)]
pub struct Time(pub u32);

impl Time {
    pub const DAY: u32 = 24 * 3600;

    pub fn next_day(self) -> Time {
        Time(self.0 + Self::DAY)
    }
}

impl Add<u32> for Time {
    type Output = Time;

    fn add(self, rhs: u32) -> Time {
        Time(self.0 + rhs)
    }
}

impl Sub for Time {
    type Output = u32;

    fn sub(self, rhs: Time) -> u32 {
        self.0 - rhs.0
    }
}

fn parse_time_impl(h: &str, m: &str, s: &str) -> Result<u32, std::num::ParseIntError> {
    let hours: u32 = h.parse()?;
    let minutes: u32 = m.parse()?;
    let seconds: u32 = s.parse()?;
    Ok(hours * 3600 + minutes * 60 + seconds)
}

/// Parses a GTFS "HH:MM:SS" timestamp. Hours may exceed 24.
pub fn parse_time(s: &str) -> Result<Time, Error> {
    let len = s.len();
    if !(7..=8).contains(&len) {
        return Err(Error::InvalidTime(s.to_owned()));
    }
    let sec = &s[len - 2..];
    let min = &s[len - 5..len - 3];
    let hour = &s[..len - 6];
    parse_time_impl(hour, min, sec)
        .map(Time)
        .map_err(|_| Error::InvalidTime(s.to_owned()))
}

/// Parses an "HH:MM" clock string, the shape departure times arrive in from
/// API requests.
pub fn parse_clock(s: &str) -> Result<Time, Error> {
    match s.split_once(':') {
        Some((h, m)) => parse_time_impl(h, m, "0")
            .map(Time)
            .map_err(|_| Error::InvalidTime(s.to_owned())),
        None => Err(Error::InvalidTime(s.to_owned())),
    }
}

pub fn deserialize_time<'de, D>(deserializer: D) -> Result<Time, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = serde::Deserialize::deserialize(deserializer)?;
    parse_time(s).map_err(de::Error::custom)
}

pub fn deserialize_optional_time<'de, D>(deserializer: D) -> Result<Option<Time>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<&str> = serde::Deserialize::deserialize(deserializer)?;
    match s {
        None | Some("") => Ok(None),
        Some(t) => parse_time(t).map(Some).map_err(de::Error::custom),
    }
}
