//! Raw GTFS records and the CSV loader that turns an extracted feed
//! directory into typed vectors. Mapping those records into graphs lives in
//! the builder.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::info;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::Error;
use crate::time::{deserialize_optional_time, Time};

#[derive(Debug, Clone, Deserialize)]
pub struct RawStop {
    pub stop_id: String,
    pub stop_name: String,
    #[serde(default, deserialize_with = "de_with_optional_float")]
    pub stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "de_with_optional_float")]
    pub stop_lon: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRoute {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub arrival_time: Option<Time>,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub departure_time: Option<Time>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCalendar {
    pub service_id: String,
    #[serde(deserialize_with = "deserialize_bool")]
    pub monday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub tuesday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub wednesday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub thursday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub friday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub saturday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub sunday: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransfer {
    pub from_stop_id: String,
    pub to_stop_id: String,
    #[serde(default, deserialize_with = "de_with_optional_u32")]
    pub min_transfer_time: Option<u32>,
}

/// One parsed feed, ready for graph construction.
#[derive(Debug, Default)]
pub struct Feed {
    pub stops: Vec<RawStop>,
    pub routes: Vec<RawRoute>,
    pub trips: Vec<RawTrip>,
    pub stop_times: Vec<RawStopTime>,
    pub calendar: Vec<RawCalendar>,
    pub transfers: Option<Vec<RawTransfer>>,
}

impl Feed {
    /// Reads an extracted GTFS directory. Missing required files abort the
    /// load; `transfers.txt` is optional.
    pub fn from_dir(dir: &Path) -> Result<Feed, Error> {
        let feed = Feed {
            stops: read_objs(dir, "stops.txt")?,
            routes: read_objs(dir, "routes.txt")?,
            trips: read_objs(dir, "trips.txt")?,
            stop_times: read_objs(dir, "stop_times.txt")?,
            calendar: read_objs(dir, "calendar.txt")?,
            transfers: read_optional_objs(dir, "transfers.txt")?,
        };
        info!(
            "loaded feed: {} stops, {} routes, {} trips, {} stop times, {} calendar rules, {} transfers",
            feed.stops.len(),
            feed.routes.len(),
            feed.trips.len(),
            feed.stop_times.len(),
            feed.calendar.len(),
            feed.transfers.as_ref().map_or(0, Vec::len),
        );
        Ok(feed)
    }
}

fn read_objs<O>(dir: &Path, file_name: &str) -> Result<Vec<O>, Error>
where
    for<'de> O: Deserialize<'de>,
{
    let path = dir.join(file_name);
    if !path.exists() {
        return Err(Error::MissingFile(file_name.to_owned()));
    }
    read_records(File::open(path)?, file_name)
}

fn read_optional_objs<O>(dir: &Path, file_name: &str) -> Result<Option<Vec<O>>, Error>
where
    for<'de> O: Deserialize<'de>,
{
    let path = dir.join(file_name);
    if !path.exists() {
        return Ok(None);
    }
    read_records(File::open(path)?, file_name).map(Some)
}

fn read_records<R, O>(mut reader: R, file_name: &str) -> Result<Vec<O>, Error>
where
    R: Read,
    for<'de> O: Deserialize<'de>,
{
    // Some feeds ship their CSV files with a UTF-8 BOM.
    let mut bom = [0; 3];
    reader.read_exact(&mut bom)?;
    let chained = if bom != [0xefu8, 0xbbu8, 0xbfu8] {
        bom.chain(reader)
    } else {
        [].chain(reader)
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(chained);

    let headers = reader
        .headers()
        .map_err(|e| Error::Csv {
            file_name: file_name.to_owned(),
            source: e,
        })?
        .clone();

    let mut rec = csv::StringRecord::new();
    let mut objs = Vec::new();
    while reader.read_record(&mut rec).map_err(|e| Error::Csv {
        file_name: file_name.to_owned(),
        source: e,
    })? {
        let obj = rec.deserialize(Some(&headers)).map_err(|e| Error::Csv {
            file_name: file_name.to_owned(),
            source: e,
        })?;
        objs.push(obj);
    }
    Ok(objs)
}

fn deserialize_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = serde::Deserialize::deserialize(deserializer)?;
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(de::Error::custom(format!(
            "invalid value `{s}`, expected 0 or 1"
        ))),
    }
}

fn de_with_optional_float<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de).and_then(|s| {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some).map_err(de::Error::custom)
        }
    })
}

fn de_with_optional_u32<'de, D>(de: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de).and_then(|s| {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some).map_err(de::Error::custom)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stop_times_past_midnight() {
        let data = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                    t1,25:10:00,25:12:00,s1,3\n";
        let rows: Vec<RawStopTime> = read_records(data.as_bytes(), "stop_times.txt").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].arrival_time, Some(Time(25 * 3600 + 10 * 60)));
        assert_eq!(rows[0].departure_time, Some(Time(25 * 3600 + 12 * 60)));
        assert_eq!(rows[0].stop_sequence, 3);
    }

    #[test]
    fn empty_times_parse_as_none() {
        let data = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                    t1,,,s1,1\n";
        let rows: Vec<RawStopTime> = read_records(data.as_bytes(), "stop_times.txt").unwrap();
        assert_eq!(rows[0].arrival_time, None);
        assert_eq!(rows[0].departure_time, None);
    }

    #[test]
    fn parses_calendar_day_flags() {
        let data = "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday\n\
                    wk,1,1,1,1,1,0,0\n";
        let rows: Vec<RawCalendar> = read_records(data.as_bytes(), "calendar.txt").unwrap();
        assert!(rows[0].monday && rows[0].friday);
        assert!(!rows[0].saturday && !rows[0].sunday);
    }

    #[test]
    fn rejects_calendar_flags_outside_zero_one() {
        let data = "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday\n\
                    bad,2,0,0,0,0,0,0\n";
        let result: Result<Vec<RawCalendar>, _> = read_records(data.as_bytes(), "calendar.txt");
        assert!(result.is_err());
    }

    #[test]
    fn transfer_time_may_be_blank() {
        let data = "from_stop_id,to_stop_id,transfer_type,min_transfer_time\n\
                    a,b,2,240\n\
                    b,a,2,\n";
        let rows: Vec<RawTransfer> = read_records(data.as_bytes(), "transfers.txt").unwrap();
        assert_eq!(rows[0].min_transfer_time, Some(240));
        assert_eq!(rows[1].min_transfer_time, None);
    }

    #[test]
    fn skips_utf8_bom() {
        let data = b"\xef\xbb\xbfstop_id,stop_name,stop_lat,stop_lon\ns1,Main St,48.1,11.5\n";
        let rows: Vec<RawStop> = read_records(&data[..], "stops.txt").unwrap();
        assert_eq!(rows[0].stop_id, "s1");
        assert_eq!(rows[0].stop_lat, Some(48.1));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let err = Feed::from_dir(Path::new("/nonexistent/feed")).unwrap_err();
        assert!(matches!(err, Error::MissingFile(f) if f == "stops.txt"));
    }
}
