use thiserror::Error;

/// Errors produced while loading schedule data, building graphs, or answering
/// reachability queries.
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory GTFS file is not present in the extracted feed
    #[error("could not find required file {0}")]
    MissingFile(String),
    /// The time is not given in the HH:MM:SS format
    #[error("'{0}' is not a valid time; HH:MM:SS format is expected")]
    InvalidTime(String),
    /// Impossible to read a CSV file
    #[error("impossible to read csv file '{file_name}'")]
    Csv {
        file_name: String,
        #[source]
        source: csv::Error,
    },
    #[error("impossible to read file")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// The requested day type has no graph
    #[error("no graph available for day type '{0}'")]
    InvalidVariant(String),
    /// Origin or queried stop id absent from the selected graph
    #[error("stop not found: {0}")]
    StopNotFound(String),
    /// Required raw inputs absent or malformed; no partial graph is built
    #[error("graph build failed: {0}")]
    BuildFailure(String),
    /// Time budget outside the supported range
    #[error("time budget out of range: {0} minutes")]
    BudgetOutOfRange(u32),
}
