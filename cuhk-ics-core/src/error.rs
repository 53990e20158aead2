use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot infer term boundaries: {0}. Pass --term-start and --term-end (YYYY-MM-DD)")]
    Inference(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing weekly snapshots for week(s) {}", format_weeks(.missing))]
    ExtractionGap { missing: Vec<u32> },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Timed out waiting for {0}")]
    InteractionTimeout(String),

    #[error("No course matched the selection: {0}")]
    NoCourseSelected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date/time parsing failed: {0}")]
    DateTime(#[from] chrono::ParseError),
}

fn format_weeks(weeks: &[u32]) -> String {
    weeks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
