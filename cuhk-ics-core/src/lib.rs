//! CUHK ICS Core Library
//!
//! This library turns CUHK timetable records, either one term-level extraction
//! or a sequence of weekly snapshots, into a reconciled schedule and exports it
//! as ICS, CSV or JSON.

pub mod error;
pub mod export;
pub mod ics;
pub mod normalize;
pub mod pattern;
pub mod reconcile;
pub mod record;
pub mod selection;
pub mod source;
pub mod structured;
pub mod tabular;
pub mod term;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, Result};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        export::{Format, export, render, write_atomic},
        ics::IcsGenerator,
        normalize::normalize,
        pattern::PatternBuilder,
        reconcile::SnapshotReconciler,
        record::{Extraction, RawMeetingRecord, RawWeekSnapshot},
        selection::CourseSelection,
        source::*,
        term::*,
        types::*,
    };
}
