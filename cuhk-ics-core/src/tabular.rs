//! 表格 (CSV) 输出：每个事件系列一行

use serde::Serialize;

use crate::{CalendarEvent, Error, ReconciledSchedule, Result};

/// CSV 中的一行
#[derive(Debug, Serialize)]
struct EventRow<'a> {
    uid: &'a str,
    course: &'a str,
    section: &'a str,
    title: &'a str,
    kind: &'static str,
    weekday: String,
    start: String,
    end: String,
    first_date: String,
    last_date: String,
    location: &'a str,
    instructor: String,
    occurrences: usize,
    recurrence: String,
}

impl<'a> EventRow<'a> {
    fn new(event: &'a CalendarEvent) -> Self {
        let dates = event.occurrence_dates();
        let first = dates.first().copied().unwrap_or(event.start.date());
        let last = dates.last().copied().unwrap_or(first);
        Self {
            uid: &event.uid,
            course: &event.course_code,
            section: event.section.as_deref().unwrap_or(""),
            title: event.course_title.as_deref().unwrap_or(""),
            kind: if event.is_standalone() { "once" } else { "weekly" },
            weekday: event.weekday().to_string(),
            start: event.start.format("%H:%M").to_string(),
            end: event.end.format("%H:%M").to_string(),
            first_date: first.to_string(),
            last_date: last.to_string(),
            location: &event.location,
            instructor: event.instructors.join("; "),
            occurrences: dates.len(),
            recurrence: recurrence_summary(event),
        }
    }
}

/// `Weekly on Tue until 2026-04-24 except 2026-02-10` / `Once on 2026-02-11`
pub fn recurrence_summary(event: &CalendarEvent) -> String {
    match event.recurrence {
        None => format!("Once on {}", event.start.date()),
        Some(ref rule) => {
            let mut summary = format!("Weekly on {} until {}", event.weekday(), rule.until);
            if !rule.exclusions.is_empty() {
                let excluded: Vec<String> =
                    rule.exclusions.iter().map(ToString::to_string).collect();
                summary.push_str(" except ");
                summary.push_str(&excluded.join(", "));
            }
            summary
        }
    }
}

/// 生成 CSV 内容（带表头）
pub fn to_csv(schedule: &ReconciledSchedule) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for event in &schedule.events {
        writer.serialize(EventRow::new(event))?;
    }
    writer
        .into_inner()
        .map_err(|err| Error::Serialization(err.to_string()))
}
