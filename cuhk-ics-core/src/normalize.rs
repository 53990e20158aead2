use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    CalendarEvent, DraftEvent, Error, Occurrence, Recurrence, ReconciledSchedule, Result,
    ScheduleDraft, term::TermWindow,
};

/// UID 的命名空间，改变它会让所有已导出的事件变成新事件
const UID_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_52c4_9d3e_4b7a_8c21_0f5e_d3a9_7b64);

/// UID 后缀
pub const UID_DOMAIN: &str = "cuhk-timetable-export";

/// 由课程身份生成稳定的 UID，单次课额外加上日期
pub fn event_uid(draft: &DraftEvent) -> String {
    let mut key = draft.signature.identity_key();
    if let Occurrence::Once(date) = draft.occurrence {
        key.push('|');
        key.push_str(&date.format("%Y-%m-%d").to_string());
    }
    format!(
        "{}@{}",
        Uuid::new_v5(&UID_NAMESPACE, key.as_bytes()),
        UID_DOMAIN
    )
}

/// 日历标题：`CSCI3100-A`，无班别时 `CSCI3100`
pub fn event_title(draft: &DraftEvent) -> String {
    match draft.signature.section {
        Some(ref section) => format!("{}-{}", draft.signature.course_code, section),
        None => draft.signature.course_code.clone(),
    }
}

pub fn event_description(draft: &DraftEvent) -> String {
    let mut description = format!(
        "Instructors: {}\nCourse: {}",
        draft.instructors.join(", "),
        draft
            .title
            .as_deref()
            .unwrap_or(&draft.signature.course_code)
    );
    if let Some(ref nbr) = draft.class_nbr {
        description.push_str(&format!("\nClass Nbr: {}", nbr));
    }
    if matches!(draft.occurrence, Occurrence::Once(_)) {
        description.push_str("\nOne-off session (added or rescheduled)");
    }
    description
}

/// 把任一构建路径的输出变成规范课表：分配 UID、生成标题和描述，并检查不变量
pub fn normalize(draft: ScheduleDraft) -> Result<ReconciledSchedule> {
    let term = draft.term;
    let mut events = Vec::with_capacity(draft.events.len());
    let mut seen_uids = BTreeSet::new();

    for entry in draft.events {
        let event = to_calendar_event(&entry, &term)?;
        if !seen_uids.insert(event.uid.clone()) {
            tracing::debug!("重复事件已合并: {}", event.title);
            continue;
        }
        events.push(event);
    }

    events.sort_by(|a, b| (a.start, &a.title, &a.uid).cmp(&(b.start, &b.title, &b.uid)));
    warn_overlaps(&events);

    Ok(ReconciledSchedule {
        term,
        events,
        missing_weeks: draft.missing_weeks,
    })
}

fn to_calendar_event(draft: &DraftEvent, term: &TermWindow) -> Result<CalendarEvent> {
    let signature = &draft.signature;
    let (first, recurrence) = match draft.occurrence {
        Occurrence::Once(date) => {
            if !term.contains(date) {
                return Err(Error::Validation(format!(
                    "{} on {} is outside the term",
                    signature.course_code, date
                )));
            }
            (date, None)
        }
        Occurrence::Weekly { ref exclusions } => {
            let dates: Vec<NaiveDate> = term.weekly_dates(signature.weekday).collect();
            let Some(&first) = dates.first() else {
                return Err(Error::Validation(format!(
                    "{} never meets on {} within the term",
                    signature.course_code, signature.weekday
                )));
            };
            if let Some(stray) = exclusions.iter().find(|d| !dates.contains(d)) {
                return Err(Error::Validation(format!(
                    "{}: excluded date {} is not a scheduled occurrence",
                    signature.course_code, stray
                )));
            }
            (
                first,
                Some(Recurrence {
                    until: term.end,
                    exclusions: exclusions.iter().copied().collect(),
                }),
            )
        }
    };

    Ok(CalendarEvent {
        uid: event_uid(draft),
        title: event_title(draft),
        course_code: signature.course_code.clone(),
        section: signature.section.clone(),
        course_title: draft.title.clone(),
        class_nbr: draft.class_nbr.clone(),
        location: signature.location.clone(),
        instructors: draft.instructors.clone(),
        description: event_description(draft),
        start: first.and_time(signature.start_time),
        end: first.and_time(signature.end_time),
        recurrence,
    })
}

/// 同一门课同一天时间重叠时只提示，不删除
fn warn_overlaps(events: &[CalendarEvent]) {
    let mut by_day: BTreeMap<(&str, NaiveDate), Vec<&CalendarEvent>> = BTreeMap::new();
    for event in events {
        for date in event.occurrence_dates() {
            by_day
                .entry((event.course_code.as_str(), date))
                .or_default()
                .push(event);
        }
    }
    for ((course, date), day_events) in by_day {
        for (i, a) in day_events.iter().enumerate() {
            for b in &day_events[i + 1..] {
                if a.start.time() < b.end.time() && b.start.time() < a.end.time() {
                    tracing::warn!(
                        "{} 在 {} 有时间重叠的两节课: {} ({}) 与 {} ({})",
                        course,
                        date,
                        a.title,
                        a.location,
                        b.title,
                        b.location
                    );
                }
            }
        }
    }
}
