//! 课表数据来源：保存的 JSON 文件，或外部提取器推送的实时数据流。

pub mod feed;
pub mod file;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    ClassMeetingRecord, Error, MeetingDates, Result, WeekSnapshot, record::apply_subject_hint,
    term::TermHint,
};

pub use feed::{FeedMode, FeedOptions, FeedSource};
pub use file::{ExtractionFile, SnapshotFile};

/// 来源交出的数据，决定后面走哪条构建路径
#[derive(Debug, Clone)]
pub enum Payload {
    /// 整学期的记录，交给重复课程构建器
    Records {
        records: Vec<ClassMeetingRecord>,
        term: TermHint,
    },
    /// 逐周快照，交给快照对账器
    Weekly {
        snapshots: Vec<WeekSnapshot>,
        term: TermHint,
    },
}

impl Payload {
    pub fn term_hint(&self) -> TermHint {
        match self {
            Self::Records { term, .. } | Self::Weekly { term, .. } => *term,
        }
    }

    /// 用于推断学期区间的日期
    ///
    /// 整学期记录取记录中的具体日期。逐周快照取按周次倒推的第 1 周星期一
    /// 和每个快照所在周的星期日，这样首尾几周缺失或没有课时周次编号不会错位。
    pub fn concrete_dates(&self) -> Vec<NaiveDate> {
        match self {
            Self::Records { records, .. } => records
                .iter()
                .filter_map(|r| r.dates.as_ref())
                .flat_map(MeetingDates::concrete)
                .collect(),
            Self::Weekly { snapshots, .. } => snapshots
                .iter()
                .flat_map(|s| [s.first_week_start(), s.week_end()])
                .collect(),
        }
    }

    /// 课程代码只有数字时补上学科前缀
    pub fn apply_subject_hint(&mut self, subject: &str) {
        let records: Box<dyn Iterator<Item = &mut ClassMeetingRecord> + '_> = match self {
            Self::Records { records, .. } => Box::new(records.iter_mut()),
            Self::Weekly { snapshots, .. } => {
                Box::new(snapshots.iter_mut().flat_map(|s| s.records.iter_mut()))
            }
        };
        for record in records {
            apply_subject_hint(record, subject);
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            Self::Records { records, .. } => records.len(),
            Self::Weekly { snapshots, .. } => snapshots.iter().map(|s| s.records.len()).sum(),
        }
    }
}

/// 一次获取的结果
#[derive(Debug)]
pub struct Acquisition {
    pub payload: Payload,
    /// 读取中途超时；此时 payload 只包含超时前收到的部分
    pub interrupted: Option<Error>,
}

impl Acquisition {
    pub fn complete(payload: Payload) -> Self {
        Self {
            payload,
            interrupted: None,
        }
    }
}

/// 数据来源trait
#[async_trait]
pub trait TimetableSource: Send {
    /// Source name
    fn name(&self) -> &str;

    /// Source description
    fn description(&self) -> &str;

    /// 读取数据；只调用一次
    async fn acquire(&mut self) -> Result<Acquisition>;
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Weekday};

    use super::*;
    use crate::Occurrence;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_concrete_dates_include_both_range_ends() {
        let record = ClassMeetingRecord {
            course_code: "ROSE5720".to_string(),
            section: None,
            title: None,
            class_nbr: None,
            weekday: Weekday::Mon,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            location: String::new(),
            instructor: None,
            dates: Some(MeetingDates::Between {
                first: date(2026, 1, 5),
                last: date(2026, 4, 20),
            }),
        };
        let payload = Payload::Records {
            records: vec![record],
            term: TermHint::default(),
        };
        assert_eq!(
            payload.concrete_dates(),
            vec![date(2026, 1, 5), date(2026, 4, 20)]
        );
        assert_eq!(payload.record_count(), 1);
    }

    fn tuesday_lecture(on: NaiveDate) -> ClassMeetingRecord {
        ClassMeetingRecord {
            course_code: "CSCI3100".to_string(),
            section: None,
            title: None,
            class_nbr: None,
            weekday: Weekday::Tue,
            start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            location: "LSB LT1".to_string(),
            instructor: None,
            dates: Some(MeetingDates::On(on)),
        }
    }

    /// 第 1 周从 2026-01-05 开始；`empty` 中的周次抓到了但没有课
    fn weekly(weeks: impl IntoIterator<Item = u32>, empty: &[u32], term: TermHint) -> Payload {
        let snapshots = weeks
            .into_iter()
            .map(|week| {
                let monday = date(2026, 1, 5) + chrono::Duration::weeks(i64::from(week) - 1);
                let records = if empty.contains(&week) {
                    Vec::new()
                } else {
                    vec![tuesday_lecture(monday + chrono::Duration::days(1))]
                };
                WeekSnapshot {
                    week,
                    captured_on: monday + chrono::Duration::days(3),
                    records,
                }
            })
            .collect();
        Payload::Weekly { snapshots, term }
    }

    fn reconcile(payload: Payload) -> crate::ScheduleDraft {
        let term = crate::term::TermResolver::new(crate::term::TermOverride::default())
            .with_hint(payload.term_hint())
            .resolve(payload.concrete_dates())
            .unwrap();
        let Payload::Weekly { snapshots, .. } = payload else {
            unreachable!()
        };
        crate::reconcile::SnapshotReconciler::new(term)
            .reconcile(snapshots)
            .unwrap()
    }

    #[test]
    fn test_inferred_term_keeps_week_numbering_without_first_week() {
        let draft = reconcile(weekly(2..=16, &[], TermHint::default()));
        assert_eq!(draft.term.start, date(2026, 1, 5));
        assert_eq!(draft.term.end, date(2026, 4, 26));
        assert_eq!(draft.missing_weeks, vec![1]);
    }

    #[test]
    fn test_empty_edge_weeks_still_count() {
        let draft = reconcile(weekly(1..=16, &[1, 16], TermHint::default()));
        assert_eq!(draft.term.start, date(2026, 1, 5));
        assert_eq!(draft.term.week_count(), 16);
        assert!(draft.missing_weeks.is_empty());
        // 两端没有课的周按停课处理
        let Occurrence::Weekly { ref exclusions } = draft.events[0].occurrence else {
            panic!("expected a weekly event");
        };
        assert_eq!(
            exclusions.iter().copied().collect::<Vec<_>>(),
            vec![date(2026, 1, 6), date(2026, 4, 21)]
        );
    }

    #[test]
    fn test_term_hint_reveals_missing_last_week() {
        let hint = TermHint {
            start: None,
            end: Some(date(2026, 4, 24)),
        };
        let draft = reconcile(weekly(2..=15, &[], hint));
        assert_eq!(draft.term.start, date(2026, 1, 5));
        assert_eq!(draft.missing_weeks, vec![1, 16]);
    }
}
