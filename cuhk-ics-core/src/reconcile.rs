//! 逐周抓取路径：把每周的课表快照合并成一份规范课表。
//!
//! 在大多数已抓到的周里都出现的课视为固定课程，生成每周重复事件，
//! 某周没出现就把那天记为停课 (EXDATE)；其余的课（加课、换教室、调时间）
//! 生成单次事件。没抓到的周不算停课，只记录为缺失。

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};

use crate::{
    DraftEvent, Error, MeetingSignature, Occurrence, Result, ScheduleDraft, WeekSnapshot,
    term::TermWindow,
};


/// 一个课程时段在各周的出现情况
#[derive(Default)]
struct SlotHistory {
    /// 周次 → 当周的具体日期
    seen: BTreeMap<u32, NaiveDate>,
    title: Option<String>,
    class_nbr: Option<String>,
    instructors: Vec<String>,
}

/// 逐周快照合并器
pub struct SnapshotReconciler {
    term: TermWindow,
}

impl SnapshotReconciler {
    pub fn new(term: TermWindow) -> Self {
        Self { term }
    }

    /// 按周次顺序消费快照，每个快照只读一次
    pub fn reconcile<I>(&self, snapshots: I) -> Result<ScheduleDraft>
    where
        I: IntoIterator<Item = WeekSnapshot>,
    {
        let week_count = self.term.week_count();
        let mut slots: BTreeMap<MeetingSignature, SlotHistory> = BTreeMap::new();
        let mut present: BTreeSet<u32> = BTreeSet::new();
        let mut last_week = 0;

        for snapshot in snapshots {
            self.check_week(&snapshot, last_week, week_count)?;
            last_week = snapshot.week;
            present.insert(snapshot.week);
            tracing::debug!(
                "第 {} 周 ({} → {}): {} 节课",
                snapshot.week,
                snapshot.week_start(),
                snapshot.week_end(),
                snapshot.records.len()
            );

            for record in &snapshot.records {
                let date = record
                    .date()
                    .unwrap_or_else(|| snapshot.date_of(record.weekday));
                if !snapshot.contains(date) || !self.term.contains(date) {
                    return Err(Error::Validation(format!(
                        "{} on {} is outside week {} of the term {} → {}",
                        record.class_code(),
                        date,
                        snapshot.week,
                        self.term.start,
                        self.term.end
                    )));
                }

                let slot = slots.entry(record.signature()).or_default();
                slot.seen.insert(snapshot.week, date);
                if slot.title.is_none() {
                    slot.title.clone_from(&record.title);
                }
                if slot.class_nbr.is_none() {
                    slot.class_nbr.clone_from(&record.class_nbr);
                }
                if let Some(ref instructor) = record.instructor {
                    if !slot.instructors.contains(instructor) {
                        slot.instructors.push(instructor.clone());
                    }
                }
            }
        }

        let missing_weeks: Vec<u32> = (1..=week_count).filter(|w| !present.contains(w)).collect();
        if !missing_weeks.is_empty() {
            tracing::warn!(
                "{}，这些周的课表按固定课程推算，不视为停课",
                Error::ExtractionGap {
                    missing: missing_weeks.clone()
                }
            );
        }

        let mut events = Vec::new();
        let mut stable = 0;
        for (signature, slot) in slots {
            if slot.seen.len() * 2 > present.len() {
                stable += 1;
                let exclusions = self.cancellations(&signature, &slot, &present);
                if !exclusions.is_empty() {
                    tracing::debug!("{} 停课 {} 次", signature.course_code, exclusions.len());
                }
                events.push(DraftEvent {
                    signature,
                    title: slot.title,
                    class_nbr: slot.class_nbr,
                    instructors: slot.instructors,
                    occurrence: Occurrence::Weekly { exclusions },
                });
            } else {
                for &date in slot.seen.values() {
                    events.push(DraftEvent {
                        signature: signature.clone(),
                        title: slot.title.clone(),
                        class_nbr: slot.class_nbr.clone(),
                        instructors: slot.instructors.clone(),
                        occurrence: Occurrence::Once(date),
                    });
                }
            }
        }

        tracing::info!(
            "合并 {} 周快照: {} 个固定课程, {} 个单次课程",
            present.len(),
            stable,
            events.len() - stable
        );

        Ok(ScheduleDraft {
            term: self.term,
            events,
            missing_weeks,
        })
    }

    fn check_week(&self, snapshot: &WeekSnapshot, last_week: u32, week_count: u32) -> Result<()> {
        if snapshot.week <= last_week {
            return Err(Error::Validation(format!(
                "week {} arrived after week {}; snapshots must be in increasing week order",
                snapshot.week, last_week
            )));
        }
        if snapshot.week > week_count {
            return Err(Error::Validation(format!(
                "week {} is beyond the {} weeks of the term {} → {}",
                snapshot.week, week_count, self.term.start, self.term.end
            )));
        }
        let expected = self.term.week_start(snapshot.week);
        if snapshot.week_start() != expected {
            return Err(Error::Validation(format!(
                "week {} should start on {}, but the snapshot shows the week of {}",
                snapshot.week,
                expected,
                snapshot.week_start()
            )));
        }
        Ok(())
    }

    /// 已抓到的周里，该时段应上课却没出现的日期
    fn cancellations(
        &self,
        signature: &MeetingSignature,
        slot: &SlotHistory,
        present: &BTreeSet<u32>,
    ) -> BTreeSet<NaiveDate> {
        present
            .iter()
            .filter(|week| !slot.seen.contains_key(week))
            .map(|&week| {
                self.term.week_start(week)
                    + Duration::days(i64::from(signature.weekday.num_days_from_monday()))
            })
            .filter(|date| self.term.contains(*date))
            .collect()
    }
}
