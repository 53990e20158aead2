//! 一次性抓取路径：把整学期的课表记录变成每周重复的课程。
//!
//! 这条路径拿不到单周的变化（停课、调课），生成的日历只按周重复，
//! 精确到具体某一天的情况需要用逐周抓取。

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    ClassMeetingRecord, DraftEvent, Error, MeetingSignature, Occurrence, Result, ScheduleDraft,
    term::TermWindow,
};

/// 记录分组后的中间结果
struct PatternGroup {
    title: Option<String>,
    class_nbr: Option<String>,
    instructors: Vec<String>,
}

/// 重复课程构建器
pub struct PatternBuilder {
    term: TermWindow,
}

impl PatternBuilder {
    pub fn new(term: TermWindow) -> Self {
        Self { term }
    }

    /// 按 (课程, 班别, 星期, 起止时间, 地点) 分组，每组生成一个每周重复事件。
    /// 相同的记录只保留一份，重复调用结果不变。
    pub fn build(&self, records: &[ClassMeetingRecord]) -> Result<ScheduleDraft> {
        let mut groups: BTreeMap<MeetingSignature, PatternGroup> = BTreeMap::new();

        for record in records {
            if let Some(date) = record.date() {
                if !self.term.contains(date) {
                    return Err(Error::Validation(format!(
                        "{} on {} is outside the term {} → {}",
                        record.class_code(),
                        date,
                        self.term.start,
                        self.term.end
                    )));
                }
            }

            let group = groups
                .entry(record.signature())
                .or_insert_with(|| PatternGroup {
                    title: None,
                    class_nbr: None,
                    instructors: Vec::new(),
                });
            if group.title.is_none() {
                group.title.clone_from(&record.title);
            }
            if group.class_nbr.is_none() {
                group.class_nbr.clone_from(&record.class_nbr);
            }
            if let Some(ref instructor) = record.instructor {
                if !group.instructors.contains(instructor) {
                    group.instructors.push(instructor.clone());
                }
            }
        }

        let mut events = Vec::with_capacity(groups.len());
        for (signature, group) in groups {
            if self.term.weekly_dates(signature.weekday).next().is_none() {
                tracing::warn!(
                    "{} 在学期 {} → {} 内没有 {}，已跳过",
                    signature.course_code,
                    self.term.start,
                    self.term.end,
                    signature.weekday
                );
                continue;
            }
            events.push(DraftEvent {
                signature,
                title: group.title,
                class_nbr: group.class_nbr,
                instructors: group.instructors,
                occurrence: Occurrence::Weekly {
                    exclusions: BTreeSet::new(),
                },
            });
        }

        tracing::info!(
            "由 {} 条记录生成 {} 个每周重复课程",
            records.len(),
            events.len()
        );

        Ok(ScheduleDraft {
            term: self.term,
            events,
            missing_weeks: Vec::new(),
        })
    }
}
