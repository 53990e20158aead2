use std::{cmp::Ordering, collections::BTreeSet};

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::term::TermWindow;

/// 课程记录中的日期信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingDates {
    /// 具体的某一天（逐周快照模式）
    On(NaiveDate),
    /// 整个学期的上课区间（Teaching Timetable 的 Meeting Date 列）
    Between { first: NaiveDate, last: NaiveDate },
}

impl MeetingDates {
    /// 记录中出现的所有具体日期
    pub fn concrete(&self) -> Vec<NaiveDate> {
        match *self {
            Self::On(date) => vec![date],
            Self::Between { first, last } => vec![first, last],
        }
    }
}

/// 一条上课记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMeetingRecord {
    /// 课程代码，已规范化，如 `CSCI3100`
    pub course_code: String,
    /// 班别，如 `A`；无班别时为 None
    pub section: Option<String>,
    /// 课程名称
    pub title: Option<String>,
    /// Class Nbr
    pub class_nbr: Option<String>,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// 上课地点
    pub location: String,
    /// 任课教师
    pub instructor: Option<String>,
    pub dates: Option<MeetingDates>,
}

impl ClassMeetingRecord {
    /// 逐周快照中的具体上课日期
    pub fn date(&self) -> Option<NaiveDate> {
        match self.dates {
            Some(MeetingDates::On(date)) => Some(date),
            _ => None,
        }
    }

    /// 带班别的课程代码，如 `CSCI3100-A`
    pub fn class_code(&self) -> String {
        match self.section {
            Some(ref section) => format!("{}-{}", self.course_code, section),
            None => self.course_code.clone(),
        }
    }

    pub fn signature(&self) -> MeetingSignature {
        MeetingSignature {
            course_code: self.course_code.clone(),
            section: self.section.clone(),
            weekday: self.weekday,
            start_time: self.start_time,
            end_time: self.end_time,
            location: self.location.clone(),
        }
    }
}

/// 一节课的身份：课程、班别、星期、起止时间、地点
///
/// 任何一个字段不同都视为不同的课（包括同一时段只换了教室的情况）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeetingSignature {
    pub course_code: String,
    pub section: Option<String>,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub location: String,
}

impl MeetingSignature {
    fn sort_key(&self) -> (&str, Option<&str>, u32, NaiveTime, NaiveTime, &str) {
        (
            &self.course_code,
            self.section.as_deref(),
            self.weekday.num_days_from_monday(),
            self.start_time,
            self.end_time,
            &self.location,
        )
    }

    /// 用于生成稳定 UID 的键
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.course_code,
            self.section.as_deref().unwrap_or(""),
            self.weekday,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M"),
            self.location
        )
    }
}

impl Ord for MeetingSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for MeetingSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 某一周的课表快照
#[derive(Debug, Clone)]
pub struct WeekSnapshot {
    /// 第几周，从 1 开始
    pub week: u32,
    /// 抓取时页面显示的那一周中的任意一天
    pub captured_on: NaiveDate,
    /// 这一周观察到的课，每条都带具体日期
    pub records: Vec<ClassMeetingRecord>,
}

impl WeekSnapshot {
    /// 这一周的星期一
    pub fn week_start(&self) -> NaiveDate {
        monday_of(self.captured_on)
    }

    /// 这一周的星期日
    pub fn week_end(&self) -> NaiveDate {
        self.week_start() + Duration::days(6)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.week_start() && date <= self.week_end()
    }

    /// 这一周中指定星期几的日期
    pub fn date_of(&self, weekday: Weekday) -> NaiveDate {
        self.week_start() + Duration::days(i64::from(weekday.num_days_from_monday()))
    }

    /// 按周次倒推出的第 1 周星期一
    pub fn first_week_start(&self) -> NaiveDate {
        self.week_start() - Duration::weeks(i64::from(self.week.saturating_sub(1)))
    }
}

/// 指定日期所在周的星期一
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// 课程的出现方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occurrence {
    /// 每周重复，覆盖整个学期，去掉停课日期
    Weekly { exclusions: BTreeSet<NaiveDate> },
    /// 单次课（加课、调课）
    Once(NaiveDate),
}

/// 构建阶段产出的事件，尚未分配 UID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftEvent {
    pub signature: MeetingSignature,
    pub title: Option<String>,
    pub class_nbr: Option<String>,
    pub instructors: Vec<String>,
    pub occurrence: Occurrence,
}

/// 两条构建路径的共同输出
#[derive(Debug, Clone)]
pub struct ScheduleDraft {
    pub term: TermWindow,
    pub events: Vec<DraftEvent>,
    /// 没有抓到快照的周次
    pub missing_weeks: Vec<u32>,
}

/// 重复规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// 最后一天（含）
    pub until: NaiveDate,
    /// 停课日期 (EXDATE)
    pub exclusions: Vec<NaiveDate>,
}

/// 规范化后的日历事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// 稳定 UID，重复导出不会产生重复事件
    pub uid: String,
    /// 日历标题，如 `CSCI3100-A`
    pub title: String,
    pub course_code: String,
    pub section: Option<String>,
    pub course_title: Option<String>,
    pub class_nbr: Option<String>,
    pub location: String,
    pub instructors: Vec<String>,
    pub description: String,
    /// 第一次上课的开始时间（港澳本地时间）
    pub start: NaiveDateTime,
    /// 第一次上课的结束时间
    pub end: NaiveDateTime,
    /// None 表示单次课
    pub recurrence: Option<Recurrence>,
}

impl CalendarEvent {
    pub fn is_standalone(&self) -> bool {
        self.recurrence.is_none()
    }

    pub fn weekday(&self) -> Weekday {
        self.start.weekday()
    }

    pub fn signature(&self) -> MeetingSignature {
        MeetingSignature {
            course_code: self.course_code.clone(),
            section: self.section.clone(),
            weekday: self.weekday(),
            start_time: self.start.time(),
            end_time: self.end.time(),
            location: self.location.clone(),
        }
    }

    /// 去掉停课日期后的全部上课日期
    pub fn occurrence_dates(&self) -> Vec<NaiveDate> {
        let first = self.start.date();
        match self.recurrence {
            None => vec![first],
            Some(ref rule) => first
                .iter_weeks()
                .take_while(|date| *date <= rule.until)
                .filter(|date| !rule.exclusions.contains(date))
                .collect(),
        }
    }

    /// 不计停课时，重复规则本身会产生的次数
    pub fn scheduled_count(&self) -> usize {
        match self.recurrence {
            None => 1,
            Some(ref rule) => self
                .start
                .date()
                .iter_weeks()
                .take_while(|date| *date <= rule.until)
                .count(),
        }
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrence_dates().len()
    }
}

/// ICS生成选项
#[derive(Debug, Clone)]
pub struct IcsOptions {
    /// 日历名称
    pub calendar_name: Option<String>,
    /// 时区 (TZID)
    pub timezone: String,
    /// 时区相对 UTC 的偏移，港澳时间全年 +08:00
    pub utc_offset: FixedOffset,
    /// 是否包含课程描述
    pub include_description: bool,
    pub reminder_minutes: Option<u32>,
    /// DTSTAMP；None 时使用当前时间
    pub stamp: Option<DateTime<Utc>>,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            calendar_name: Some("CUHK Timetable".to_string()),
            timezone: "Asia/Hong_Kong".to_string(),
            utc_offset: FixedOffset::east_opt(8 * 3600).expect("UTC+8"),
            include_description: true,
            reminder_minutes: Some(15),
            stamp: None,
        }
    }
}

/// 展开后的一次上课
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpandedMeeting {
    pub date: NaiveDate,
    pub signature: MeetingSignature,
}

/// 最终的课表，所有输出格式都只读取它
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledSchedule {
    pub term: TermWindow,
    pub events: Vec<CalendarEvent>,
    /// 缺失快照的周次；非空时这些周的课表不完整
    #[serde(default)]
    pub missing_weeks: Vec<u32>,
}

impl ReconciledSchedule {
    pub fn is_complete(&self) -> bool {
        self.missing_weeks.is_empty()
    }

    pub fn occurrence_count(&self) -> usize {
        self.events.iter().map(CalendarEvent::occurrence_count).sum()
    }

    /// 展开 `[from, to]` 区间内的全部上课，按日期排序
    pub fn expand_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<ExpandedMeeting> {
        let mut meetings: Vec<ExpandedMeeting> = self
            .events
            .iter()
            .flat_map(|event| {
                let signature = event.signature();
                event
                    .occurrence_dates()
                    .into_iter()
                    .filter(move |date| *date >= from && *date <= to)
                    .map(move |date| ExpandedMeeting {
                        date,
                        signature: signature.clone(),
                    })
            })
            .collect();
        meetings.sort();
        meetings
    }
}
