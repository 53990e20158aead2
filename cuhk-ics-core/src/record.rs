//! 上游提取器交给核心的记录格式，以及到 [`ClassMeetingRecord`] 的校验转换。
//!
//! 提取器负责从网页结构里取出每一节课；这里只处理已经拆好字段的记录，
//! 不尝试修复错误的网页内容。

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    ClassMeetingRecord, Error, MeetingDates, Result, WeekSnapshot, term::TermHint,
};

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d{1,2}):(\d{2})\s*(AM|PM)?\s*[-–]\s*(\d{1,2}):(\d{2})\s*(AM|PM)?",
    )
    .expect("time range pattern")
});

static SINGLE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2}):(\d{2})(?::\d{2})?\s*(AM|PM)?\s*$").expect("time pattern")
});

static CLASS_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{2,6})(\d{3,4})-?(.*)$").expect("class code pattern")
});

/// 提取器输出的一条原始记录，字段都是字符串
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMeetingRecord {
    /// 课程代码，如 `CSCI3100`、`ROSE 5770`、`ROSE5720-`
    #[serde(alias = "class_code")]
    pub course_code: String,
    pub section: Option<String>,
    #[serde(alias = "course_title")]
    pub title: Option<String>,
    pub class_nbr: Option<String>,
    /// 星期，如 `Tue`、`TUESDAY`、`Tu`
    pub day: Option<String>,
    /// 时间段，如 `10:30 - 11:15` 或 `06:30PM - 09:15PM`
    pub time: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(alias = "room", alias = "venue")]
    pub location: Option<String>,
    #[serde(alias = "instructors")]
    pub instructor: Option<String>,
    /// 具体上课日期（`YYYY-MM-DD` 或 `dd/mm/yyyy`）
    pub date: Option<String>,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

impl TryFrom<RawMeetingRecord> for ClassMeetingRecord {
    type Error = Error;

    fn try_from(raw: RawMeetingRecord) -> Result<Self> {
        let (course_code, code_section) = split_class_code(&raw.course_code)?;
        let section = raw
            .section
            .as_deref()
            .and_then(normalize_section)
            .or(code_section);

        let (start_time, end_time) = match (raw.time.as_deref(), raw.start.as_deref(), raw.end.as_deref()) {
            (_, Some(start), Some(end)) => (parse_time(start)?, parse_time(end)?),
            (Some(range), _, _) => parse_time_range(range)?,
            _ => {
                return Err(Error::Validation(format!(
                    "{}: missing meeting time",
                    course_code
                )));
            }
        };
        if start_time >= end_time {
            return Err(Error::Validation(format!(
                "{}: meeting starts at {} but ends at {}",
                course_code, start_time, end_time
            )));
        }

        let date = raw.date.as_deref().map(parse_date).transpose()?;
        let dates = match (date, raw.first_date.as_deref(), raw.last_date.as_deref()) {
            (Some(date), _, _) => Some(MeetingDates::On(date)),
            (None, Some(first), Some(last)) => {
                let (first, last) = (parse_date(first)?, parse_date(last)?);
                if first > last {
                    return Err(Error::Validation(format!(
                        "{}: meeting dates {} - {} are inverted",
                        course_code, first, last
                    )));
                }
                Some(MeetingDates::Between { first, last })
            }
            _ => None,
        };

        let weekday = match (raw.day.as_deref().map(str::trim).filter(|d| !d.is_empty()), date) {
            (Some(day), date) => {
                let weekday = normalize_day(day).ok_or_else(|| {
                    Error::Validation(format!("{}: unknown weekday '{}'", course_code, day))
                })?;
                if let Some(date) = date {
                    if date.weekday() != weekday {
                        return Err(Error::Validation(format!(
                            "{}: {} is a {}, not a {}",
                            course_code,
                            date,
                            date.weekday(),
                            weekday
                        )));
                    }
                }
                weekday
            }
            (None, Some(date)) => date.weekday(),
            (None, None) => {
                return Err(Error::Validation(format!(
                    "{}: missing weekday",
                    course_code
                )));
            }
        };

        Ok(Self {
            course_code,
            section,
            title: non_empty(raw.title),
            class_nbr: non_empty(raw.class_nbr),
            weekday,
            start_time,
            end_time,
            location: raw.location.map(|l| l.trim().to_string()).unwrap_or_default(),
            instructor: non_empty(raw.instructor),
            dates,
        })
    }
}

/// 一次性抓取（Teaching Timetable）得到的全部记录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub records: Vec<RawMeetingRecord>,
    /// 页面上的学期起止日期（如果有）
    #[serde(default)]
    pub term: Option<TermHint>,
}

impl Extraction {
    /// 接受 `{"records": [...]}` 或直接的记录数组
    pub fn from_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Document {
            Full(Extraction),
            Bare(Vec<RawMeetingRecord>),
        }

        Ok(match serde_json::from_str::<Document>(json)? {
            Document::Full(extraction) => extraction,
            Document::Bare(records) => Self {
                records,
                term: None,
            },
        })
    }

    pub fn validate(self) -> Result<(Vec<ClassMeetingRecord>, TermHint)> {
        let records = self
            .records
            .into_iter()
            .map(ClassMeetingRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((records, self.term.unwrap_or_default()))
    }
}

/// 逐周抓取时某一周的原始快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWeekSnapshot {
    pub week: u32,
    /// 页面显示的那一周中的任意一天
    pub captured_on: String,
    #[serde(default)]
    pub records: Vec<RawMeetingRecord>,
    #[serde(default)]
    pub term: Option<TermHint>,
}

impl TryFrom<RawWeekSnapshot> for WeekSnapshot {
    type Error = Error;

    /// 没有日期的记录按星期几补上这一周的日期；日期不在这一周内则报错
    fn try_from(raw: RawWeekSnapshot) -> Result<Self> {
        if raw.week == 0 {
            return Err(Error::Validation("week index starts at 1".to_string()));
        }
        let mut snapshot = Self {
            week: raw.week,
            captured_on: parse_date(&raw.captured_on)?,
            records: Vec::with_capacity(raw.records.len()),
        };

        for raw_record in raw.records {
            let mut record = ClassMeetingRecord::try_from(raw_record)?;
            match record.date() {
                Some(date) if !snapshot.contains(date) => {
                    return Err(Error::Validation(format!(
                        "{} on {} is outside week {} ({} → {})",
                        record.course_code,
                        date,
                        snapshot.week,
                        snapshot.week_start(),
                        snapshot.week_end()
                    )));
                }
                Some(_) => {}
                None => {
                    record.dates = Some(MeetingDates::On(snapshot.date_of(record.weekday)));
                }
            }
            snapshot.records.push(record);
        }

        Ok(snapshot)
    }
}

/// 页面上只写了课号（如 `5720`）时，用给定的学科代码补全为 `ROSE5720`
pub fn apply_subject_hint(record: &mut ClassMeetingRecord, subject: &str) {
    let subject: String = subject
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if subject.is_empty() || !record.course_code.starts_with(|c: char| c.is_ascii_digit()) {
        return;
    }
    record.course_code = format!("{}{}", subject, record.course_code);
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_section(section: &str) -> Option<String> {
    let section = section.trim().trim_matches('-').trim();
    if section.is_empty() {
        None
    } else {
        Some(section.to_string())
    }
}

/// `ROSE 5770` → (`ROSE5770`, None)，`CSCI3100-A` → (`CSCI3100`, Some("A"))
pub fn split_class_code(code: &str) -> Result<(String, Option<String>)> {
    let compact: String = code
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if compact.is_empty() {
        return Err(Error::Validation("record without course code".to_string()));
    }
    Ok(match CLASS_CODE.captures(&compact) {
        Some(caps) => (
            format!("{}{}", &caps[1], &caps[2]),
            normalize_section(&caps[3]),
        ),
        None => (compact.trim_end_matches('-').to_string(), None),
    })
}

/// 按前缀识别星期，`Mon`、`MONDAY`、`Mo` 都可以
pub fn normalize_day(text: &str) -> Option<Weekday> {
    let t = text.trim().to_lowercase();
    [
        ("mo", Weekday::Mon),
        ("tu", Weekday::Tue),
        ("we", Weekday::Wed),
        ("th", Weekday::Thu),
        ("fr", Weekday::Fri),
        ("sa", Weekday::Sat),
        ("su", Weekday::Sun),
    ]
    .into_iter()
    .find_map(|(prefix, day)| t.starts_with(prefix).then_some(day))
}

fn to_24h(hour: &str, minute: &str, meridiem: Option<&str>) -> Result<NaiveTime> {
    let mut hour: u32 = hour.parse().map_err(|_| invalid_time(hour))?;
    let minute: u32 = minute.parse().map_err(|_| invalid_time(minute))?;
    match meridiem.map(str::to_uppercase).as_deref() {
        Some("AM") if hour == 12 => hour = 0,
        Some("PM") if hour != 12 => hour += 12,
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| invalid_time(&format!("{}:{:02}", hour, minute)))
}

fn invalid_time(text: &str) -> Error {
    Error::Validation(format!("invalid time '{}'", text))
}

/// `10:30 - 11:15`、`06:30PM - 09:15PM` → 24 小时制起止时间
pub fn parse_time_range(text: &str) -> Result<(NaiveTime, NaiveTime)> {
    let caps = TIME_RANGE
        .captures(text)
        .ok_or_else(|| Error::Validation(format!("invalid time range '{}'", text)))?;
    let start = to_24h(&caps[1], &caps[2], caps.get(3).map(|m| m.as_str()))?;
    let end = to_24h(&caps[4], &caps[5], caps.get(6).map(|m| m.as_str()))?;
    Ok((start, end))
}

pub fn parse_time(text: &str) -> Result<NaiveTime> {
    let caps = SINGLE_TIME.captures(text).ok_or_else(|| invalid_time(text))?;
    to_24h(&caps[1], &caps[2], caps.get(3).map(|m| m.as_str()))
}

/// `2026-01-05` 或香港格式 `05/01/2026`
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .map_err(|_| Error::Validation(format!("invalid date '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str, day: &str, time: &str) -> RawMeetingRecord {
        RawMeetingRecord {
            course_code: code.to_string(),
            day: Some(day.to_string()),
            time: Some(time.to_string()),
            location: Some(" LSB LT1 ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_time_range_with_meridiem() {
        let (start, end) = parse_time_range("06:30PM - 09:15PM").unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(21, 15, 0).unwrap());

        let (start, end) = parse_time_range("12:00AM – 12:30PM").unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(12, 30, 0).unwrap());

        assert!(parse_time_range("TBA").is_err());
    }

    #[test]
    fn test_normalize_day() {
        assert_eq!(normalize_day("Tue"), Some(Weekday::Tue));
        assert_eq!(normalize_day("THURSDAY"), Some(Weekday::Thu));
        assert_eq!(normalize_day("Su"), Some(Weekday::Sun));
        assert_eq!(normalize_day("TBA"), None);
    }

    #[test]
    fn test_split_class_code() {
        assert_eq!(split_class_code("ROSE 5770").unwrap(), ("ROSE5770".to_string(), None));
        assert_eq!(split_class_code("ROSE5720-").unwrap(), ("ROSE5720".to_string(), None));
        assert_eq!(
            split_class_code("csci3100-a").unwrap(),
            ("CSCI3100".to_string(), Some("A".to_string()))
        );
        assert!(split_class_code("  ").is_err());
    }

    #[test]
    fn test_record_conversion() {
        let mut r = raw("CSCI 3100", "Tuesday", "02:00PM - 04:00PM");
        r.section = Some("-".to_string());
        r.instructor = Some("  ".to_string());
        r.first_date = Some("06/01/2026".to_string());
        r.last_date = Some("2026-04-21".to_string());

        let record = ClassMeetingRecord::try_from(r).unwrap();
        assert_eq!(record.course_code, "CSCI3100");
        assert_eq!(record.section, None);
        assert_eq!(record.instructor, None);
        assert_eq!(record.location, "LSB LT1");
        assert_eq!(record.weekday, Weekday::Tue);
        assert_eq!(
            record.dates.unwrap().concrete(),
            vec![
                NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
                NaiveDate::from_ymd_opt(2026, 4, 21).unwrap()
            ]
        );
    }

    #[test]
    fn test_record_rejects_bad_fields() {
        let err = ClassMeetingRecord::try_from(raw("CSCI3100", "Tue", "16:00 - 14:00")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut wrong_day = raw("CSCI3100", "Wed", "14:00 - 16:00");
        wrong_day.date = Some("2026-01-06".to_string());
        assert!(ClassMeetingRecord::try_from(wrong_day).is_err());

        let mut no_day = raw("CSCI3100", "", "14:00 - 16:00");
        no_day.date = Some("2026-01-06".to_string());
        assert_eq!(ClassMeetingRecord::try_from(no_day).unwrap().weekday, Weekday::Tue);
    }

    #[test]
    fn test_snapshot_fills_dates() {
        let snapshot = WeekSnapshot::try_from(RawWeekSnapshot {
            week: 2,
            captured_on: "2026-01-12".to_string(),
            records: vec![raw("CSCI3100", "Tue", "14:00 - 16:00")],
            term: None,
        })
        .unwrap();
        assert_eq!(
            snapshot.records[0].date(),
            NaiveDate::from_ymd_opt(2026, 1, 13)
        );

        let mut outside = raw("CSCI3100", "Tue", "14:00 - 16:00");
        outside.date = Some("2026-01-20".to_string());
        let err = WeekSnapshot::try_from(RawWeekSnapshot {
            week: 2,
            captured_on: "2026-01-12".to_string(),
            records: vec![outside],
            term: None,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_extraction_accepts_bare_array() {
        let json = r#"[{"course_code": "CSCI3100", "day": "Mon", "time": "10:30 - 11:15"}]"#;
        let extraction = Extraction::from_json(json).unwrap();
        assert_eq!(extraction.records.len(), 1);
        assert!(extraction.term.is_none());

        let json = r#"{"records": [], "term": {"start": "2026-01-05", "end": "2026-05-04"}}"#;
        let extraction = Extraction::from_json(json).unwrap();
        assert_eq!(
            extraction.term.unwrap().end,
            NaiveDate::from_ymd_opt(2026, 5, 4)
        );
    }

    #[test]
    fn test_subject_hint_completes_bare_catalog_number() {
        let mut bare = ClassMeetingRecord::try_from(raw("5720-", "Fri", "18:30 - 21:15")).unwrap();
        assert_eq!(bare.course_code, "5720");
        apply_subject_hint(&mut bare, " rose ");
        assert_eq!(bare.course_code, "ROSE5720");

        let mut full = ClassMeetingRecord::try_from(raw("CSCI3100", "Mon", "10:30 - 11:15")).unwrap();
        apply_subject_hint(&mut full, "ROSE");
        assert_eq!(full.course_code, "CSCI3100");
    }
}
