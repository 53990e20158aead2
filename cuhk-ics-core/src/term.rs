use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, types::monday_of};

/// 学期区间，首尾两天都包含在内
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TermWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::Validation(format!(
                "term start {} is after term end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn from_date_strs(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// 学期开始当天或之后第一个指定星期几
    pub fn first_on_or_after(&self, weekday: Weekday) -> NaiveDate {
        let offset = (7 + weekday.num_days_from_monday()
            - self.start.weekday().num_days_from_monday())
            % 7;
        self.start + Duration::days(i64::from(offset))
    }

    /// 学期内某个星期几的全部日期
    pub fn weekly_dates(&self, weekday: Weekday) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.first_on_or_after(weekday)
            .iter_weeks()
            .take_while(move |date| *date <= end)
    }

    /// 学期跨越的周数（以星期一为一周的开始）
    pub fn week_count(&self) -> u32 {
        let days = (monday_of(self.end) - monday_of(self.start)).num_days();
        u32::try_from(days / 7).unwrap_or(0) + 1
    }

    /// 第 `week` 周的星期一
    pub fn week_start(&self, week: u32) -> NaiveDate {
        monday_of(self.start) + Duration::weeks(i64::from(week) - 1)
    }
}

/// 用户在命令行指定的学期日期，可以只给其中一个
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermOverride {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl TermOverride {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }
}

/// 提取器从页面上读到的学期日期（例如无固定上课时间课程表格中的起止日期）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermHint {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// 学期边界推断器
///
/// 每一端按 命令行指定 > 页面提示 > 记录中出现的最早/最晚日期 的顺序取值。
/// 任何一端都得不到时直接报错，不做猜测。
pub struct TermResolver {
    overrides: TermOverride,
    hint: TermHint,
}

impl TermResolver {
    pub fn new(overrides: TermOverride) -> Self {
        Self {
            overrides,
            hint: TermHint::default(),
        }
    }

    pub fn with_hint(mut self, hint: TermHint) -> Self {
        self.hint = hint;
        self
    }

    pub fn resolve<I>(&self, dates: I) -> Result<TermWindow>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        if let (Some(start), Some(end)) = (self.overrides.start, self.overrides.end) {
            tracing::info!("使用指定的学期区间: {} → {}", start, end);
            return TermWindow::new(start, end);
        }

        let (inferred_start, inferred_end) = dates
            .into_iter()
            .fold((None, None), |(min, max): (Option<NaiveDate>, Option<NaiveDate>), date| {
                (
                    Some(min.map_or(date, |m| m.min(date))),
                    Some(max.map_or(date, |m| m.max(date))),
                )
            });

        let start = self
            .overrides
            .start
            .or(self.hint.start)
            .or(inferred_start)
            .ok_or_else(|| Error::Inference("no meeting date to infer the term start from".to_string()))?;
        let end = self
            .overrides
            .end
            .or(self.hint.end)
            .or(inferred_end)
            .ok_or_else(|| Error::Inference("no meeting date to infer the term end from".to_string()))?;

        tracing::info!("推断学期区间: {} → {}", start, end);
        TermWindow::new(start, end)
    }
}
