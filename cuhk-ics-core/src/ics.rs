use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::{CalendarEvent, Error, IcsOptions, Recurrence, ReconciledSchedule, Result};


/// 单行最多 75 个字节，超出部分折行
const MAX_LINE_OCTETS: usize = 75;

/// ICS日历生成器
pub struct IcsGenerator {
    options: IcsOptions,
}

impl IcsGenerator {
    pub fn new(options: IcsOptions) -> Self {
        Self { options }
    }

    /// 生成ICS日历内容
    pub fn generate(&self, schedule: &ReconciledSchedule) -> Result<String> {
        let mut ics_content = String::new();

        // ICS文件头部
        push_line(&mut ics_content, "BEGIN:VCALENDAR");
        push_line(&mut ics_content, "VERSION:2.0");
        push_line(&mut ics_content, "PRODID:-//CUHK Timetable Export//EN");
        push_line(&mut ics_content, "CALSCALE:GREGORIAN");
        push_line(&mut ics_content, "METHOD:PUBLISH");

        if let Some(ref name) = self.options.calendar_name {
            push_line(
                &mut ics_content,
                &format!("X-WR-CALNAME:{}", escape_text(name)),
            );
        }
        push_line(
            &mut ics_content,
            &format!("X-WR-TIMEZONE:{}", self.options.timezone),
        );
        self.add_timezone(&mut ics_content);

        let dtstamp = self
            .options
            .stamp
            .unwrap_or_else(Utc::now)
            .format("%Y%m%dT%H%M%SZ")
            .to_string();

        for event in &schedule.events {
            self.add_event(&mut ics_content, event, &dtstamp)?;
        }

        // ICS文件尾部
        push_line(&mut ics_content, "END:VCALENDAR");

        Ok(ics_content)
    }

    /// 固定偏移的时区定义，没有夏令时
    fn add_timezone(&self, ics_content: &mut String) {
        let offset = format_offset(self.options.utc_offset.local_minus_utc());
        push_line(ics_content, "BEGIN:VTIMEZONE");
        push_line(ics_content, &format!("TZID:{}", self.options.timezone));
        push_line(ics_content, "BEGIN:STANDARD");
        push_line(ics_content, "DTSTART:19700101T000000");
        push_line(ics_content, &format!("TZOFFSETFROM:{}", offset));
        push_line(ics_content, &format!("TZOFFSETTO:{}", offset));
        push_line(ics_content, "END:STANDARD");
        push_line(ics_content, "END:VTIMEZONE");
    }

    /// 添加单个课程事件
    fn add_event(&self, ics_content: &mut String, event: &CalendarEvent, dtstamp: &str) -> Result<()> {
        push_line(ics_content, "BEGIN:VEVENT");
        push_line(ics_content, &format!("UID:{}", event.uid));
        push_line(ics_content, &format!("DTSTAMP:{}", dtstamp));
        push_line(ics_content, &format!("DTSTART;{}", self.local_time(event.start)));
        push_line(ics_content, &format!("DTEND;{}", self.local_time(event.end)));
        push_line(ics_content, &format!("SUMMARY:{}", escape_text(&event.title)));

        if !event.location.is_empty() {
            push_line(
                ics_content,
                &format!("LOCATION:{}", escape_text(&event.location)),
            );
        }

        if self.options.include_description {
            push_line(
                ics_content,
                &format!("DESCRIPTION:{}", escape_text(&event.description)),
            );
        }

        if let Some(ref recurrence) = event.recurrence {
            self.add_recurrence_rule(ics_content, event, recurrence)?;
        }

        // 添加提醒
        if let Some(reminder_minutes) = self.options.reminder_minutes {
            push_line(ics_content, "BEGIN:VALARM");
            push_line(ics_content, "ACTION:DISPLAY");
            push_line(
                ics_content,
                &format!("DESCRIPTION:{}", escape_text(&event.title)),
            );
            push_line(ics_content, &format!("TRIGGER:-PT{}M", reminder_minutes));
            push_line(ics_content, "END:VALARM");
        }

        push_line(ics_content, "END:VEVENT");

        Ok(())
    }

    /// 每周重复直到学期最后一天，停课日期逐条写成 EXDATE
    fn add_recurrence_rule(
        &self,
        ics_content: &mut String,
        event: &CalendarEvent,
        recurrence: &Recurrence,
    ) -> Result<()> {
        push_line(
            ics_content,
            &format!(
                "RRULE:FREQ=WEEKLY;UNTIL={}",
                self.until_utc(recurrence.until)?
            ),
        );

        for exception_date in &recurrence.exclusions {
            push_line(
                ics_content,
                &format!(
                    "EXDATE;{}",
                    self.local_time(exception_date.and_time(event.start.time()))
                ),
            );
        }

        Ok(())
    }

    /// `TZID=Asia/Hong_Kong:20260105T103000`
    fn local_time(&self, time: NaiveDateTime) -> String {
        format!(
            "TZID={}:{}",
            self.options.timezone,
            time.format("%Y%m%dT%H%M%S")
        )
    }

    /// 本地时间当天 23:59:59 换算成 UTC
    fn until_utc(&self, until: NaiveDate) -> Result<String> {
        let local_end = until
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| Error::Serialization(format!("invalid UNTIL date {}", until)))?;
        let utc = self
            .options
            .utc_offset
            .from_local_datetime(&local_end)
            .single()
            .ok_or_else(|| Error::Serialization(format!("ambiguous UNTIL time {}", local_end)))?
            .with_timezone(&Utc);
        Ok(utc.format("%Y%m%dT%H%M%SZ").to_string())
    }
}

impl Default for IcsGenerator {
    fn default() -> Self {
        Self::new(IcsOptions::default())
    }
}

/// 转义ICS文本内容
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\r', "")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// 写入一行内容，超长时按字节折行（不拆开多字节字符）
fn push_line(ics_content: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            ics_content.push_str("\r\n ");
            width = 1;
        }
        ics_content.push(ch);
        width += len;
    }
    ics_content.push_str("\r\n");
}

/// `28800` → `+0800`
fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("{}{:02}{:02}", sign, minutes / 60, minutes % 60)
}
