use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cuhk_ics_core::{Error as CoreError, prelude::*};
use tokio::io::BufReader;

/// 数据来源
#[derive(Debug, Clone)]
pub enum Mode {
    FetchTeaching,
    TeachingJson(PathBuf),
    FetchSchedule,
    ScheduleJson(PathBuf),
}

/// 导出命令参数
pub struct ExportParams {
    pub mode: Mode,
    pub list_classes: bool,
    pub selected: Option<String>,
    pub selected_file: Option<PathBuf>,
    pub subject_hint: Option<String>,
    pub term: TermOverride,
    pub output: PathBuf,
    pub format: Format,
    pub calendar_name: Option<String>,
    pub reminder_minutes: u32,
    pub max_missing_weeks: usize,
    pub feed: Option<PathBuf>,
    pub feed_options: FeedOptions,
}

/// 错误对应的退出码
pub fn exit_status(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CoreError>())
        .map_or(1, |core| match core {
            CoreError::NoCourseSelected(_) => 2,
            CoreError::Inference(_) => 3,
            CoreError::Serialization(_) => 4,
            CoreError::ExtractionGap { .. } => 5,
            _ => 1,
        })
}

fn load_selection(selected: Option<&str>, selected_file: Option<&Path>) -> Result<CourseSelection> {
    let mut selection = CourseSelection::all();
    if let Some(list) = selected {
        selection.extend_from_list(list);
    }
    if let Some(path) = selected_file {
        selection.extend_from_file(path)?;
    }
    Ok(selection)
}

async fn open_source(params: &ExportParams) -> Result<Box<dyn TimetableSource>> {
    let feed_mode = match params.mode {
        Mode::TeachingJson(ref path) => return Ok(Box::new(ExtractionFile::new(path))),
        Mode::ScheduleJson(ref path) => return Ok(Box::new(SnapshotFile::new(path))),
        Mode::FetchTeaching => FeedMode::Teaching,
        Mode::FetchSchedule => FeedMode::Schedule,
    };

    Ok(match params.feed {
        Some(ref path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("无法打开数据流文件 {}", path.display()))?;
            Box::new(FeedSource::new(
                BufReader::new(file),
                feed_mode,
                params.feed_options,
            ))
        }
        None => Box::new(FeedSource::new(
            BufReader::new(tokio::io::stdin()),
            feed_mode,
            params.feed_options,
        )),
    })
}

/// 去重后的 (Class Code, Class Nbr, Title)，保持出现顺序
fn class_rows<'a>(records: impl Iterator<Item = &'a ClassMeetingRecord>) -> Vec<(String, String, String)> {
    let mut rows: Vec<(String, String, String)> = Vec::new();
    for record in records {
        let code = record.class_code();
        let nbr = record.class_nbr.clone().unwrap_or_default();
        if rows.iter().any(|(c, n, _)| *c == code && *n == nbr) {
            continue;
        }
        let title: String = record.title.as_deref().unwrap_or("").chars().take(40).collect();
        rows.push((code, nbr, title));
    }
    rows
}

fn print_classes(payload: &Payload) {
    let rows = match payload {
        Payload::Records { records, .. } => class_rows(records.iter()),
        Payload::Weekly { snapshots, .. } => {
            class_rows(snapshots.iter().flat_map(|s| s.records.iter()))
        }
    };
    println!("{:<16} | {:<9} | Course Title", "Class Code", "Class Nbr");
    println!("{}", "-".repeat(60));
    for (code, nbr, title) in rows {
        println!("{:<16} | {:<9} | {}", code, nbr, title);
    }
    println!("\n用法: --selected ROSE5720,9578  (或把课程标识写入文件后使用 --selected-file)");
}

/// 按课程筛选；逐周快照中只要有一周匹配即可
fn select(payload: Payload, selection: &CourseSelection) -> Result<Payload, CoreError> {
    Ok(match payload {
        Payload::Records { records, term } => Payload::Records {
            records: selection.apply(records)?,
            term,
        },
        Payload::Weekly { mut snapshots, term } => {
            if !selection.is_all() {
                for snapshot in &mut snapshots {
                    snapshot.records.retain(|r| selection.matches(r));
                }
                if snapshots.iter().all(|s| s.records.is_empty()) {
                    return Err(CoreError::NoCourseSelected(
                        selection.identifiers().join(", "),
                    ));
                }
            }
            Payload::Weekly { snapshots, term }
        }
    })
}

/// 导出课程表命令
pub async fn export_command(params: ExportParams) -> Result<()> {
    let selection = load_selection(params.selected.as_deref(), params.selected_file.as_deref())?;

    let mut source = open_source(&params).await?;
    tracing::info!("数据来源: {} ({})", source.name(), source.description());
    println!("读取课表数据...");
    let acquisition = source.acquire().await.context("获取课表数据失败")?;
    if let Some(ref err) = acquisition.interrupted {
        println!("⚠ {}，使用已收到的部分数据继续", err);
    }
    let mut payload = acquisition.payload;
    if let Some(ref subject) = params.subject_hint {
        payload.apply_subject_hint(subject);
    }
    println!("✓ 读取到 {} 条上课记录", payload.record_count());

    if params.list_classes {
        print_classes(&payload);
        return Ok(());
    }

    // 学期区间用筛选前的全部日期推断
    let term = TermResolver::new(params.term)
        .with_hint(payload.term_hint())
        .resolve(payload.concrete_dates())?;
    println!("✓ 学期区间: {} → {}", term.start, term.end);

    let draft = match select(payload, &selection)? {
        Payload::Records { records, .. } => PatternBuilder::new(term).build(&records)?,
        Payload::Weekly { snapshots, .. } => SnapshotReconciler::new(term).reconcile(snapshots)?,
    };
    let schedule = normalize(draft)?;
    println!(
        "✓ 生成 {} 个日历事件，共 {} 次上课",
        schedule.events.len(),
        schedule.occurrence_count()
    );

    let options = IcsOptions {
        calendar_name: params.calendar_name.or_else(|| Some("CUHK Timetable".to_string())),
        reminder_minutes: (params.reminder_minutes > 0).then_some(params.reminder_minutes),
        ..IcsOptions::default()
    };
    let path = export(&schedule, params.format, &options, &params.output)
        .context("写入输出文件失败")?;
    println!("✓ {}文件已保存到: {}", params.format.extension().to_uppercase(), path.display());

    if !schedule.is_complete() {
        let gap = CoreError::ExtractionGap {
            missing: schedule.missing_weeks.clone(),
        };
        if schedule.missing_weeks.len() > params.max_missing_weeks {
            return Err(anyhow::Error::new(gap).context(format!(
                "缺失周数超过上限 {}，文件已写出但可能不完整",
                params.max_missing_weeks
            )));
        }
        println!("⚠ {}", gap);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use chrono::NaiveDate;

    use super::*;

    fn params(mode: Mode, output: PathBuf) -> ExportParams {
        ExportParams {
            mode,
            list_classes: false,
            selected: None,
            selected_file: None,
            subject_hint: None,
            term: TermOverride::default(),
            output,
            format: Format::Ics,
            calendar_name: None,
            reminder_minutes: 15,
            max_missing_weeks: 0,
            feed: None,
            feed_options: FeedOptions {
                ready_timeout: Duration::from_millis(200),
                frame_timeout: Duration::from_millis(200),
            },
        }
    }

    const TEACHING: &str = r#"{
        "records": [
            {"course_code": "ROSE5720", "class_nbr": "7011", "title": "Robotics", "day": "Fri",
             "time": "06:30PM - 09:15PM", "location": "SHB 924",
             "first_date": "2026-01-09", "last_date": "2026-04-17"},
            {"course_code": "CSCI3100-A", "class_nbr": "9578", "title": "Software Engineering", "day": "Tue",
             "time": "14:00 - 16:00", "location": "LSB LT1",
             "first_date": "2026-01-06", "last_date": "2026-04-14"}
        ]
    }"#;

    fn week_frame(week: u32, monday: &str) -> String {
        format!(
            r#"{{"type":"week","week":{},"captured_on":"{}","records":[{{"course_code":"CSCI3100","day":"Tue","time":"14:00 - 16:00","location":"LSB LT1"}}]}}"#,
            week, monday
        ) + "\n"
    }

    #[test]
    fn test_exit_status() {
        let gap = anyhow::Error::new(CoreError::ExtractionGap { missing: vec![3] }).context("wrapped");
        assert_eq!(exit_status(&gap), 5);
        assert_eq!(exit_status(&anyhow::Error::new(CoreError::NoCourseSelected("X".into()))), 2);
        assert_eq!(exit_status(&anyhow::Error::new(CoreError::Inference("none".into()))), 3);
        assert_eq!(exit_status(&anyhow::Error::new(CoreError::Serialization("disk".into()))), 4);
        assert_eq!(exit_status(&anyhow::Error::new(CoreError::Validation("bad".into()))), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_class_rows_dedup() {
        let records: Vec<ClassMeetingRecord> = Extraction::from_json(TEACHING)
            .unwrap()
            .validate()
            .unwrap()
            .0;
        let doubled: Vec<_> = records.iter().chain(records.iter()).collect();
        let rows = class_rows(doubled.into_iter());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], ("CSCI3100-A".to_string(), "9578".to_string(), "Software Engineering".to_string()));
    }

    #[tokio::test]
    async fn test_teaching_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("teaching.json");
        fs::write(&input, TEACHING).unwrap();

        let mut p = params(Mode::TeachingJson(input), dir.path().join("out"));
        p.selected = Some("9578".to_string());
        export_command(p).await.unwrap();

        let ics = fs::read_to_string(dir.path().join("out.ics")).unwrap();
        assert!(ics.contains("SUMMARY:CSCI3100-A"));
        assert!(!ics.contains("ROSE5720"));
        // 学期从两门课的日期推断：2026-01-06 → 2026-04-17
        assert!(ics.contains("UNTIL=20260417T155959Z"));
    }

    #[tokio::test]
    async fn test_unmatched_selection_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("teaching.json");
        fs::write(&input, TEACHING).unwrap();

        let mut p = params(Mode::TeachingJson(input), dir.path().join("out"));
        p.selected = Some("MATH1010".to_string());
        let err = export_command(p).await.unwrap_err();
        assert_eq!(exit_status(&err), 2);
        assert!(!dir.path().join("out.ics").exists());
    }

    #[tokio::test]
    async fn test_gap_beyond_threshold_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.ndjson");
        let content = format!(
            "{{\"type\":\"ready\"}}\n{}{}{}{{\"type\":\"done\"}}\n",
            week_frame(1, "2026-01-05"),
            week_frame(2, "2026-01-12"),
            week_frame(4, "2026-01-26")
        );
        fs::write(&feed, content).unwrap();

        let mut p = params(Mode::FetchSchedule, dir.path().join("out.json"));
        p.feed = Some(feed);
        p.format = Format::Json;
        p.term = TermOverride::new(NaiveDate::from_ymd_opt(2026, 1, 5), NaiveDate::from_ymd_opt(2026, 2, 1));

        let err = export_command(p).await.unwrap_err();
        assert_eq!(exit_status(&err), 5);

        let schedule = cuhk_ics_core::structured::from_json(&fs::read(dir.path().join("out.json")).unwrap()).unwrap();
        assert_eq!(schedule.missing_weeks, vec![3]);
        assert_eq!(schedule.occurrence_count(), 4);
    }

    #[tokio::test]
    async fn test_selection_file_without_codes_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("teaching.json");
        fs::write(&input, TEACHING).unwrap();
        let selected = dir.path().join("selected.txt");
        fs::write(&selected, "# 本学期\n\n   \n").unwrap();

        let mut p = params(Mode::TeachingJson(input), dir.path().join("out"));
        p.selected_file = Some(selected);
        let err = export_command(p).await.unwrap_err();
        assert_eq!(exit_status(&err), 2);
        assert!(!dir.path().join("out.ics").exists());
    }

    #[tokio::test]
    async fn test_subject_hint_completes_codes_before_selection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("teaching.json");
        fs::write(
            &input,
            r#"[{"course_code": "3100", "day": "Tue", "time": "14:00 - 16:00",
                 "first_date": "2026-01-06", "last_date": "2026-04-14"}]"#,
        )
        .unwrap();

        let mut p = params(Mode::TeachingJson(input), dir.path().join("out"));
        p.selected = Some("CSCI3100".to_string());
        p.subject_hint = Some("csci".to_string());
        export_command(p).await.unwrap();

        let ics = fs::read_to_string(dir.path().join("out.ics")).unwrap();
        assert!(ics.contains("SUMMARY:CSCI3100"));
    }

    #[tokio::test]
    async fn test_schedule_feed_infers_term_and_reports_edge_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("feed.ndjson");
        let first_monday = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let mut content = String::from("{\"type\":\"ready\"}\n");
        // 第 1 周和第 16 周都没有抓到；学期结束日来自页面
        content.push_str(
            r#"{"type":"week","week":2,"captured_on":"2026-01-14","records":[{"course_code":"CSCI3100","day":"Tue","time":"14:00 - 16:00","location":"LSB LT1"}],"term":{"start":null,"end":"2026-04-24"}}"#,
        );
        content.push('\n');
        for week in 3..=15 {
            let monday = first_monday + chrono::Duration::weeks(i64::from(week) - 1);
            content.push_str(&week_frame(week, &monday.to_string()));
        }
        content.push_str("{\"type\":\"done\"}\n");
        fs::write(&feed, content).unwrap();

        let mut p = params(Mode::FetchSchedule, dir.path().join("out.json"));
        p.feed = Some(feed);
        p.format = Format::Json;

        let err = export_command(p).await.unwrap_err();
        assert_eq!(exit_status(&err), 5);

        let schedule = cuhk_ics_core::structured::from_json(&fs::read(dir.path().join("out.json")).unwrap()).unwrap();
        assert_eq!(schedule.term.start, first_monday);
        assert_eq!(schedule.term.end, NaiveDate::from_ymd_opt(2026, 4, 24).unwrap());
        assert_eq!(schedule.missing_weeks, vec![1, 16]);
        // 缺失的周不算停课
        assert_eq!(schedule.occurrence_count(), 16);
    }

    #[tokio::test]
    async fn test_missing_term_dates_exits_3() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("teaching.json");
        fs::write(
            &input,
            r#"[{"course_code": "ROSE5720", "day": "Fri", "time": "18:30 - 21:15"}]"#,
        )
        .unwrap();

        let err = export_command(params(Mode::TeachingJson(input), dir.path().join("out")))
            .await
            .unwrap_err();
        assert_eq!(exit_status(&err), 3);
    }
}
