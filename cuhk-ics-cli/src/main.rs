mod commands;

use std::{path::PathBuf, process::ExitCode, time::Duration};

use chrono::NaiveDate;
use clap::{ArgGroup, Parser};
use cuhk_ics_core::prelude::{FeedOptions, Format, TermOverride};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{ExportParams, Mode};

#[derive(Parser)]
#[command(name = "cuhk-ics")]
#[command(about = "CUHK课程表导出工具 (ICS / CSV / JSON)")]
#[command(version)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["fetch_teaching", "teaching_json", "fetch_schedule", "schedule_json"])
))]
struct Cli {
    /// 实时抓取 Teaching Timetable（从提取器数据流读取）
    #[arg(long)]
    fetch_teaching: bool,

    /// 使用保存的 Teaching Timetable 提取结果
    #[arg(long, value_name = "PATH")]
    teaching_json: Option<PathBuf>,

    /// 实时逐周抓取个人课表（从提取器数据流读取）
    #[arg(long)]
    fetch_schedule: bool,

    /// 使用保存的单周课表快照
    #[arg(long, value_name = "PATH")]
    schedule_json: Option<PathBuf>,

    /// 列出所有课程 (Class Code, Class Nbr, Title) 后退出
    #[arg(long)]
    list_classes: bool,

    /// 要导出的课程，逗号分隔（如 ROSE5720,9578）
    #[arg(long, value_name = "LIST")]
    selected: Option<String>,

    /// 每行一个课程标识的文件，# 开头为注释
    #[arg(long, value_name = "PATH")]
    selected_file: Option<PathBuf>,

    /// 课程代码只有数字时补上的学科代码（如 CSCI）
    #[arg(long, value_name = "SUBJECT")]
    subject_hint: Option<String>,

    /// 学期第一天（格式：YYYY-MM-DD）
    #[arg(long, value_name = "YYYY-MM-DD")]
    term_start: Option<NaiveDate>,

    /// 学期最后一天（格式：YYYY-MM-DD）
    #[arg(long, value_name = "YYYY-MM-DD")]
    term_end: Option<NaiveDate>,

    /// 输出文件路径，扩展名按格式自动添加或替换
    #[arg(short, long, default_value = "cuhk_timetable")]
    output: PathBuf,

    /// 输出格式 (ics | csv | json)
    #[arg(short, long, default_value = "ics")]
    format: Format,

    /// 日历名称
    #[arg(long)]
    calendar_name: Option<String>,

    /// 提醒时间（分钟），0 表示不提醒
    #[arg(long, default_value = "15")]
    reminder_minutes: u32,

    /// 允许缺失的周数，超过时退出码为 5（文件仍会写出）
    #[arg(long, default_value = "0")]
    max_missing_weeks: usize,

    /// 提取器数据流文件，默认读取标准输入
    #[arg(long, value_name = "PATH")]
    feed: Option<PathBuf>,

    /// 等待提取器就绪的秒数
    #[arg(long, default_value = "600")]
    ready_timeout: u64,

    /// 等待每一帧数据的秒数
    #[arg(long, default_value = "120")]
    frame_timeout: u64,

    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn mode(&self) -> Mode {
        if let Some(ref path) = self.teaching_json {
            Mode::TeachingJson(path.clone())
        } else if let Some(ref path) = self.schedule_json {
            Mode::ScheduleJson(path.clone())
        } else if self.fetch_schedule {
            Mode::FetchSchedule
        } else {
            Mode::FetchTeaching
        }
    }

    fn into_params(self) -> ExportParams {
        ExportParams {
            mode: self.mode(),
            list_classes: self.list_classes,
            selected: self.selected,
            selected_file: self.selected_file,
            subject_hint: self.subject_hint,
            term: TermOverride::new(self.term_start, self.term_end),
            output: self.output,
            format: self.format,
            calendar_name: self.calendar_name,
            reminder_minutes: self.reminder_minutes,
            max_missing_weeks: self.max_missing_weeks,
            feed: self.feed,
            feed_options: FeedOptions {
                ready_timeout: Duration::from_secs(self.ready_timeout),
                frame_timeout: Duration::from_secs(self.frame_timeout),
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("cuhk_ics_cli={0},cuhk_ics_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match commands::export_command(cli.into_params()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("错误: {:#}", err);
            ExitCode::from(commands::exit_status(&err))
        }
    }
}
