use std::path::PathBuf;

use async_trait::async_trait;

use super::{Acquisition, Payload, TimetableSource};
use crate::{
    Error, Result, WeekSnapshot,
    record::{Extraction, RawWeekSnapshot},
};

async fn read_document(path: &PathBuf) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::Validation(format!("cannot read {}: {}", path.display(), err)))
}

/// 保存下来的一次性抓取结果（`--teaching-json`）
pub struct ExtractionFile {
    path: PathBuf,
}

impl ExtractionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TimetableSource for ExtractionFile {
    fn name(&self) -> &str {
        "teaching-json"
    }

    fn description(&self) -> &str {
        "Saved Teaching Timetable extraction"
    }

    async fn acquire(&mut self) -> Result<Acquisition> {
        let json = read_document(&self.path).await?;
        let (records, term) = Extraction::from_json(&json)?.validate()?;
        tracing::info!("从 {} 读取 {} 条记录", self.path.display(), records.len());
        Ok(Acquisition::complete(Payload::Records { records, term }))
    }
}

/// 保存下来的单周快照（`--schedule-json`）
///
/// 只有一周的数据无法对账，按整学期的固定课表处理。
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TimetableSource for SnapshotFile {
    fn name(&self) -> &str {
        "schedule-json"
    }

    fn description(&self) -> &str {
        "Saved single-week schedule snapshot"
    }

    async fn acquire(&mut self) -> Result<Acquisition> {
        let json = read_document(&self.path).await?;
        let raw: RawWeekSnapshot = serde_json::from_str(&json)?;
        let term = raw.term.unwrap_or_default();
        let snapshot = WeekSnapshot::try_from(raw)?;
        tracing::info!(
            "从 {} 读取第 {} 周快照，{} 条记录",
            self.path.display(),
            snapshot.week,
            snapshot.records.len()
        );
        Ok(Acquisition::complete(Payload::Records {
            records: snapshot.records,
            term,
        }))
    }
}
