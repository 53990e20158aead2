//! 输出格式选择与原子写入

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use tempfile::NamedTempFile;

use crate::{Error, IcsOptions, ReconciledSchedule, Result, ics::IcsGenerator, structured, tabular};

/// 输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// 日历文件
    #[default]
    Ics,
    /// 表格
    Csv,
    /// 结构化数据
    Json,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Ics => "ics",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// 把格式对应的扩展名加到输出路径上；已有扩展名时替换掉
    pub fn output_path(self, base: impl AsRef<Path>) -> PathBuf {
        base.as_ref().with_extension(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ics" | "calendar-file" => Ok(Self::Ics),
            "csv" | "tabular" => Ok(Self::Csv),
            "json" | "structured" => Ok(Self::Json),
            other => Err(Error::Validation(format!(
                "unknown output format '{}' (expected ics, csv or json)",
                other
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// 把课表编码成指定格式
pub fn render(schedule: &ReconciledSchedule, format: Format, options: &IcsOptions) -> Result<Vec<u8>> {
    match format {
        Format::Ics => Ok(IcsGenerator::new(options.clone())
            .generate(schedule)?
            .into_bytes()),
        Format::Csv => tabular::to_csv(schedule),
        Format::Json => structured::to_json(schedule),
    }
}

/// 先写到同目录下的临时文件再重命名，失败时不会留下写了一半的文件
pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let write_err = |err: std::io::Error| {
        Error::Serialization(format!("cannot write {}: {}", path.display(), err))
    };

    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|err| write_err(err.error))?;

    tracing::debug!("已写入 {} ({} 字节)", path.display(), bytes.len());
    Ok(())
}

/// 编码并写入，返回实际写入的路径
pub fn export(
    schedule: &ReconciledSchedule,
    format: Format,
    options: &IcsOptions,
    base: impl AsRef<Path>,
) -> Result<PathBuf> {
    let bytes = render(schedule, format, options)?;
    let path = format.output_path(base);
    write_atomic(&path, &bytes)?;
    tracing::info!(
        "导出 {} 个事件 ({} 次上课) 到 {}",
        schedule.events.len(),
        schedule.occurrence_count(),
        path.display()
    );
    Ok(path)
}
