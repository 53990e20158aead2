use std::{fs, path::Path};

use crate::{ClassMeetingRecord, Error, Result};

/// 要导出的课程列表（`--selected` / `--selected-file`）
///
/// 标识可以是课程代码（`ROSE5720`、`ROSE5720-`）或 Class Nbr（`9578`）。
/// 空列表表示全部导出。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseSelection {
    identifiers: Vec<String>,
}

impl CourseSelection {
    pub fn all() -> Self {
        Self::default()
    }

    /// 逗号分隔的列表
    pub fn from_list(list: &str) -> Self {
        let mut selection = Self::default();
        selection.extend_from_list(list);
        selection
    }

    pub fn extend_from_list(&mut self, list: &str) {
        self.push_all(list.split(','));
    }

    /// 每行一个标识，忽略空行和 `#` 开头的注释
    pub fn extend_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            Error::Validation(format!(
                "cannot read selection file {}: {}",
                path.display(),
                err
            ))
        })?;
        let found = self.push_all(
            content
                .lines()
                .filter(|line| !line.trim_start().starts_with('#')),
        );
        if found == 0 {
            return Err(Error::NoCourseSelected(format!(
                "no course codes found in {} (one per line, e.g. ROSE5720; # starts a comment)",
                path.display()
            )));
        }
        Ok(())
    }

    /// 去掉空白并转成大写；`ROSE5720-` 这种无班别写法去掉末尾的 `-`
    fn push_all<'a>(&mut self, items: impl Iterator<Item = &'a str>) -> usize {
        let mut found = 0;
        for item in items {
            let id: String = item
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase()
                .trim_end_matches('-')
                .to_string();
            if id.is_empty() {
                continue;
            }
            found += 1;
            if !self.identifiers.contains(&id) {
                self.identifiers.push(id);
            }
        }
        found
    }

    pub fn is_all(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn matches(&self, record: &ClassMeetingRecord) -> bool {
        if self.is_all() {
            return true;
        }
        let class_code = record.class_code();
        self.identifiers.iter().any(|id| {
            record.class_nbr.as_deref() == Some(id.as_str())
                || class_code == *id
                || class_code.starts_with(id.as_str())
                || class_code.contains(id.as_str())
        })
    }

    /// 过滤记录；有选择条件却一条都没匹配上时报错
    pub fn apply(&self, records: Vec<ClassMeetingRecord>) -> Result<Vec<ClassMeetingRecord>> {
        if self.is_all() {
            return Ok(records);
        }
        let total = records.len();
        let selected: Vec<_> = records.into_iter().filter(|r| self.matches(r)).collect();
        tracing::info!("课程筛选: {} / {} 条记录", selected.len(), total);
        if selected.is_empty() {
            return Err(Error::NoCourseSelected(self.identifiers.join(", ")));
        }
        Ok(selected)
    }
}
