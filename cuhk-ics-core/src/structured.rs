//! 结构化 (JSON) 输出，完整保留 [`ReconciledSchedule`]

use crate::{ReconciledSchedule, Result};

pub fn to_json(schedule: &ReconciledSchedule) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(schedule)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn from_json(bytes: &[u8]) -> Result<ReconciledSchedule> {
    Ok(serde_json::from_slice(bytes)?)
}
