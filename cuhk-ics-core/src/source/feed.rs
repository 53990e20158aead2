//! 实时数据流：外部提取器按行推送 JSON 帧。
//!
//! ```text
//! {"type":"ready"}
//! {"type":"week","week":1,"captured_on":"2026-01-05","records":[...]}
//! {"type":"week","week":2,"captured_on":"2026-01-12","records":[...]}
//! {"type":"done"}
//! ```
//!
//! `ready` 表示用户已经在浏览器里完成登录和验证码，在此之前一直阻塞等待。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::{Acquisition, Payload, TimetableSource};
use crate::{
    Error, Result, WeekSnapshot,
    record::{Extraction, RawWeekSnapshot},
    term::TermHint,
};

/// 数据流中的一帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Frame {
    Ready,
    Extraction(Extraction),
    Week(RawWeekSnapshot),
    Done,
}

/// 期望收到的数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// `--fetch-teaching`：一次性抓取
    Teaching,
    /// `--fetch-schedule`：逐周抓取
    Schedule,
}

/// 等待超时设置
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    /// 等待 `ready` 的最长时间
    pub ready_timeout: Duration,
    /// 之后每一帧的最长等待时间
    pub frame_timeout: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(600),
            frame_timeout: Duration::from_secs(120),
        }
    }
}

/// 从按行分隔的 JSON 流读取数据
pub struct FeedSource<R> {
    reader: R,
    mode: FeedMode,
    options: FeedOptions,
}

impl<R> FeedSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, mode: FeedMode, options: FeedOptions) -> Self {
        Self {
            reader,
            mode,
            options,
        }
    }

    /// 读下一帧；流结束返回 None，空行跳过
    async fn next_frame(&mut self, limit: Duration, waiting_for: &str) -> Result<Option<Frame>> {
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(limit, self.reader.read_line(&mut line))
                .await
                .map_err(|_| {
                    Error::InteractionTimeout(format!("{} after {}s", waiting_for, limit.as_secs_f32()))
                })??;
            if read == 0 {
                return Ok(None);
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(line)?));
        }
    }

    async fn wait_ready(&mut self) -> Result<()> {
        tracing::info!("等待提取器就绪（请在浏览器中完成登录和验证码）...");
        match self
            .next_frame(self.options.ready_timeout, "the ready signal")
            .await?
        {
            Some(Frame::Ready) => {
                tracing::info!("提取器已就绪");
                Ok(())
            }
            Some(_) => Err(Error::Validation(
                "feed sent data before the ready signal".to_string(),
            )),
            None => Err(Error::Validation(
                "feed closed before the ready signal".to_string(),
            )),
        }
    }

    fn wrong_frame(&self, frame: &str) -> Error {
        Error::Validation(format!(
            "unexpected '{}' frame in {:?} mode",
            frame, self.mode
        ))
    }
}

#[async_trait]
impl<R> TimetableSource for FeedSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &str {
        match self.mode {
            FeedMode::Teaching => "fetch-teaching",
            FeedMode::Schedule => "fetch-schedule",
        }
    }

    fn description(&self) -> &str {
        "Live extractor feed"
    }

    async fn acquire(&mut self) -> Result<Acquisition> {
        self.wait_ready().await?;

        let mut records = Vec::new();
        let mut snapshots: Vec<WeekSnapshot> = Vec::new();
        let mut term = TermHint::default();
        let mut received = false;
        let mut interrupted = None;

        loop {
            let frame = match self
                .next_frame(self.options.frame_timeout, "the next feed frame")
                .await
            {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err @ Error::InteractionTimeout(_)) => {
                    tracing::warn!("{}，使用已收到的数据继续", err);
                    interrupted = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            };

            match frame {
                Frame::Ready => tracing::debug!("忽略重复的 ready"),
                Frame::Done => break,
                Frame::Extraction(extraction) => {
                    if self.mode != FeedMode::Teaching {
                        return Err(self.wrong_frame("extraction"));
                    }
                    let (mut batch, hint) = extraction.validate()?;
                    tracing::debug!("收到 {} 条记录", batch.len());
                    records.append(&mut batch);
                    term.start = term.start.or(hint.start);
                    term.end = term.end.or(hint.end);
                    received = true;
                }
                Frame::Week(raw) => {
                    if self.mode != FeedMode::Schedule {
                        return Err(self.wrong_frame("week"));
                    }
                    if let Some(hint) = raw.term {
                        term.start = term.start.or(hint.start);
                        term.end = term.end.or(hint.end);
                    }
                    let snapshot = WeekSnapshot::try_from(raw)?;
                    tracing::debug!(
                        "收到第 {} 周快照，{} 条记录",
                        snapshot.week,
                        snapshot.records.len()
                    );
                    snapshots.push(snapshot);
                    received = true;
                }
            }
        }

        if !received {
            return Err(interrupted.unwrap_or_else(|| {
                Error::Validation("feed ended without any timetable data".to_string())
            }));
        }

        let payload = match self.mode {
            FeedMode::Teaching => Payload::Records { records, term },
            FeedMode::Schedule => Payload::Weekly { snapshots, term },
        };
        Ok(Acquisition {
            payload,
            interrupted,
        })
    }
}
