//! 進捗ログの監視
//!
//! 毎回ファイルを先頭から読み直し、転送済みの最大イテレーション（ハイウォーターマーク）
//! を超える行だけを転送する。ログが途中で短くなっても既に見た番号は再送しない。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::progress_log::{LogLine, parse_line};
use super::sink::TrackingSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// まだ学習中。今回転送した件数。
    Running { forwarded: usize },
    /// 終了トークンを検出した
    Finished { forwarded: usize },
}

pub struct LogTailer {
    path: PathBuf,
    last_iteration: u64,
}

impl LogTailer {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            last_iteration: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 転送済みの最大イテレーション
    pub fn last_iteration(&self) -> u64 {
        self.last_iteration
    }

    /// ログを読み直して新しいイテレーションを転送する。
    ///
    /// 読み込み・解析・転送のどこかで失敗したらそこで止めてエラーを返す。
    /// それまでに転送した分は確定している。
    pub fn scan<S: TrackingSink + ?Sized>(&mut self, sink: &mut S) -> Result<ScanOutcome> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        self.scan_text(&text, sink)
    }

    pub fn scan_text<S: TrackingSink + ?Sized>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Result<ScanOutcome> {
        let mut forwarded = 0;
        let mut lines = text.split_inclusive('\n').enumerate().peekable();
        while let Some((idx, raw)) = lines.next() {
            let complete = raw.ends_with('\n');
            let parsed = parse_line(raw);
            // 書き込み途中の末尾行は次の周期で読み直す
            if !complete && lines.peek().is_none() && parsed != Ok(LogLine::End) {
                log::trace!("skipping partial line {}: {raw:?}", idx + 1);
                break;
            }
            let parsed =
                parsed.with_context(|| format!("{}:{}", self.path.display(), idx + 1))?;
            match parsed {
                LogLine::Blank => {}
                LogLine::End => return Ok(ScanOutcome::Finished { forwarded }),
                LogLine::Metrics(m) => {
                    if m.iteration > self.last_iteration {
                        sink.log(m.iteration, &m.metrics())?;
                        self.last_iteration = m.iteration;
                        forwarded += 1;
                    }
                }
            }
        }
        Ok(ScanOutcome::Running { forwarded })
    }
}
