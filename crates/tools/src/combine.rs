//! シャード結合
//!
//! ディレクトリ内の `*.plain` をパス順・行順に読み、序盤局面（`ply <= cutoff`）を
//! 除外してコーパスファイルに書き出す。残した局面の結果ごとの件数を数える。

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use wdl_core::{Outcome, PositionRecord, WdlError};

use crate::common::{OutputFile, ShardError, find_shards, open_reader, progress};

/// これ以下の手数の局面は除外する
pub const DEFAULT_EARLY_PLY_CUTOFF: u32 = 10;

#[derive(Debug, Clone)]
pub struct CombineOptions {
    pub extension: String,
    pub early_ply_cutoff: u32,
    pub show_progress: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            extension: crate::common::DEFAULT_SHARD_EXTENSION.to_string(),
            early_ply_cutoff: DEFAULT_EARLY_PLY_CUTOFF,
            show_progress: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CombineError {
    #[error(transparent)]
    Shards(#[from] ShardError),

    #[error("{}:{line}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: WdlError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CombineError {
    /// 入力が無いだけの状態（呼び出し側は報告して戻ればよい）
    pub fn is_missing_input(&self) -> bool {
        matches!(
            self,
            CombineError::Shards(ShardError::DirectoryNotFound(_) | ShardError::NoShards { .. })
        )
    }
}

/// 結果（-1 / 0 / +1）ごとの件数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassDistribution {
    pub losses: u64,
    pub draws: u64,
    pub wins: u64,
}

impl ClassDistribution {
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Win => self.wins += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.losses + self.draws + self.wins
    }

    /// `outcome + 1` の順（負け・引き分け・勝ち）の百分率。0 件なら全て 0。
    pub fn percentages(&self) -> [f64; 3] {
        let total = self.total();
        if total == 0 {
            return [0.0; 3];
        }
        let pct = |n: u64| n as f64 / total as f64 * 100.0;
        [pct(self.losses), pct(self.draws), pct(self.wins)]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CombineSummary {
    pub output: PathBuf,
    pub shards: usize,
    pub retained: u64,
    pub filtered_early: u64,
    pub classes: ClassDistribution,
}

impl CombineSummary {
    pub fn print_report(&self) {
        let [loss, draw, win] = self.classes.percentages();
        println!("Losses {loss:.2}% - Draws {draw:.2}% - Wins {win:.2}%");
        println!("Filtered early positions: {}", self.filtered_early);
        println!(
            "Data from {} files has been successfully combined into {} ({} positions)",
            self.shards,
            self.output.display(),
            self.retained
        );
    }
}

/// シャードを結合してコーパスを書き出す。
///
/// 入力が見つからない場合は何も書かずに [`CombineError::Shards`] を返す。
/// 不正なレコードがあればそこで中断し、出力先には何も残さない。
pub fn combine_shards(
    dir: &Path,
    output: &Path,
    opts: &CombineOptions,
) -> Result<CombineSummary, CombineError> {
    let shards = find_shards(dir, &opts.extension)?;
    let mut out = OutputFile::create(output)?;

    let mut classes = ClassDistribution::default();
    let mut filtered_early = 0u64;
    let pb = progress::spinner(opts.show_progress);

    for shard in &shards {
        log::info!("Reading {}...", shard.display());
        pb.set_message(shard.display().to_string());
        let reader = open_reader(shard)?;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let record = PositionRecord::parse(&line).map_err(|source| CombineError::Malformed {
                path: shard.clone(),
                line: idx + 1,
                source,
            })?;
            pb.inc(1);

            if record.ply <= opts.early_ply_cutoff {
                filtered_early += 1;
                continue;
            }
            classes.add(record.outcome);
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
    }

    out.commit()?;
    pb.finish_and_clear();

    Ok(CombineSummary {
        output: output.to_path_buf(),
        shards: shards.len(),
        retained: classes.total(),
        filtered_early,
        classes,
    })
}
