//! WDL キャリブレーション
//!
//! `ply;score;outcome` のテーブルから勝率・敗率の 4 次曲線とポーンスケールを求める。

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tools::common::open_reader;
use wdl_core::{CalibrationRow, FitConfig, ScoreBuckets, fit_wdl};

/// 見損じ除外の既定閾値
const DEFAULT_BLUNDER_THRESHOLD: i32 = 200;

#[derive(Parser, Debug)]
#[command(name = "wdl_fit", version, about = "勝率・敗率曲線を当てはめてポーンスケールを求める")]
struct Cli {
    /// 入力テーブル（`-` で標準入力）
    #[arg(default_value = "out.txt")]
    input: PathBuf,

    /// |score| の上限
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(i32).range(0..))]
    score_limit: i32,

    #[arg(long, default_value_t = 10)]
    min_ply: u32,

    #[arg(long, default_value_t = 100)]
    max_ply: u32,

    /// 評価値と結果が大きく食い違う行を除外する
    #[arg(long)]
    strict: bool,

    /// 見損じ判定の閾値（指定すると --strict を含む）
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..))]
    blunder_threshold: Option<i32>,

    /// 結果を JSON で書き出す
    #[arg(long)]
    json: Option<PathBuf>,
}

impl Cli {
    fn fit_config(&self) -> FitConfig {
        let blunder_threshold = self
            .blunder_threshold
            .or(self.strict.then_some(DEFAULT_BLUNDER_THRESHOLD));
        FitConfig {
            min_ply: self.min_ply,
            max_ply: self.max_ply,
            score_limit: self.score_limit,
            blunder_threshold,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.fit_config();

    let reader = open_reader(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    let mut buckets = ScoreBuckets::new(config);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", cli.input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: CalibrationRow = line
            .trim()
            .parse()
            .with_context(|| format!("{}:{}", cli.input.display(), idx + 1))?;
        buckets.add(&row);
    }
    log::info!(
        "{} rows in {} buckets ({} outside the window)",
        buckets.retained(),
        buckets.len(),
        buckets.rejected()
    );

    let fit = fit_wdl(&buckets)?;
    let win = fit.win.descending();
    let loss = fit.loss.descending();
    println!("{win:?}");
    println!("{loss:?}");
    println!("Pawn scale: {}", fit.pawn_scale);

    if let Some(path) = &cli.json {
        let report = serde_json::json!({
            "config": config,
            "buckets": fit.buckets,
            "win": win,
            "loss": loss,
            "pawn_scale": fit.pawn_scale,
        });
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
    }
    Ok(())
}
