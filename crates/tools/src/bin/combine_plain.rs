//! 学習データ準備
//!
//! 既知の出力ファイルを消してからシャードを結合し、`--split-rate` 指定時は
//! 学習用と検証用に分割する。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tools::combine::{CombineOptions, DEFAULT_EARLY_PLY_CUTOFF, combine_shards};
use tools::common::{DEFAULT_SHARD_EXTENSION, remove_if_exists};
use tools::split::split_corpus;

#[derive(Parser, Debug)]
#[command(
    name = "combine_plain",
    version,
    about = "シャードを 1 つのコーパスに結合し、必要なら学習用・検証用に分割する"
)]
struct Cli {
    /// シャードのあるディレクトリ
    #[arg(default_value = "data")]
    dir: PathBuf,

    /// 結合したコーパス
    #[arg(short, long, default_value = "data.plain")]
    output: PathBuf,

    /// シャードの拡張子
    #[arg(long, default_value = DEFAULT_SHARD_EXTENSION)]
    extension: String,

    /// この手数以下の局面を除外
    #[arg(long, default_value_t = DEFAULT_EARLY_PLY_CUTOFF)]
    early_ply_cutoff: u32,

    /// 分割率（約 1/(rate+1) を検証用へ）。省略時は分割しない
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    split_rate: Option<u32>,

    #[arg(long, default_value = "train.plain")]
    train: PathBuf,

    #[arg(long, default_value = "validation.plain")]
    validation: PathBuf,

    /// 乱数シード（再現性のため）
    #[arg(long)]
    seed: Option<u64>,

    /// 結果のサマリーを JSON で書き出す
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// 進捗表示を出さない
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    for path in [&cli.output, &cli.train, &cli.validation] {
        if remove_if_exists(path).with_context(|| format!("Failed to remove {}", path.display()))? {
            log::info!("removed old {}", path.display());
        }
    }

    let opts = CombineOptions {
        extension: cli.extension.clone(),
        early_ply_cutoff: cli.early_ply_cutoff,
        show_progress: !cli.quiet,
    };
    let summary = match combine_shards(&cli.dir, &cli.output, &opts) {
        Ok(summary) => summary,
        Err(e) if e.is_missing_input() => {
            eprintln!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    summary.print_report();

    let mut report = serde_json::json!({ "combine": summary });
    if let Some(rate) = cli.split_rate {
        let mut rng = match cli.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        let split = split_corpus(
            &cli.output,
            &cli.train,
            &cli.validation,
            rate,
            &mut rng,
            !cli.quiet,
        )?;
        println!(
            "Split into {} ({} positions) and {} ({} positions)",
            cli.train.display(),
            split.training,
            cli.validation.display(),
            split.validation
        );
        report["split"] = serde_json::to_value(split)?;
    }

    if let Some(path) = &cli.summary_json {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
    }
    Ok(())
}
