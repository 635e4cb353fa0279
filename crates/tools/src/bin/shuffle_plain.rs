use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tools::common::DEFAULT_SHARD_EXTENSION;
use tools::shuffle::{ShuffleOptions, shuffle_shards};

/// シャードを結合して一様ランダムに並べ替える
#[derive(Parser)]
#[command(name = "shuffle_plain", version)]
struct Cli {
    /// シャードのあるディレクトリ
    #[arg(default_value = "data")]
    dir: PathBuf,

    #[arg(short, long, default_value = "data.plain")]
    output: PathBuf,

    #[arg(long, default_value = DEFAULT_SHARD_EXTENSION)]
    extension: String,

    /// 乱数シード（再現性のため）
    #[arg(long)]
    seed: Option<u64>,

    /// 一時ブロック数。大規模コーパス用
    /// デフォルト: 0（全行をメモリに読み込む）
    #[arg(long, default_value_t = 0)]
    blocks: usize,

    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut rng = if let Some(seed) = cli.seed {
        eprintln!("Using seed: {seed}");
        ChaCha8Rng::seed_from_u64(seed)
    } else {
        ChaCha8Rng::from_os_rng()
    };

    if cli.blocks > 0 {
        eprintln!("Using chunked shuffle ({} blocks)", cli.blocks);
    } else {
        eprintln!("Using in-memory shuffle");
    }
    let opts = ShuffleOptions {
        extension: cli.extension,
        blocks: cli.blocks,
        show_progress: !cli.quiet,
    };
    let summary = shuffle_shards(&cli.dir, &cli.output, &opts, &mut rng)?;
    println!(
        "Shuffled {} lines from {} files into {}",
        summary.lines,
        summary.shards,
        summary.output.display()
    );
    Ok(())
}
