//! 局面レコードを WDL キャリブレーション用の `ply;score;outcome` に変換する

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tools::common::{OutputFile, open_reader};
use tools::convert::convert_records;

#[derive(Parser)]
#[command(name = "convert_for_wdl_fit", version)]
struct Cli {
    /// 入力コーパス（`-` で標準入力、`.gz` 可）
    #[arg(default_value = "data.plain")]
    input: PathBuf,

    /// 出力テーブル
    #[arg(short, long, default_value = "out.txt")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let reader = open_reader(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    let mut out = OutputFile::create(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    let rows = convert_records(reader, &mut out)
        .with_context(|| format!("Failed to convert {}", cli.input.display()))?;
    out.commit()?;

    eprintln!("Wrote {rows} rows to {}", cli.output.display());
    Ok(())
}
