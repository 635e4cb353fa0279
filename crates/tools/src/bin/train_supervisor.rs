//! 学習ジョブ監視
//!
//! トレーナーを起動して学習コマンドを送り、進捗ログのメトリクスを
//! `runs/<run-name>/` に記録する。学習完了後にモデルファイルを回収する。

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tools::supervisor::{
    IntervalPacer, LocalRunSink, RunInfo, SupervisorConfig, git_short_hash, run_name, supervise,
};

#[derive(Parser, Debug)]
#[command(name = "train_supervisor", version)]
#[command(about = "外部トレーナーを起動し、進捗ログを監視してメトリクスを記録する")]
struct Cli {
    /// 設定ファイル（TOML）。CLI 引数はファイルの値を上書きする
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// トレーナー実行ファイル
    #[arg(long)]
    engine: Option<PathBuf>,

    /// トレーナーへの追加引数
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    #[arg(long)]
    dataset: Option<PathBuf>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    epochs: Option<u32>,

    #[arg(long)]
    batch_size: Option<u32>,

    #[arg(long)]
    threads: Option<u32>,

    #[arg(long)]
    eval_influence: Option<f64>,

    /// トレーナーの進捗ログ
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// ポーリング間隔（秒）
    #[arg(long)]
    poll_interval: Option<u64>,

    #[arg(long)]
    project: Option<String>,

    /// ランの記録先
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    #[arg(long)]
    artifact_pattern: Option<String>,

    /// ラン名（省略時は `exp-<hash>-<時刻>`）
    #[arg(long)]
    run_name: Option<String>,

    /// 起動前に古い進捗ログを消さない
    #[arg(long)]
    keep_log: bool,
}

impl Cli {
    fn into_config(self) -> Result<(SupervisorConfig, Option<String>)> {
        let mut cfg = match &self.config {
            Some(path) => SupervisorConfig::load(path)?,
            None => SupervisorConfig::default(),
        };
        if let Some(v) = self.engine {
            cfg.engine = v;
        }
        if !self.engine_args.is_empty() {
            cfg.engine_args = self.engine_args;
        }
        if let Some(v) = self.dataset {
            cfg.dataset = v;
        }
        if let Some(v) = self.lr {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.threads {
            cfg.threads = v;
        }
        if self.eval_influence.is_some() {
            cfg.eval_influence = self.eval_influence;
        }
        if let Some(v) = self.log_file {
            cfg.log_file = v;
        }
        if let Some(v) = self.poll_interval {
            cfg.poll_interval_secs = v;
        }
        if let Some(v) = self.project {
            cfg.project = v;
        }
        if let Some(v) = self.runs_dir {
            cfg.runs_dir = v;
        }
        if let Some(v) = self.artifact_dir {
            cfg.artifact_dir = v;
        }
        if let Some(v) = self.artifact_pattern {
            cfg.artifact_pattern = v;
        }
        if self.keep_log {
            cfg.clear_log = false;
        }
        cfg.validate()?;
        Ok((cfg, self.run_name))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let (config, name) = Cli::parse().into_config()?;
    let name = name.unwrap_or_else(|| run_name(&git_short_hash(), chrono::Local::now()));
    let run = RunInfo {
        project: config.project.clone(),
        name,
        config: serde_json::to_value(&config)?,
    };

    let mut sink = LocalRunSink::new(&config.runs_dir);
    let mut pacer = IntervalPacer::new(config.poll_interval());
    let report = supervise(&config, &run, &mut sink, &mut pacer)?;

    println!(
        "Run {} finished: {} iterations, {} artifacts",
        report.run_name,
        report.last_iteration,
        report.artifacts.len()
    );
    Ok(())
}
