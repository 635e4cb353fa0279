//! 外部トレーナーの監視
//!
//! トレーナーを起動して学習コマンドを 1 行送り、トレーナーが追記する進捗ログを
//! 一定周期で読み直してメトリクスをトラッキング先に転送する。

pub mod config;
pub mod process;
pub mod progress_log;
pub mod runner;
pub mod sink;
pub mod tail;

pub use config::{SupervisorConfig, TrainCommand};
pub use process::TrainerProcess;
pub use progress_log::{END_SENTINEL, LogLine, LogParseError, MetricTuple, parse_line};
pub use runner::{
    IntervalPacer, Pacer, SupervisorReport, collect_artifacts, git_short_hash,
    poll_until_finished, run_name, supervise,
};
pub use sink::{LocalRunSink, RunInfo, TrackingSink};
pub use tail::{LogTailer, ScanOutcome};
