//! 学習ジョブの監視ループ

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};

use super::config::SupervisorConfig;
use super::process::TrainerProcess;
use super::sink::{RunInfo, TrackingSink};
use super::tail::{LogTailer, ScanOutcome};
use crate::common::remove_if_exists;

/// ポーリング周期の待ち合わせ
pub trait Pacer {
    fn wait(&mut self);
}

/// 一定時間 sleep する
pub struct IntervalPacer {
    interval: Duration,
}

impl IntervalPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Pacer for IntervalPacer {
    fn wait(&mut self) {
        std::thread::sleep(self.interval);
    }
}

/// 監視結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub run_name: String,
    pub cycles: u64,
    pub last_iteration: u64,
    pub artifacts: Vec<PathBuf>,
}

/// `END` を検出するまでログを監視する。戻り値は周期数。
///
/// 1 周期の読み込み・解析・転送の失敗は警告を出して次の周期で再試行する。
pub fn poll_until_finished<S, P>(tailer: &mut LogTailer, sink: &mut S, pacer: &mut P) -> u64
where
    S: TrackingSink + ?Sized,
    P: Pacer + ?Sized,
{
    let mut cycles = 0u64;
    loop {
        pacer.wait();
        cycles += 1;
        match tailer.scan(sink) {
            Ok(ScanOutcome::Finished { forwarded }) => {
                log::info!(
                    "training finished after {cycles} cycles (+{forwarded}, last iteration {})",
                    tailer.last_iteration()
                );
                return cycles;
            }
            Ok(ScanOutcome::Running { forwarded }) => {
                if forwarded > 0 {
                    log::info!("iteration {} (+{forwarded})", tailer.last_iteration());
                }
            }
            Err(e) => log::warn!("cycle {cycles}: {e:#}"),
        }
    }
}

/// `dir` 直下で `pattern` に一致するファイル（ソート済み）
pub fn collect_artifacts(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = format!("{escaped}/{pattern}");
    let mut paths = Vec::new();
    for entry in glob::glob(&full).with_context(|| format!("invalid artifact pattern {full}"))? {
        let path = entry?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// 作業ディレクトリの短いコミットハッシュ。取れなければ `unknown`。
pub fn git_short_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `exp-<hash>-<YYYY_MM_DD_HH_MM_SS>`
pub fn run_name(hash: &str, at: chrono::DateTime<chrono::Local>) -> String {
    format!("exp-{hash}-{}", at.format("%Y_%m_%d_%H_%M_%S"))
}

/// トレーナーを起動して学習完了まで監視する。
///
/// 古いログを消し、トラッキングを開始してからコマンドを 1 行送る。
/// `END` 後にモデルファイルを登録してトラッキングを閉じ、トレーナーを終了させる。
/// トラッキング開始後に失敗した場合もトラッキングは閉じる。
pub fn supervise<S, P>(
    config: &SupervisorConfig,
    run: &RunInfo,
    sink: &mut S,
    pacer: &mut P,
) -> Result<SupervisorReport>
where
    S: TrackingSink + ?Sized,
    P: Pacer + ?Sized,
{
    config.validate()?;
    if config.clear_log {
        remove_if_exists(&config.log_file)
            .with_context(|| format!("Failed to clear {}", config.log_file.display()))?;
    }

    sink.start(run)?;
    match train(config, sink, pacer) {
        Ok((cycles, last_iteration, artifacts)) => {
            sink.close()?;
            Ok(SupervisorReport {
                run_name: run.name.clone(),
                cycles,
                last_iteration,
                artifacts,
            })
        }
        Err(e) => {
            if let Err(close_err) = sink.close() {
                log::warn!("failed to close tracking run {}: {close_err:#}", run.name);
            }
            Err(e)
        }
    }
}

/// 起動から成果物の登録まで。`(周期数, 最終イテレーション, 成果物)` を返す。
fn train<S, P>(
    config: &SupervisorConfig,
    sink: &mut S,
    pacer: &mut P,
) -> Result<(u64, u64, Vec<PathBuf>)>
where
    S: TrackingSink + ?Sized,
    P: Pacer + ?Sized,
{
    let mut trainer = TrainerProcess::spawn(&config.engine, &config.engine_args)?;
    let command = config.train_command().to_string();
    log::info!("> {command}");
    trainer.write_line(&command)?;

    let mut tailer = LogTailer::new(&config.log_file);
    let cycles = poll_until_finished(&mut tailer, sink, pacer);

    let artifacts = collect_artifacts(&config.artifact_dir, &config.artifact_pattern)?;
    sink.finish_artifact(&artifacts)?;
    drop(trainer);
    Ok((cycles, tailer.last_iteration(), artifacts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Recorder {
        logged: Vec<(u64, BTreeMap<String, f64>)>,
        started: bool,
        closed: bool,
    }

    impl TrackingSink for Recorder {
        fn start(&mut self, _run: &RunInfo) -> Result<()> {
            self.started = true;
            Ok(())
        }
        fn log(&mut self, iteration: u64, metrics: &BTreeMap<String, f64>) -> Result<()> {
            self.logged.push((iteration, metrics.clone()));
            Ok(())
        }
        fn finish_artifact(&mut self, _paths: &[PathBuf]) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    /// 周期ごとにログの内容を差し替える。`None` の周期ではファイルを消す。
    struct ScriptedPacer {
        path: PathBuf,
        snapshots: Vec<Option<&'static str>>,
        next: usize,
    }

    impl Pacer for ScriptedPacer {
        fn wait(&mut self) {
            match self.snapshots.get(self.next) {
                Some(Some(text)) => std::fs::write(&self.path, text).unwrap(),
                Some(None) => {
                    let _ = std::fs::remove_file(&self.path);
                }
                None => {}
            }
            self.next += 1;
        }
    }

    #[test]
    fn polls_until_end_and_forwards_each_iteration_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.txt");
        let mut pacer = ScriptedPacer {
            path: log.clone(),
            snapshots: vec![
                Some("1 0.9 100 0.3\n"),
                Some("1 0.9 100 0.3\n2 0.8 100 0.4\n2 0.8 100 0.4\n"),
                Some("1 0.9 100 0.3\n2 0.8 100 0.4\n2 0.8 100 0.4\n3 0.7 100 0.5\n"),
                Some("1 0.9 100 0.3\n2 0.8 100 0.4\n2 0.8 100 0.4\n3 0.7 100 0.5\nEND\n"),
            ],
            next: 0,
        };
        let mut sink = Recorder::default();
        let mut tailer = LogTailer::new(&log);
        let cycles = poll_until_finished(&mut tailer, &mut sink, &mut pacer);
        assert_eq!(cycles, 4);
        let iterations: Vec<u64> = sink.logged.iter().map(|(i, _)| *i).collect();
        assert_eq!(iterations, vec![1, 2, 3]);
        assert_eq!(sink.logged[2].1["training loss"], 0.7);
    }

    #[test]
    fn missing_log_and_bad_line_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.txt");
        let mut pacer = ScriptedPacer {
            path: log.clone(),
            snapshots: vec![
                None,
                Some("1 0.9 100 0.3\noops\n"),
                Some("1 0.9 100 0.3\n2 0.8 100 0.4\nEND\n"),
            ],
            next: 0,
        };
        let mut sink = Recorder::default();
        let mut tailer = LogTailer::new(&log);
        let cycles = poll_until_finished(&mut tailer, &mut sink, &mut pacer);
        assert_eq!(cycles, 3);
        let iterations: Vec<u64> = sink.logged.iter().map(|(i, _)| *i).collect();
        assert_eq!(iterations, vec![1, 2]);
    }

    #[test]
    fn spawn_failure_still_closes_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            engine: dir.path().join("no-such-trainer"),
            log_file: dir.path().join("log.txt"),
            runs_dir: dir.path().join("runs"),
            ..SupervisorConfig::default()
        };
        let run = RunInfo {
            project: config.project.clone(),
            name: "exp-spawn".to_string(),
            config: serde_json::Value::Null,
        };
        let mut sink = Recorder::default();
        let mut pacer = ScriptedPacer {
            path: config.log_file.clone(),
            snapshots: Vec::new(),
            next: 0,
        };
        let err = supervise(&config, &run, &mut sink, &mut pacer).unwrap_err();
        assert!(format!("{err:#}").contains("failed to spawn trainer"), "{err:#}");
        assert!(sink.started);
        assert!(sink.closed);
        assert_eq!(pacer.next, 0);
    }

    #[test]
    fn invalid_artifact_pattern_fails_before_starting() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            engine: dir.path().join("no-such-trainer"),
            log_file: dir.path().join("log.txt"),
            artifact_pattern: "[".to_string(),
            ..SupervisorConfig::default()
        };
        let run = RunInfo {
            project: config.project.clone(),
            name: "exp-pattern".to_string(),
            config: serde_json::Value::Null,
        };
        let mut sink = Recorder::default();
        let mut pacer = ScriptedPacer {
            path: config.log_file.clone(),
            snapshots: Vec::new(),
            next: 0,
        };
        assert!(supervise(&config, &run, &mut sink, &mut pacer).is_err());
        assert!(!sink.started);
    }

    #[test]
    fn artifacts_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.bin", "a.bin", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("dir.bin")).unwrap();
        let found = collect_artifacts(dir.path(), "*.bin").unwrap();
        let names: Vec<_> =
            found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.bin", "b.bin"]);
    }

    #[test]
    fn run_name_format() {
        let at = chrono::Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(run_name("abc1234", at), "exp-abc1234-2024_03_05_07_08_09");
    }
}
