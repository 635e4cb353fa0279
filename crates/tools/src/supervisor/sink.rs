//! メトリクスのトラッキング先
//!
//! ライフサイクルは `start → log* → finish_artifact → close`。監視ループは
//! [`TrackingSink`] にだけ依存するので、テストでは記録するだけの実装を差し込める。

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::common::OutputFile;

/// ランの識別情報
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub project: String,
    pub name: String,
    pub config: serde_json::Value,
}

pub trait TrackingSink {
    fn start(&mut self, run: &RunInfo) -> Result<()>;

    /// 1 イテレーション分のメトリクスを記録し、サマリーの `iterations` を進める
    fn log(&mut self, iteration: u64, metrics: &BTreeMap<String, f64>) -> Result<()>;

    /// 学習で生成されたモデルファイルをランに登録する
    fn finish_artifact(&mut self, paths: &[PathBuf]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
struct RunSummary {
    project: String,
    name: String,
    state: &'static str,
    iterations: u64,
    started_at: String,
    finished_at: Option<String>,
    artifacts: Vec<String>,
}

struct ActiveRun {
    dir: PathBuf,
    metrics: BufWriter<File>,
    summary: RunSummary,
}

/// `<root>/<run-name>/` にランを記録するトラッキング先
///
/// - `config.json`: ラン情報
/// - `metrics.jsonl`: 1 イテレーション 1 行
/// - `summary.json`: 状態と `iterations`（転送済みの最大イテレーション）
/// - `artifacts/`: 回収したモデルファイルのコピー
pub struct LocalRunSink {
    root: PathBuf,
    run: Option<ActiveRun>,
}

impl LocalRunSink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            run: None,
        }
    }

    /// 開始済みならランのディレクトリ
    pub fn run_dir(&self) -> Option<&Path> {
        self.run.as_ref().map(|r| r.dir.as_path())
    }

    fn active(&mut self) -> Result<&mut ActiveRun> {
        self.run.as_mut().ok_or_else(|| anyhow!("tracking run has not been started"))
    }
}

impl ActiveRun {
    fn write_summary(&self) -> Result<()> {
        let path = self.dir.join("summary.json");
        let mut out = OutputFile::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(&mut out, &self.summary)?;
        out.write_all(b"\n")?;
        out.commit()?;
        Ok(())
    }
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

impl TrackingSink for LocalRunSink {
    fn start(&mut self, run: &RunInfo) -> Result<()> {
        let dir = self.root.join(&run.name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;

        let config_path = dir.join("config.json");
        let config = File::create(&config_path)
            .with_context(|| format!("Failed to create {}", config_path.display()))?;
        serde_json::to_writer_pretty(config, run)?;

        let metrics_path = dir.join("metrics.jsonl");
        let metrics = File::create(&metrics_path)
            .map(BufWriter::new)
            .with_context(|| format!("Failed to create {}", metrics_path.display()))?;

        let active = ActiveRun {
            dir,
            metrics,
            summary: RunSummary {
                project: run.project.clone(),
                name: run.name.clone(),
                state: "running",
                iterations: 0,
                started_at: now(),
                finished_at: None,
                artifacts: Vec::new(),
            },
        };
        active.write_summary()?;
        log::info!("tracking run {} in {}", run.name, active.dir.display());
        self.run = Some(active);
        Ok(())
    }

    fn log(&mut self, iteration: u64, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let run = self.active()?;
        let mut record = serde_json::Map::new();
        record.insert("iteration".to_string(), iteration.into());
        record.insert("timestamp".to_string(), now().into());
        for (name, value) in metrics {
            record.insert(name.clone(), serde_json::json!(value));
        }
        serde_json::to_writer(&mut run.metrics, &record)?;
        run.metrics.write_all(b"\n")?;
        run.metrics.flush()?;

        // メトリクス行は確定済み。サマリーの更新失敗はエラーにしない
        if iteration > run.summary.iterations {
            run.summary.iterations = iteration;
            if let Err(e) = run.write_summary() {
                log::warn!("failed to update summary at iteration {iteration}: {e:#}");
            }
        }
        Ok(())
    }

    fn finish_artifact(&mut self, paths: &[PathBuf]) -> Result<()> {
        let run = self.active()?;
        if paths.is_empty() {
            log::warn!("no model artifacts to register");
            return Ok(());
        }
        let dest_dir = run.dir.join("artifacts");
        std::fs::create_dir_all(&dest_dir)?;
        for path in paths {
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("artifact path has no file name: {}", path.display()))?;
            let dest = dest_dir.join(name);
            std::fs::copy(path, &dest).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), dest.display())
            })?;
            run.summary.artifacts.push(name.to_string_lossy().into_owned());
        }
        log::info!("registered {} artifacts", paths.len());
        run.write_summary()
    }

    fn close(&mut self) -> Result<()> {
        let run = self.active()?;
        run.metrics.flush()?;
        run.summary.state = "finished";
        run.summary.finished_at = Some(now());
        run.write_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::tail::{LogTailer, ScanOutcome};

    fn run_info(name: &str) -> RunInfo {
        RunInfo {
            project: "white-core".to_string(),
            name: name.to_string(),
            config: serde_json::json!({ "epochs": 10 }),
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn records_metrics_summary_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LocalRunSink::new(dir.path().join("runs"));
        sink.start(&run_info("exp-test")).unwrap();
        let run_dir = sink.run_dir().unwrap().to_path_buf();

        let mut metrics = BTreeMap::new();
        metrics.insert("training loss".to_string(), 0.5);
        sink.log(1, &metrics).unwrap();
        metrics.insert("training loss".to_string(), 0.4);
        sink.log(2, &metrics).unwrap();
        assert_eq!(read_json(&run_dir.join("summary.json"))["iterations"], 2);

        let model = dir.path().join("net.bin");
        std::fs::write(&model, [1u8, 2, 3]).unwrap();
        sink.finish_artifact(std::slice::from_ref(&model)).unwrap();
        sink.close().unwrap();

        let lines: Vec<serde_json::Value> = std::fs::read_to_string(run_dir.join("metrics.jsonl"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["iteration"], 2);
        assert_eq!(lines[1]["training loss"], 0.4);

        let summary = read_json(&run_dir.join("summary.json"));
        assert_eq!(summary["state"], "finished");
        assert_eq!(summary["artifacts"][0], "net.bin");
        assert_eq!(std::fs::read(run_dir.join("artifacts/net.bin")).unwrap(), vec![1, 2, 3]);
        assert_eq!(read_json(&run_dir.join("config.json"))["config"]["epochs"], 10);
    }

    #[test]
    fn summary_failure_does_not_duplicate_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LocalRunSink::new(dir.path());
        sink.start(&run_info("exp-summary")).unwrap();
        let run_dir = sink.run_dir().unwrap().to_path_buf();

        // summary.json を置き換えられない状態にする
        let summary = run_dir.join("summary.json");
        std::fs::remove_file(&summary).unwrap();
        std::fs::create_dir(&summary).unwrap();

        let mut tailer = LogTailer::new(run_dir.join("log.txt"));
        let log = "1 0.9 100 0.3\n";
        assert_eq!(
            tailer.scan_text(log, &mut sink).unwrap(),
            ScanOutcome::Running { forwarded: 1 }
        );
        std::fs::remove_dir(&summary).unwrap();
        assert_eq!(
            tailer.scan_text(log, &mut sink).unwrap(),
            ScanOutcome::Running { forwarded: 0 }
        );

        let metrics = std::fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
        assert_eq!(metrics.lines().count(), 1);

        sink.close().unwrap();
        assert_eq!(read_json(&summary)["iterations"], 1);
    }

    #[test]
    fn logging_before_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LocalRunSink::new(dir.path());
        assert!(sink.log(1, &BTreeMap::new()).is_err());
        assert!(sink.close().is_err());
    }
}
