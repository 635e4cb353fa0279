//! 学習ジョブ設定
//!
//! TOML ファイルから読み込み、CLI 引数で上書きする。未指定の項目は既定値。
//!
//! ```toml
//! dataset = "data.plain"
//! learning_rate = 0.001
//! epochs = 10
//! batch_size = 16384
//! threads = 4
//! # eval_influence = 0.9
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// 学習ジョブ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// トラッキング上のプロジェクト名
    pub project: String,
    /// トレーナー（エンジン）実行ファイル
    pub engine: PathBuf,
    /// トレーナーへの追加引数
    pub engine_args: Vec<String>,
    /// 学習データ
    pub dataset: PathBuf,
    pub learning_rate: f64,
    pub epochs: u32,
    pub batch_size: u32,
    pub threads: u32,
    /// 評価値ラベルの重み（未指定ならトレーナーの既定値）
    pub eval_influence: Option<f64>,
    /// トレーナーが追記する進捗ログ
    pub log_file: PathBuf,
    /// 起動前に古い進捗ログを消す
    pub clear_log: bool,
    pub poll_interval_secs: u64,
    /// 学習後に回収するモデルファイルの場所
    pub artifact_dir: PathBuf,
    pub artifact_pattern: String,
    /// ローカルのラン記録先
    pub runs_dir: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            project: "white-core".to_string(),
            engine: PathBuf::from("./WhiteCore"),
            engine_args: Vec::new(),
            dataset: PathBuf::from("data.plain"),
            learning_rate: 0.001,
            epochs: 10,
            batch_size: 16384,
            threads: 4,
            eval_influence: None,
            log_file: PathBuf::from("log.txt"),
            clear_log: true,
            poll_interval_secs: 5,
            artifact_dir: PathBuf::from("."),
            artifact_pattern: "*.bin".to_string(),
            runs_dir: PathBuf::from("runs"),
        }
    }
}

impl SupervisorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            bail!("Invalid learning_rate: must be > 0");
        }
        if self.epochs == 0 || self.batch_size == 0 || self.threads == 0 {
            bail!("Invalid epochs/batch_size/threads: must be >= 1");
        }
        if self.eval_influence.is_some_and(|w| !w.is_finite()) {
            bail!("Invalid eval_influence: must be finite");
        }
        glob::Pattern::new(&self.artifact_pattern)
            .with_context(|| format!("Invalid artifact_pattern: {:?}", self.artifact_pattern))?;
        // コマンドは空白区切りなのでパスに空白は入れられない
        if self.dataset.to_string_lossy().chars().any(char::is_whitespace) {
            bail!("Dataset path must not contain whitespace: {}", self.dataset.display());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn train_command(&self) -> TrainCommand {
        TrainCommand {
            dataset: self.dataset.clone(),
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            batch_size: self.batch_size,
            threads: self.threads,
            eval_influence: self.eval_influence,
        }
    }
}

/// トレーナーの標準入力に送る 1 行
///
/// `train in <path> lr <float> epochs <int> batch <int> threads <int> [eval_influence <float>]`
#[derive(Debug, Clone, PartialEq)]
pub struct TrainCommand {
    pub dataset: PathBuf,
    pub learning_rate: f64,
    pub epochs: u32,
    pub batch_size: u32,
    pub threads: u32,
    pub eval_influence: Option<f64>,
}

impl fmt::Display for TrainCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "train in {} lr {} epochs {} batch {} threads {}",
            self.dataset.display(),
            self.learning_rate,
            self.epochs,
            self.batch_size,
            self.threads
        )?;
        if let Some(w) = self.eval_influence {
            write!(f, " eval_influence {w}")?;
        }
        Ok(())
    }
}
