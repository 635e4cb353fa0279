//! WDL キャリブレーション
//!
//! `ply;score;outcome` 形式の行をスコアごとのバケットに集計し、勝率・敗率を
//! 4 次多項式で当てはめる。勝率曲線が 50% を横切るスコアを「ポーンスケール」とする。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{WdlError, WdlResult};
use crate::poly::{Polynomial, nearest_to_zero, polyfit};
use crate::record::{Outcome, parse_field};

/// 勝率・敗率曲線の次数
pub const FIT_DEGREE: usize = 4;

/// キャリブレーション用の 1 行（手番に依存しない視点の結果）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRow {
    pub ply: u32,
    pub score: i32,
    pub outcome: Outcome,
}

impl FromStr for CalibrationRow {
    type Err = WdlError;

    fn from_str(line: &str) -> WdlResult<Self> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != 3 {
            return Err(WdlError::FieldCount {
                expected: 3,
                actual: fields.len(),
                line: line.to_string(),
            });
        }
        Ok(Self {
            ply: parse_field("ply", fields[0])?,
            score: parse_field("score", fields[1])?,
            outcome: fields[2].parse()?,
        })
    }
}

impl fmt::Display for CalibrationRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.ply, self.score, self.outcome)
    }
}

/// 集計対象の窓
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitConfig {
    /// 手数の下限（含む）
    pub min_ply: u32,
    /// 手数の上限（含む）
    pub max_ply: u32,
    /// |score| の上限（含む）
    pub score_limit: i32,
    /// 浅い探索由来の見損じを除外する閾値。
    /// `score > t` で負け、`score < -t` で勝ちの行を捨てる。
    pub blunder_threshold: Option<i32>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            min_ply: 10,
            max_ply: 100,
            score_limit: 500,
            blunder_threshold: None,
        }
    }
}

impl FitConfig {
    pub fn retains(&self, row: &CalibrationRow) -> bool {
        if row.ply < self.min_ply || row.ply > self.max_ply {
            return false;
        }
        if row.score < self.score_limit.saturating_neg() || row.score > self.score_limit {
            return false;
        }
        if let Some(t) = self.blunder_threshold {
            let blunder = (row.score > t && row.outcome == Outcome::Loss)
                || (row.score < t.saturating_neg() && row.outcome == Outcome::Win);
            if blunder {
                return false;
            }
        }
        true
    }
}

/// 1 スコア値の集計
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub wins: u64,
    pub losses: u64,
    pub total: u64,
}

impl ScoreBucket {
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => {}
        }
        self.total += 1;
    }

    pub fn win_rate(&self) -> f64 {
        self.wins as f64 / self.total as f64
    }

    pub fn loss_rate(&self) -> f64 {
        self.losses as f64 / self.total as f64
    }
}

/// スコア値をキーとするバケット集合（スコア昇順）
#[derive(Debug, Default, Clone)]
pub struct ScoreBuckets {
    config: FitConfig,
    buckets: BTreeMap<i32, ScoreBucket>,
    rejected: u64,
}

impl ScoreBuckets {
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            buckets: BTreeMap::new(),
            rejected: 0,
        }
    }

    /// 窓の外の行は数えるだけで集計しない。集計したら `true`。
    pub fn add(&mut self, row: &CalibrationRow) -> bool {
        if !self.config.retains(row) {
            self.rejected += 1;
            return false;
        }
        self.buckets.entry(row.score).or_default().add(row.outcome);
        true
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn get(&self, score: i32) -> Option<&ScoreBucket> {
        self.buckets.get(&score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &ScoreBucket)> {
        self.buckets.iter().map(|(&s, b)| (s, b))
    }

    /// バケット数（異なるスコア値の数）
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// 窓の外で捨てた行数
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// 集計した行数
    pub fn retained(&self) -> u64 {
        self.buckets.values().map(|b| b.total).sum()
    }

    /// `(score, 勝率, 敗率)` の列
    fn rate_points(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut xs = Vec::with_capacity(self.len());
        let mut win = Vec::with_capacity(self.len());
        let mut loss = Vec::with_capacity(self.len());
        for (score, bucket) in self.iter() {
            xs.push(score as f64);
            win.push(bucket.win_rate());
            loss.push(bucket.loss_rate());
        }
        (xs, win, loss)
    }
}

impl Extend<CalibrationRow> for ScoreBuckets {
    fn extend<I: IntoIterator<Item = CalibrationRow>>(&mut self, rows: I) {
        for row in rows {
            self.add(&row);
        }
    }
}

/// 当てはめ結果
#[derive(Debug, Clone, PartialEq)]
pub struct WdlFit {
    /// 勝率曲線 `P_w(s)`
    pub win: Polynomial,
    /// 敗率曲線 `P_l(s)`
    pub loss: Polynomial,
    /// `P_w(s) = 0.5` となる実根のうち 0 に最も近いもの
    pub pawn_scale: f64,
    /// 当てはめに使ったバケット数
    pub buckets: usize,
}

/// 勝率・敗率それぞれに 4 次多項式を当てはめ、ポーンスケールを求める
pub fn fit_wdl(buckets: &ScoreBuckets) -> WdlResult<WdlFit> {
    let (xs, win_rates, loss_rates) = buckets.rate_points();
    let win = polyfit(&xs, &win_rates, FIT_DEGREE)?;
    let loss = polyfit(&xs, &loss_rates, FIT_DEGREE)?;
    let pawn_scale = pawn_scale(&win)?;
    log::debug!(
        "fitted {} buckets: win={:?} loss={:?} pawn_scale={pawn_scale}",
        xs.len(),
        win.descending(),
        loss.descending()
    );
    Ok(WdlFit {
        win,
        loss,
        pawn_scale,
        buckets: xs.len(),
    })
}

/// 勝率曲線から 0.5 を引いた多項式の実根のうち、絶対値最小のもの
pub fn pawn_scale(win: &Polynomial) -> WdlResult<f64> {
    let shifted = win.with_constant_offset(-0.5);
    nearest_to_zero(shifted.real_roots()).ok_or(WdlError::NoRealRoot)
}
