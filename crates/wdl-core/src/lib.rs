//! NNUE 教師データの局面レコードと WDL キャリブレーション
//!
//! - [`record`]: シャードファイル 1 行分の局面レコード（`board;ply;move;score;outcome;extra`）
//! - [`calibration`]: `ply;score;outcome` 形式の行、スコアバケット、WDL 曲線の当てはめ
//! - [`poly`]: 最小二乗による多項式当てはめと根の計算

pub mod calibration;
pub mod error;
pub mod poly;
pub mod record;

pub use calibration::{
    CalibrationRow, FitConfig, ScoreBucket, ScoreBuckets, WdlFit, fit_wdl, pawn_scale,
};
pub use error::{WdlError, WdlResult};
pub use poly::{Complex, Polynomial, nearest_real_root, polyfit};
pub use record::{Outcome, PositionRecord, RECORD_FIELDS, Side};
