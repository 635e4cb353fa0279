//! 局面レコード
//!
//! 自己対局ワーカーが書き出すシャードファイルの 1 行を表す。
//!
//! ```text
//! board_state;ply;move;score;outcome;extra
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationRow;
use crate::error::{WdlError, WdlResult};

/// 1 レコードあたりのフィールド数
pub const RECORD_FIELDS: usize = 6;

/// 対局結果（記録された側から見た勝敗）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Loss,
    Draw,
    Win,
}

impl Outcome {
    pub fn from_i32(v: i32) -> WdlResult<Self> {
        match v {
            -1 => Ok(Outcome::Loss),
            0 => Ok(Outcome::Draw),
            1 => Ok(Outcome::Win),
            other => Err(WdlError::InvalidOutcome(other)),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Outcome::Loss => -1,
            Outcome::Draw => 0,
            Outcome::Win => 1,
        }
    }

    /// クラス分布の添字（`outcome + 1`）
    pub fn class_index(self) -> usize {
        (self.as_i32() + 1) as usize
    }

    /// 反対側から見た結果
    pub fn flipped(self) -> Self {
        match self {
            Outcome::Loss => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
            Outcome::Win => Outcome::Loss,
        }
    }
}

impl FromStr for Outcome {
    type Err = WdlError;

    fn from_str(s: &str) -> WdlResult<Self> {
        let v: i32 = s.trim().parse().map_err(|_| WdlError::InvalidField {
            field: "outcome",
            value: s.to_string(),
        })?;
        Outcome::from_i32(v)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// 手番
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

/// シャードファイルの 1 レコード
///
/// フィールドは元の行を借用する。結合時は元の行をそのまま書き出すため、
/// 数値フィールドは検証目的でのみ解析する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRecord<'a> {
    pub board_state: &'a str,
    pub ply: u32,
    pub mv: &'a str,
    pub score: i32,
    pub outcome: Outcome,
    pub extra: &'a str,
}

impl<'a> PositionRecord<'a> {
    /// 1 行を解析する。フィールド数が [`RECORD_FIELDS`] でなければエラー。
    pub fn parse(line: &'a str) -> WdlResult<Self> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != RECORD_FIELDS {
            return Err(WdlError::FieldCount {
                expected: RECORD_FIELDS,
                actual: fields.len(),
                line: line.to_string(),
            });
        }

        Ok(Self {
            board_state: fields[0],
            ply: parse_field("ply", fields[1])?,
            mv: fields[2],
            score: parse_field("score", fields[3])?,
            outcome: fields[4].parse()?,
            extra: fields[5],
        })
    }

    /// 盤面文字列の第 2 トークン（`w` / `b`）から手番を得る
    pub fn side_to_move(&self) -> WdlResult<Side> {
        match self.board_state.split_whitespace().nth(1) {
            Some("w") => Ok(Side::White),
            Some("b") => Ok(Side::Black),
            _ => Err(WdlError::InvalidField {
                field: "side to move",
                value: self.board_state.to_string(),
            }),
        }
    }

    /// キャリブレーション用の行に変換する。
    ///
    /// 結果は白番なら符号そのまま、黒番なら反転する。
    pub fn to_calibration_row(&self) -> WdlResult<CalibrationRow> {
        let outcome = match self.side_to_move()? {
            Side::White => self.outcome,
            Side::Black => self.outcome.flipped(),
        };
        Ok(CalibrationRow {
            ply: self.ply,
            score: self.score,
            outcome,
        })
    }
}

pub(crate) fn parse_field<T: FromStr>(field: &'static str, value: &str) -> WdlResult<T> {
    value.trim().parse().map_err(|_| WdlError::InvalidField {
        field,
        value: value.to_string(),
    })
}
