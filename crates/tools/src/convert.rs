//! 局面レコード → WDL キャリブレーション用の行
//!
//! `board;ply;move;score;outcome;extra` を `ply;score;outcome` に変換する。
//! 結果の符号は盤面の手番で反転させる。

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use wdl_core::PositionRecord;

/// 変換した行数を返す
pub fn convert_records<R: BufRead, W: Write>(reader: R, mut writer: W) -> Result<u64> {
    let mut rows = 0u64;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
        let row = PositionRecord::parse(&line)
            .and_then(|rec| rec.to_calibration_row())
            .with_context(|| format!("line {}", idx + 1))?;
        writeln!(writer, "{row}")?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}
