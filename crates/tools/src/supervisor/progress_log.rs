//! トレーナーの進捗ログ
//!
//! 1 行 1 イテレーション、空白区切り:
//!
//! ```text
//! <iteration> <training_loss> <positions_per_second> <training_accuracy> [<validation_loss> <validation_accuracy>]
//! ```
//!
//! `END` トークンを含む行で学習完了。

use std::collections::BTreeMap;

use serde::Serialize;

pub const END_SENTINEL: &str = "END";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LogParseError {
    #[error("expected 4 or 6 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// 1 イテレーション分のメトリクス
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricTuple {
    pub iteration: u64,
    pub training_loss: f64,
    pub positions_per_second: f64,
    pub training_accuracy: f64,
    pub validation_loss: Option<f64>,
    pub validation_accuracy: Option<f64>,
}

impl MetricTuple {
    /// トラッキング先に送る名前付きスカラー
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("training loss".to_string(), self.training_loss);
        m.insert("positions per second".to_string(), self.positions_per_second);
        m.insert("training accuracy".to_string(), self.training_accuracy);
        if let Some(v) = self.validation_loss {
            m.insert("validation loss".to_string(), v);
        }
        if let Some(v) = self.validation_accuracy {
            m.insert("validation accuracy".to_string(), v);
        }
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLine {
    Blank,
    End,
    Metrics(MetricTuple),
}

fn number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, LogParseError> {
    value.parse().map_err(|_| LogParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

pub fn parse_line(line: &str) -> Result<LogLine, LogParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(LogLine::Blank);
    }
    if fields.contains(&END_SENTINEL) {
        return Ok(LogLine::End);
    }
    if fields.len() != 4 && fields.len() != 6 {
        return Err(LogParseError::FieldCount(fields.len()));
    }

    let (validation_loss, validation_accuracy) = if fields.len() == 6 {
        (
            Some(number("validation loss", fields[4])?),
            Some(number("validation accuracy", fields[5])?),
        )
    } else {
        (None, None)
    };

    Ok(LogLine::Metrics(MetricTuple {
        iteration: number("iteration", fields[0])?,
        training_loss: number("training loss", fields[1])?,
        positions_per_second: number("positions per second", fields[2])?,
        training_accuracy: number("training accuracy", fields[3])?,
        validation_loss,
        validation_accuracy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_training_only_line() {
        let LogLine::Metrics(m) = parse_line("12 0.0834 153000 0.61").unwrap() else {
            panic!("expected metrics");
        };
        assert_eq!(m.iteration, 12);
        assert_eq!(m.training_loss, 0.0834);
        assert_eq!(m.positions_per_second, 153000.0);
        assert_eq!(m.training_accuracy, 0.61);
        assert_eq!(m.validation_loss, None);

        let metrics = m.metrics();
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics["positions per second"], 153000.0);
    }

    #[test]
    fn parses_line_with_validation() {
        let LogLine::Metrics(m) = parse_line("3 0.2 9000 0.5 0.25 0.48\n").unwrap() else {
            panic!("expected metrics");
        };
        assert_eq!(m.validation_loss, Some(0.25));
        assert_eq!(m.validation_accuracy, Some(0.48));
        assert_eq!(m.metrics().len(), 5);
    }

    #[test]
    fn sentinel_and_blank() {
        assert_eq!(parse_line("END").unwrap(), LogLine::End);
        assert_eq!(parse_line("  END  ").unwrap(), LogLine::End);
        assert_eq!(parse_line("").unwrap(), LogLine::Blank);
        assert_eq!(parse_line("   ").unwrap(), LogLine::Blank);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_line("1 0.5 100").unwrap_err(), LogParseError::FieldCount(3));
        assert_eq!(parse_line("1 0.5 100 0.5 0.4").unwrap_err(), LogParseError::FieldCount(5));
        assert!(matches!(
            parse_line("x 0.5 100 0.5"),
            Err(LogParseError::InvalidNumber { field: "iteration", .. })
        ));
        assert!(matches!(
            parse_line("-1 0.5 100 0.5"),
            Err(LogParseError::InvalidNumber { field: "iteration", .. })
        ));
    }
}
