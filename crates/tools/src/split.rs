//! 学習用・検証用への分割
//!
//! 各行について `[0, rate]` の一様整数を引き、0 なら検証用、それ以外は学習用に回す。
//! 検証用の割合は期待値で `1 / (rate + 1)`。

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::Rng;
use serde::Serialize;

use crate::common::{OutputFile, open_reader, progress};

pub const DEFAULT_SPLIT_RATE: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SplitSummary {
    pub training: u64,
    pub validation: u64,
}

pub fn split_corpus<R: Rng>(
    input: &Path,
    training: &Path,
    validation: &Path,
    rate: u32,
    rng: &mut R,
    show_progress: bool,
) -> Result<SplitSummary> {
    if rate == 0 {
        bail!("split rate must be >= 1");
    }

    let reader =
        open_reader(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let mut train_out = OutputFile::create(training)
        .with_context(|| format!("Failed to create {}", training.display()))?;
    let mut valid_out = OutputFile::create(validation)
        .with_context(|| format!("Failed to create {}", validation.display()))?;

    let mut summary = SplitSummary::default();
    let pb = progress::spinner(show_progress);
    for line in reader.lines() {
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
        if rng.random_range(0..=rate) == 0 {
            writeln!(valid_out, "{line}")?;
            summary.validation += 1;
        } else {
            writeln!(train_out, "{line}")?;
            summary.training += 1;
        }
        pb.inc(1);
    }

    train_out.commit()?;
    valid_out.commit()?;
    pb.finish_and_clear();
    log::info!(
        "split {}: {} training / {} validation",
        input.display(),
        summary.training,
        summary.validation
    );
    Ok(summary)
}
