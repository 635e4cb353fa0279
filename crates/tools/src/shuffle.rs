//! シャード結合 + シャッフル
//!
//! 下流が i.i.d. な順序を前提とする場合に使う。フィルタはかけず、全シャードの全行を
//! 一様ランダムな順列で書き出す。
//!
//! - インメモリ方式: 全行をメモリに載せて Fisher–Yates。メモリ使用量はコーパス全体に比例する。
//! - チャンク方式: 各行を一様ランダムに選んだ一時ブロックへ振り分け、ブロックごとに
//!   シャッフルして連結する。各行に i.i.d. な (ブロック番号, ブロック内順位) を割り当てて
//!   整列するのと同じなので、結果はやはり一様な順列になる。

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::common::{OutputFile, ShardError, find_shards, open_reader, progress};

/// チャンク方式の上限ブロック数
pub const MAX_BLOCKS: usize = 1000;

#[derive(Debug, Clone)]
pub struct ShuffleOptions {
    pub extension: String,
    /// 0 ならインメモリ方式
    pub blocks: usize,
    pub show_progress: bool,
}

impl Default for ShuffleOptions {
    fn default() -> Self {
        Self {
            extension: crate::common::DEFAULT_SHARD_EXTENSION.to_string(),
            blocks: 0,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShuffleSummary {
    pub shards: usize,
    pub lines: u64,
    pub output: PathBuf,
}

/// シャッフル対象のシャードを列挙する。一致 0 件は空の出力として扱う。
fn list_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    match find_shards(dir, extension) {
        Ok(shards) => Ok(shards),
        Err(ShardError::NoShards { dir, extension }) => {
            log::warn!("no .{extension} files in {}; output will be empty", dir.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// 全シャードの全行を読み込む
pub fn load_lines(shards: &[PathBuf]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for shard in shards {
        log::info!("Reading {}", shard.display());
        let reader =
            open_reader(shard).with_context(|| format!("Failed to open {}", shard.display()))?;
        for line in reader.lines() {
            lines.push(line.with_context(|| format!("Failed to read {}", shard.display()))?);
        }
    }
    Ok(lines)
}

pub fn shuffle_shards<R: Rng>(
    dir: &Path,
    output: &Path,
    opts: &ShuffleOptions,
    rng: &mut R,
) -> Result<ShuffleSummary> {
    let shards = list_inputs(dir, &opts.extension)?;
    let lines = if opts.blocks > 0 {
        shuffle_chunked(&shards, output, opts.blocks, rng, opts.show_progress)?
    } else {
        shuffle_in_memory(&shards, output, rng, opts.show_progress)?
    };
    Ok(ShuffleSummary {
        shards: shards.len(),
        lines,
        output: output.to_path_buf(),
    })
}

/// インメモリ方式。書き出した行数を返す。
pub fn shuffle_in_memory<R: Rng>(
    shards: &[PathBuf],
    output: &Path,
    rng: &mut R,
    show_progress: bool,
) -> Result<u64> {
    let mut lines = load_lines(shards)?;
    log::info!("Shuffling {} lines...", lines.len());
    lines.shuffle(rng);

    let pb = progress::bar(lines.len() as u64, show_progress);
    pb.set_message("Writing...");
    let mut out = OutputFile::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    for line in &lines {
        writeln!(out, "{line}")?;
        pb.inc(1);
    }
    out.commit()?;
    pb.finish_and_clear();
    Ok(lines.len() as u64)
}

/// チャンク方式（2 パス）。書き出した行数を返す。
pub fn shuffle_chunked<R: Rng>(
    shards: &[PathBuf],
    output: &Path,
    blocks: usize,
    rng: &mut R,
    show_progress: bool,
) -> Result<u64> {
    if blocks == 0 {
        bail!("Invalid block count: 0");
    }
    if blocks > MAX_BLOCKS {
        bail!("Too many blocks ({blocks}). Maximum is {MAX_BLOCKS}");
    }

    let temp_dir = tempfile::tempdir().context("Failed to create temp directory")?;
    let block_path = |i: usize| temp_dir.path().join(format!("block{i}.plain"));

    // Pass 1: 各行をランダムなブロックに振り分け
    let mut writers: Vec<BufWriter<File>> = (0..blocks)
        .map(|i| {
            let path = block_path(i);
            File::create(&path)
                .map(BufWriter::new)
                .with_context(|| format!("Failed to create block file: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let pb = progress::spinner(show_progress);
    pb.set_message("Pass 1");
    for shard in shards {
        log::info!("Reading {}", shard.display());
        let reader =
            open_reader(shard).with_context(|| format!("Failed to open {}", shard.display()))?;
        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read {}", shard.display()))?;
            let block = rng.random_range(0..blocks);
            writeln!(writers[block], "{line}")?;
            pb.inc(1);
        }
    }
    for w in &mut writers {
        w.flush()?;
    }
    drop(writers);
    pb.finish_and_clear();

    // Pass 2: ブロックごとにシャッフルして連結
    let pb = progress::bar(blocks as u64, show_progress);
    pb.set_message("Pass 2");
    let mut out = OutputFile::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut written = 0u64;
    for i in 0..blocks {
        let path = block_path(i);
        let mut block = BufReader::new(File::open(&path)?)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()?;
        block.shuffle(rng);
        for line in &block {
            writeln!(out, "{line}")?;
        }
        written += block.len() as u64;
        pb.inc(1);
    }
    out.commit()?;
    pb.finish_and_clear();
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn write_shards(dir: &Path, files: usize, per_file: usize) -> Vec<String> {
        let mut all = Vec::new();
        for f in 0..files {
            let lines: Vec<String> = (0..per_file).map(|i| format!("s{f}-{i};20;m;0;0;0")).collect();
            std::fs::write(dir.join(format!("w{f}.plain")), lines.join("\n") + "\n").unwrap();
            all.extend(lines);
        }
        all
    }

    fn sorted_lines(path: &Path) -> Vec<String> {
        let mut v: Vec<String> =
            std::fs::read_to_string(path).unwrap().lines().map(str::to_string).collect();
        v.sort();
        v
    }

    #[test]
    fn in_memory_output_is_a_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = write_shards(dir.path(), 3, 50);
        let out = dir.path().join("shuffled.txt");
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let summary = shuffle_shards(dir.path(), &out, &ShuffleOptions::default(), &mut rng).unwrap();
        assert_eq!(summary.shards, 3);
        assert_eq!(summary.lines, 150);

        let written: Vec<String> =
            std::fs::read_to_string(&out).unwrap().lines().map(str::to_string).collect();
        assert_ne!(written, input, "order should change");
        input.sort();
        assert_eq!(sorted_lines(&out), input);
    }

    #[test]
    fn chunked_output_is_a_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = write_shards(dir.path(), 2, 100);
        let out = dir.path().join("shuffled.txt");
        let opts = ShuffleOptions {
            blocks: 7,
            ..ShuffleOptions::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let summary = shuffle_shards(dir.path(), &out, &opts, &mut rng).unwrap();
        assert_eq!(summary.lines, 200);
        input.sort();
        assert_eq!(sorted_lines(&out), input);
    }

    /// 3 行の全 6 通りがほぼ均等に出る
    fn ordering_frequencies(blocks: usize) -> HashMap<Vec<String>, usize> {
        let dir = tempfile::tempdir().unwrap();
        let shards = dir.path().join("in");
        std::fs::create_dir(&shards).unwrap();
        std::fs::write(shards.join("a.plain"), "a\nb\nc\n").unwrap();
        let paths = vec![shards.join("a.plain")];
        let out = dir.path().join("out.txt");

        let mut counts = HashMap::new();
        for seed in 0..1800u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            if blocks == 0 {
                shuffle_in_memory(&paths, &out, &mut rng, false).unwrap();
            } else {
                shuffle_chunked(&paths, &out, blocks, &mut rng, false).unwrap();
            }
            let order: Vec<String> =
                std::fs::read_to_string(&out).unwrap().lines().map(str::to_string).collect();
            *counts.entry(order).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn in_memory_orderings_are_uniform() {
        let counts = ordering_frequencies(0);
        assert_eq!(counts.len(), 6);
        for (order, n) in &counts {
            assert!((200..400).contains(n), "{order:?} appeared {n} times");
        }
    }

    #[test]
    fn chunked_orderings_are_uniform() {
        let counts = ordering_frequencies(2);
        assert_eq!(counts.len(), 6);
        for (order, n) in &counts {
            assert!((200..400).contains(n), "{order:?} appeared {n} times");
        }
    }

    #[test]
    fn missing_directory_is_an_error_but_empty_directory_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(
            shuffle_shards(&dir.path().join("nope"), &out, &ShuffleOptions::default(), &mut rng)
                .is_err()
        );

        let summary = shuffle_shards(dir.path(), &out, &ShuffleOptions::default(), &mut rng).unwrap();
        assert_eq!(summary.lines, 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn block_count_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let out = dir.path().join("out.txt");
        assert!(shuffle_chunked(&[], &out, 0, &mut rng, false).is_err());
        assert!(shuffle_chunked(&[], &out, MAX_BLOCKS + 1, &mut rng, false).is_err());
    }
}
