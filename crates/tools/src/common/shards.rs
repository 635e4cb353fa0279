//! シャードファイルの列挙

use std::path::{Path, PathBuf};

/// ワーカーが書き出すシャードの既定拡張子
pub const DEFAULT_SHARD_EXTENSION: &str = "plain";

#[derive(thiserror::Error, Debug)]
pub enum ShardError {
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no .{extension} shards found in {}", .dir.display())]
    NoShards { dir: PathBuf, extension: String },

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),
}

/// `dir/*.<extension>` に一致するファイルをパス順に返す。
///
/// ディレクトリが無い、または一致が 0 件ならエラー。
pub fn find_shards(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, ShardError> {
    if !dir.is_dir() {
        return Err(ShardError::DirectoryNotFound(dir.to_path_buf()));
    }

    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(extension)
    );
    let mut shards = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.is_file() {
            shards.push(path);
        }
    }
    shards.sort();

    if shards.is_empty() {
        return Err(ShardError::NoShards {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }
    log::debug!("found {} shards in {}", shards.len(), dir.display());
    Ok(shards)
}
