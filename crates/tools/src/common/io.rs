//! ファイルI/Oユーティリティ（gzip対応・原子的な書き出し）

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// `-` は標準入力、`.gz` は gzip として開く
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let f = File::open(p)?;
    if is_gzip(p) {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

enum Sink {
    Plain(BufWriter<File>),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn finish(self) -> io::Result<()> {
        match self {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gz(e) => e.finish()?.flush(),
        }
    }
}

/// 出力先と同じディレクトリの一時ファイルに書き、[`OutputFile::commit`] で
/// 置き換える。commit せずに drop した場合は一時ファイルごと消える。
#[must_use = "call .commit() to move the output into place"]
pub struct OutputFile {
    sink: Sink,
    temp: NamedTempFile,
    dest: PathBuf,
}

impl OutputFile {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let dest = path.as_ref().to_path_buf();
        let dir = match dest.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = NamedTempFile::new_in(&dir)?;
        let file = BufWriter::new(temp.as_file().try_clone()?);
        let sink = if is_gzip(&dest) {
            Sink::Gz(flate2::write::GzEncoder::new(file, flate2::Compression::default()))
        } else {
            Sink::Plain(file)
        };
        Ok(Self { sink, temp, dest })
    }

    pub fn path(&self) -> &Path {
        &self.dest
    }

    /// Finalize the stream and atomically rename it over the destination.
    pub fn commit(self) -> io::Result<()> {
        self.sink.finish()?;
        self.temp.as_file().sync_all()?;
        self.temp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Plain(f) => f.write(buf),
            Sink::Gz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain(f) => f.flush(),
            Sink::Gz(e) => e.flush(),
        }
    }
}

/// 既存ファイルを削除する。存在しなければ何もしない。削除したら `true`。
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    match std::fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
