//! トレーナーのサブプロセス管理

use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

pub const TRAINER_QUIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const TRAINER_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// トレーナーのサブプロセス。標準出力はそのまま端末に流す。
///
/// drop 時に `quit` を送り、猶予時間内に終わらなければ kill する。
pub struct TrainerProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

impl TrainerProcess {
    pub fn spawn(path: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn trainer at {}", path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        log::info!("spawned trainer {} (pid {})", path.display(), child.id());
        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn write_line(&mut self, msg: &str) -> Result<()> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }
}

impl Drop for TrainerProcess {
    fn drop(&mut self) {
        // 既に終了していれば書き込みは失敗するが問題ない
        let _ = self.write_line("quit");
        let deadline = Instant::now() + TRAINER_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                log::debug!("trainer exited with {status}");
                return;
            }
            std::thread::sleep(TRAINER_QUIT_POLL_INTERVAL);
        }
        log::warn!("trainer did not quit within {:?}; killing", TRAINER_QUIT_TIMEOUT);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
