//! 進捗表示

use indicatif::{ProgressBar, ProgressStyle};

/// 件数が分かっている処理用。`visible == false` なら何も描画しない。
pub fn bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}) {msg}")
            .expect("valid template"),
    );
    pb
}

/// 件数が分からないストリーム処理用
pub fn spinner(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {pos} lines ({per_sec}) {msg}")
            .expect("valid template"),
    );
    pb
}
