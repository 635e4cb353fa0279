//! NNUE 学習パイプライン用ツール群
//!
//! - [`combine`]: ワーカーごとのシャードを 1 つのコーパスに結合（序盤局面の除外・クラス分布）
//! - [`split`]: コーパスを学習用と検証用に分割
//! - [`shuffle`]: シャードを結合して一様ランダムに並べ替え
//! - [`convert`]: 局面レコードを WDL キャリブレーション用の `ply;score;outcome` に変換
//! - [`supervisor`]: 外部トレーナーの起動・ログ監視・メトリクス転送

pub mod combine;
pub mod common;
pub mod convert;
pub mod shuffle;
pub mod split;
pub mod supervisor;
