//! 画像分類デモのライブラリ
//!
//! - `ml`: CNNモデルの学習と推論（`ml` フィーチャー）
//! - `model`: 設定、モデルメタデータ、モデルバンドルの保存・読み込み
//! - `web`: 画像アップロード画面

pub mod classifier;
pub mod error;
pub mod model;
pub mod web;
#[cfg(feature = "ml")]
pub mod ml;

pub use classifier::{ImageClassifier, Prediction};
pub use error::ClassifierError;

/// ログ出力を初期化（`RUST_LOG` 未設定時は info）
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
