//! 画像分類器の共通インターフェース
//!
//! 推論エンジンとWeb層の間の境界です。Web層はこのトレイトだけを知っており、
//! テストではフェイク実装に差し替えます。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ClassifierError;

/// アップロードを受け付ける拡張子
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 予測結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 予測クラス名
    pub label: String,
    /// 信頼度（%、小数点以下2桁に丸め済み）
    pub confidence: f64,
}

impl Prediction {
    /// 確率 (0.0〜1.0) から予測結果を作成
    pub fn from_probability(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            confidence: round_confidence(probability),
        }
    }

    /// 表示用の信頼度文字列（例: "87.50"）
    pub fn confidence_text(&self) -> String {
        format!("{:.2}", self.confidence)
    }
}

/// 確率をパーセントに変換して小数点以下2桁に丸める
pub fn round_confidence(probability: f32) -> f64 {
    let percent = (probability as f64 * 100.0).clamp(0.0, 100.0);
    (percent * 100.0).round() / 100.0
}

/// 画像分類器
pub trait ImageClassifier: Send + Sync {
    /// 画像ファイル1枚を分類
    fn predict_image(&self, path: &Path) -> Result<Prediction, ClassifierError>;

    /// クラスインデックス順のラベル一覧
    fn class_labels(&self) -> &[String];
}

/// ファイル名の拡張子が対応形式か判定（大文字小文字は区別しない）
pub fn supported_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_confidence_two_decimals() {
        assert_eq!(round_confidence(0.123456), 12.35);
        assert_eq!(round_confidence(1.0), 100.0);
        assert_eq!(round_confidence(0.0), 0.0);
    }

    #[test]
    fn test_round_confidence_is_clamped() {
        assert_eq!(round_confidence(1.0000001), 100.0);
        assert_eq!(round_confidence(-0.01), 0.0);
    }

    #[test]
    fn test_confidence_text() {
        let prediction = Prediction::from_probability("cat", 0.875);
        assert_eq!(prediction.label, "cat");
        assert_eq!(prediction.confidence_text(), "87.50");
    }

    #[test]
    fn test_supported_extension() {
        assert_eq!(supported_extension("face.jpg").as_deref(), Some("jpg"));
        assert_eq!(supported_extension("FACE.JPEG").as_deref(), Some("jpeg"));
        assert_eq!(supported_extension("dir/face.Png").as_deref(), Some("png"));
        assert_eq!(supported_extension("face.gif"), None);
        assert_eq!(supported_extension("face"), None);
        assert_eq!(supported_extension(".png"), None);
    }
}
