//! モデルメタデータの定義と永続化
//!
//! tar.gz形式のモデルバンドルに、重みと一緒に保存される学習時の情報です。
//! クラスラベルの並びはここに明示的に保存され、推論時はデータセットの
//! ディレクトリ構成ではなくこのリストを参照します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 学習結果の指標（最終エポック）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train_loss: f64,
    pub train_accuracy: f64,
    /// 検証データが無い場合は None
    pub valid_loss: Option<f64>,
    pub valid_accuracy: Option<f64>,
}

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラスラベル（インデックス = モデル出力のインデックス）
    /// 例: ["cat", "dog"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常150）
    pub image_size: u32,

    /// 学習エポック数
    pub num_epochs: u32,

    /// バッチサイズ
    pub batch_size: u32,

    /// 学習率
    pub learning_rate: f64,

    /// データ分割に使用したシード
    pub seed: u64,

    /// 学習データ数
    pub train_samples: usize,

    /// 検証データ数
    pub valid_samples: usize,

    /// 最終エポックの指標
    #[serde(default)]
    pub metrics: TrainingMetrics,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(class_labels: Vec<String>, image_size: u32) -> Self {
        Self {
            class_labels,
            image_size,
            num_epochs: 0,
            batch_size: 0,
            learning_rate: 0.0,
            seed: 0,
            train_samples: 0,
            valid_samples: 0,
            metrics: TrainingMetrics::default(),
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// クラス数
    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keeps_label_order() {
        let mut metadata = ModelMetadata::new(vec!["dog".into(), "cat".into()], 150);
        metadata.num_epochs = 5;
        metadata.metrics.valid_accuracy = Some(0.75);

        let json = metadata.to_json_string().unwrap();
        let restored = ModelMetadata::from_json_string(&json).unwrap();

        assert_eq!(restored.class_labels, vec!["dog", "cat"]);
        assert_eq!(restored.num_classes(), 2);
        assert_eq!(restored.image_size, 150);
        assert_eq!(restored.metrics.valid_accuracy, Some(0.75));
    }

    #[test]
    fn test_missing_metrics_defaults() {
        let json = r#"{
            "class_labels": ["a", "b"],
            "image_size": 32,
            "num_epochs": 1,
            "batch_size": 8,
            "learning_rate": 0.001,
            "seed": 42,
            "train_samples": 8,
            "valid_samples": 2,
            "trained_at": "2024-01-01T00:00:00+00:00"
        }"#;
        let metadata = ModelMetadata::from_json_string(json).unwrap();
        assert_eq!(metadata.metrics, TrainingMetrics::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(ModelMetadata::from_json_string("{}").is_err());
    }
}
