//! モデルメタデータを使用した推論設定
//!
//! 保存されたメタデータからクラスインデックスとラベルの対応を取得します。

use log::{info, warn};

use crate::error::ClassifierError;
use crate::model::model_metadata::ModelMetadata;

/// モデルメタデータから推論用情報を取得
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// 全クラスラベル（インデックス順）
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub model_input_size: u32,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            model_input_size: metadata.image_size,
        }
    }

    /// クラス数
    pub fn num_total_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// モデルの出力数とラベル数が一致するか検証
    pub fn validate_output_width(&self, outputs: usize) -> Result<(), ClassifierError> {
        if outputs != self.class_labels.len() {
            return Err(ClassifierError::LabelMismatch {
                outputs,
                labels: self.class_labels.len(),
            });
        }
        Ok(())
    }

    /// クラスインデックスからラベルを取得
    pub fn class_index_to_label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index).map(String::as_str)
    }

    /// 現在のデータセットのクラス一覧と保存済みラベルを比較
    ///
    /// 一致しない場合は警告を出すだけで、推論には保存済みラベルを使い続けます。
    pub fn matches_dataset_labels(&self, dataset_labels: &[String]) -> bool {
        if dataset_labels == self.class_labels.as_slice() {
            return true;
        }
        warn!(
            "データセットのクラス構成が学習時と異なります: 学習時 [{}] / 現在 [{}]",
            self.class_labels.join(", "),
            dataset_labels.join(", ")
        );
        false
    }

    /// 設定情報をログに出力
    pub fn print_info(&self) {
        info!("=== 推論設定 ===");
        info!("クラスラベル: {}", self.class_labels.join(", "));
        info!("モデル入力サイズ: {}x{}", self.model_input_size, self.model_input_size);
        info!("総クラス数: {}", self.num_total_classes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InferenceConfig {
        let metadata = ModelMetadata::new(vec!["cat".into(), "dog".into()], 150);
        InferenceConfig::from_metadata(&metadata)
    }

    #[test]
    fn test_index_label_mapping() {
        let config = config();
        assert_eq!(config.class_index_to_label(0), Some("cat"));
        assert_eq!(config.class_index_to_label(1), Some("dog"));
        assert_eq!(config.class_index_to_label(2), None);
    }

    #[test]
    fn test_validate_output_width() {
        let config = config();
        assert!(config.validate_output_width(2).is_ok());
        match config.validate_output_width(3) {
            Err(ClassifierError::LabelMismatch { outputs, labels }) => {
                assert_eq!(outputs, 3);
                assert_eq!(labels, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_dataset_label_comparison() {
        let config = config();
        assert!(config.matches_dataset_labels(&["cat".to_string(), "dog".to_string()]));
        assert!(!config.matches_dataset_labels(&["cat".to_string(), "dog".to_string(), "fox".to_string()]));
    }
}
