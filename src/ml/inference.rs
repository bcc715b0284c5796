//! モデル推論機能

use burn::{
    backend::Wgpu,
    tensor::{backend::Backend, Tensor},
};
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::WgpuDevice;
use log::{info, warn};
use std::path::Path;
use std::sync::Mutex;

use crate::classifier::{ImageClassifier, Prediction};
use crate::error::ClassifierError;
use crate::ml::dataset::list_class_names;
use crate::ml::{load_and_normalize_image_with_size, model_from_bytes, FaceClassifier, ModelConfig};
use crate::model::{load_model_with_metadata, DeviceType, InferenceConfig};

/// 推論エンジン
///
/// モデルとクラスラベルを一度だけ読み込み、以降の予測で使い回します。
/// モデルは `Mutex` で保護しているため、複数スレッドから共有できます。
pub struct InferenceEngine<B: Backend> {
    model: Mutex<FaceClassifier<B>>,
    config: InferenceConfig,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        let (metadata, model_binary) = load_model_with_metadata(model_path)
            .map_err(|e| ClassifierError::ModelLoad(format!("{:#}", e)))?;
        let config = InferenceConfig::from_metadata(&metadata);

        let model_config = ModelConfig::new(config.num_total_classes())
            .with_image_size(config.model_input_size as usize);
        let model = model_from_bytes::<B>(&model_config, model_binary, &device)
            .map_err(|e| ClassifierError::ModelLoad(format!("{:#}", e)))?;

        config.validate_output_width(model.num_classes())?;

        info!("モデルを読み込みました: {}", model_path.display());
        config.print_info();

        Ok(Self {
            model: Mutex::new(model),
            config,
            device,
        })
    }

    /// 現在のデータセットのクラス構成が学習時と一致するか確認
    ///
    /// データセットが存在しない場合は確認を省略します。
    pub fn check_dataset_labels(&self, dataset_dir: &Path) -> bool {
        match list_class_names(dataset_dir) {
            Ok(labels) => self.config.matches_dataset_labels(&labels),
            Err(e) => {
                warn!("データセットのクラス構成を確認できません: {:#}", e);
                true
            }
        }
    }

    /// 単一画像のクラス確率（インデックス順）
    pub fn predict_probabilities<P: AsRef<Path>>(&self, image_path: P) -> Result<Vec<f32>, ClassifierError> {
        let size = self.config.model_input_size as usize;
        let image_data = load_and_normalize_image_with_size(image_path.as_ref(), size)?;

        // Tensorに変換 [1, 3, size, size]
        let tensor = Tensor::<B, 1>::from_floats(image_data.as_slice(), &self.device)
            .reshape([1, 3, size, size]);

        let model = self
            .model
            .lock()
            .map_err(|_| ClassifierError::Inference("モデルのロックが破損しています".to_string()))?;
        let probabilities = model.forward_probabilities(tensor);
        drop(model);

        probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("推論結果の取得エラー: {:?}", e)))
    }

    /// 単一画像を分類
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction, ClassifierError> {
        let probabilities = self.predict_probabilities(image_path)?;

        let (class_idx, probability) = first_argmax(&probabilities)
            .ok_or_else(|| ClassifierError::Inference("推論結果が空です".to_string()))?;

        let label = self.config.class_index_to_label(class_idx).ok_or(ClassifierError::LabelMismatch {
            outputs: probabilities.len(),
            labels: self.config.num_total_classes(),
        })?;

        Ok(Prediction::from_probability(label, probability))
    }

    /// 確率の高い順に上位 `k` 件
    pub fn top_k<P: AsRef<Path>>(&self, image_path: P, k: usize) -> Result<Vec<Prediction>, ClassifierError> {
        let probabilities = self.predict_probabilities(image_path)?;
        let mut ranked: Vec<(usize, f32)> = probabilities.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(ranked
            .into_iter()
            .take(k)
            .filter_map(|(idx, p)| {
                self.config
                    .class_index_to_label(idx)
                    .map(|label| Prediction::from_probability(label, p))
            })
            .collect())
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

impl<B: Backend> ImageClassifier for InferenceEngine<B> {
    fn predict_image(&self, path: &Path) -> Result<Prediction, ClassifierError> {
        self.classify_image(path)
    }

    fn class_labels(&self) -> &[String] {
        &self.config.class_labels
    }
}

/// 最大値のインデックスと値（同値の場合は先頭を優先）
pub fn first_argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, p)| match best {
            Some((_, best_p)) if p <= best_p => best,
            _ => Some((idx, p)),
        })
}

fn load_engine<B: Backend>(
    model_path: &Path,
    device: B::Device,
    dataset_dir: Option<&Path>,
) -> Result<Box<dyn ImageClassifier>, ClassifierError> {
    let engine = InferenceEngine::<B>::load(model_path, device)?;
    if let Some(dir) = dataset_dir {
        engine.check_dataset_labels(dir);
    }
    Ok(Box::new(engine))
}

/// 設定された計算デバイスで推論エンジンを読み込む
///
/// `dataset_dir` を渡すと、学習時のラベルと現在のデータセットを照合して
/// 不一致を警告します（推論には保存済みラベルを使います）。
pub fn load_classifier(
    model_path: &Path,
    device_type: DeviceType,
    dataset_dir: Option<&Path>,
) -> Result<Box<dyn ImageClassifier>, ClassifierError> {
    match device_type {
        DeviceType::Cpu => load_engine::<NdArray>(model_path, NdArrayDevice::Cpu, dataset_dir),
        DeviceType::Wgpu => load_engine::<Wgpu>(model_path, WgpuDevice::default(), dataset_dir),
    }
}
