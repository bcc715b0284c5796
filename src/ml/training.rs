//! モデル学習機能

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, Wgpu},
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
    train::ClassificationOutput,
};
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::WgpuDevice;
use log::{info, warn};
use std::path::PathBuf;

use crate::ml::dataset::{ImageBatcher, ImageFolderDataset};
use crate::ml::{model_to_bytes, ModelConfig};
use crate::model::config::{AppConfig, DeviceType};
use crate::model::{save_model_with_metadata, ModelMetadata, TrainingMetrics};

/// 学習パラメータ
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    /// 学習データディレクトリ（サブフォルダ = クラス）
    pub dataset_dir: PathBuf,
    /// モデルバンドルの保存先
    pub output_path: PathBuf,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub train_ratio: f32,
    /// モデル入力サイズ（正方形）
    pub image_size: usize,
}

impl TrainingOptions {
    /// アプリケーション設定から学習パラメータを作成
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            dataset_dir: PathBuf::from(&config.model.dataset_dir),
            output_path: PathBuf::from(&config.model.model_path),
            num_epochs: config.training.num_epochs,
            batch_size: config.training.batch_size,
            learning_rate: config.training.learning_rate,
            seed: config.training.seed,
            train_ratio: config.training.train_ratio,
            image_size: config.training.image_size,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            anyhow::bail!("エポック数は1以上を指定してください");
        }
        if self.batch_size == 0 {
            anyhow::bail!("バッチサイズは1以上を指定してください");
        }
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            anyhow::bail!("学習データの割合が不正です: {}", self.train_ratio);
        }
        Ok(())
    }
}

/// 1エポック分の学習結果
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub total_epochs: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub valid_loss: Option<f64>,
    pub valid_accuracy: Option<f64>,
}

/// 学習完了時の結果
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// 保存したモデルバンドルのパス
    pub model_path: PathBuf,
    pub class_labels: Vec<String>,
    pub train_samples: usize,
    pub valid_samples: usize,
    pub metrics: TrainingMetrics,
}

/// 損失と正解数の集計
#[derive(Debug, Default)]
struct RunningStats {
    loss_sum: f64,
    correct: usize,
    count: usize,
}

impl RunningStats {
    fn update<B: Backend>(&mut self, output: &ClassificationOutput<B>) {
        let [batch_size] = output.targets.dims();
        let loss = output.loss.clone().into_scalar().elem::<f64>();
        let predicted = output.output.clone().argmax(1).reshape([batch_size]);
        let correct = predicted
            .equal(output.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        self.loss_sum += loss * batch_size as f64;
        self.correct += correct.max(0) as usize;
        self.count += batch_size;
    }

    fn loss(&self) -> Option<f64> {
        (self.count > 0).then(|| self.loss_sum / self.count as f64)
    }

    fn accuracy(&self) -> Option<f64> {
        (self.count > 0).then(|| self.correct as f64 / self.count as f64)
    }
}

/// 読み込めない画像を含むバッチがあれば学習を中断する
fn ensure_batch_readable(failed: &[(PathBuf, String)]) -> Result<()> {
    match failed.first() {
        None => Ok(()),
        Some((path, reason)) => anyhow::bail!(
            "学習中に画像を読み込めませんでした {}: {}",
            path.display(),
            reason
        ),
    }
}

/// モデル学習を実行
///
/// 学習の進捗はログと `progress_callback`（エポックごと）で通知します。
/// 画像の読み込み失敗などのエラーが起きた場合は学習を中断し、
/// 既存のモデルファイルには触れません。
pub fn train_model<B, F>(
    options: &TrainingOptions,
    device: B::Device,
    mut progress_callback: F,
) -> Result<TrainingReport>
where
    B: AutodiffBackend,
    F: FnMut(&EpochMetrics),
{
    options.validate()?;

    info!("学習データを読み込みます: {}", options.dataset_dir.display());
    let dataset = ImageFolderDataset::from_dataset_dir(&options.dataset_dir)?;
    let class_labels = dataset.class_names().to_vec();

    info!("学習データの検証を開始します...");
    dataset.validate()?;
    info!("検証完了: {} 枚, {} クラス", dataset.len(), dataset.num_classes());

    // 学習/検証データに分割
    let (dataset_train, dataset_valid) = dataset.split(options.train_ratio, options.seed);
    let train_samples = dataset_train.len();
    let valid_samples = dataset_valid.len();

    if train_samples == 0 {
        anyhow::bail!("学習データが0枚です（データ数または学習データの割合を確認してください）");
    }
    if valid_samples == 0 {
        warn!("検証データが0枚です。検証指標は記録されません");
    }
    info!("学習データ: {} 枚 / 検証データ: {} 枚", train_samples, valid_samples);

    let model_config = ModelConfig::new(class_labels.len()).with_image_size(options.image_size);
    let mut model = model_config.init::<B>(&device)?;
    info!(
        "モデル設定: {} クラス, 入力サイズ: {}x{}, パラメータ数: {}",
        model_config.num_classes,
        options.image_size,
        options.image_size,
        model.num_params()
    );

    let batcher_train = ImageBatcher::<B>::new(device.clone(), options.image_size);
    let batcher_valid = ImageBatcher::<B::InnerBackend>::new(device.clone(), options.image_size);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(options.batch_size)
        .shuffle(options.seed)
        .build(dataset_train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(options.batch_size)
        .build(dataset_valid);

    let mut optim = AdamConfig::new().init();

    info!(
        "学習を開始します (エポック数: {}, バッチサイズ: {}, 学習率: {})",
        options.num_epochs, options.batch_size, options.learning_rate
    );

    let mut last_metrics = TrainingMetrics::default();

    for epoch in 1..=options.num_epochs {
        let mut train_stats = RunningStats::default();
        for batch in dataloader_train.iter() {
            ensure_batch_readable(&batch.failed)?;
            let output = model.forward_classification(batch.images, batch.targets);
            train_stats.update(&output);

            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(options.learning_rate, model, grads);
        }

        let model_valid = model.valid();
        let mut valid_stats = RunningStats::default();
        for batch in dataloader_valid.iter() {
            ensure_batch_readable(&batch.failed)?;
            let output = model_valid.forward_classification(batch.images, batch.targets);
            valid_stats.update(&output);
        }

        let metrics = EpochMetrics {
            epoch,
            total_epochs: options.num_epochs,
            train_loss: train_stats.loss().unwrap_or(0.0),
            train_accuracy: train_stats.accuracy().unwrap_or(0.0),
            valid_loss: valid_stats.loss(),
            valid_accuracy: valid_stats.accuracy(),
        };

        match (metrics.valid_loss, metrics.valid_accuracy) {
            (Some(valid_loss), Some(valid_accuracy)) => info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
                epoch, options.num_epochs, metrics.train_loss, metrics.train_accuracy, valid_loss, valid_accuracy
            ),
            _ => info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.4}",
                epoch, options.num_epochs, metrics.train_loss, metrics.train_accuracy
            ),
        }

        progress_callback(&metrics);

        last_metrics = TrainingMetrics {
            train_loss: metrics.train_loss,
            train_accuracy: metrics.train_accuracy,
            valid_loss: metrics.valid_loss,
            valid_accuracy: metrics.valid_accuracy,
        };
    }

    let model_binary = model_to_bytes(&model.valid())?;

    let mut metadata = ModelMetadata::new(class_labels.clone(), options.image_size as u32);
    metadata.num_epochs = options.num_epochs as u32;
    metadata.batch_size = options.batch_size as u32;
    metadata.learning_rate = options.learning_rate;
    metadata.seed = options.seed;
    metadata.train_samples = train_samples;
    metadata.valid_samples = valid_samples;
    metadata.metrics = last_metrics.clone();

    let model_path = save_model_with_metadata(&options.output_path, &metadata, &model_binary)
        .context("モデルの保存に失敗しました")?;

    Ok(TrainingReport {
        model_path,
        class_labels,
        train_samples,
        valid_samples,
        metrics: last_metrics,
    })
}

/// 設定ファイルの計算デバイスで学習を実行
pub fn train_with_config<F>(config: &AppConfig, progress_callback: F) -> Result<TrainingReport>
where
    F: FnMut(&EpochMetrics),
{
    let options = TrainingOptions::from_config(config);
    info!("使用デバイス: {}", config.device_type);

    match config.device_type {
        DeviceType::Cpu => {
            train_model::<Autodiff<NdArray>, _>(&options, NdArrayDevice::Cpu, progress_callback)
        }
        DeviceType::Wgpu => {
            train_model::<Autodiff<Wgpu>, _>(&options, WgpuDevice::default(), progress_callback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &std::path::Path) -> TrainingOptions {
        let mut config = AppConfig::default();
        config.model.dataset_dir = dir.join("dataset").to_string_lossy().to_string();
        config.model.model_path = dir.join("model.tar.gz").to_string_lossy().to_string();
        TrainingOptions::from_config(&config)
    }

    #[test]
    fn test_options_from_default_config() {
        let options = TrainingOptions::from_config(&AppConfig::default());
        assert_eq!(options.num_epochs, 5);
        assert_eq!(options.batch_size, 8);
        assert_eq!(options.image_size, 150);
        assert_eq!(options.dataset_dir, PathBuf::from("dataset"));
        assert_eq!(options.output_path, PathBuf::from("model/image_classifier.tar.gz"));
    }

    #[test]
    fn test_options_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        assert!(opts.validate().is_ok());

        opts.batch_size = 0;
        assert!(opts.validate().is_err());

        opts.batch_size = 8;
        opts.train_ratio = 0.0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_missing_dataset_aborts_without_writing_model() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());

        let result = train_model::<Autodiff<NdArray>, _>(&opts, NdArrayDevice::Cpu, |_| {});
        assert!(result.is_err());
        assert!(!opts.output_path.exists());
    }

    #[test]
    fn test_unreadable_batch_aborts() {
        assert!(ensure_batch_readable(&[]).is_ok());
        let failed = vec![(PathBuf::from("dataset/cat/1.png"), "decode error".to_string())];
        let err = ensure_batch_readable(&failed).unwrap_err();
        assert!(err.to_string().contains("dataset/cat/1.png"));
    }

    #[test]
    fn test_running_stats_empty() {
        let stats = RunningStats::default();
        assert_eq!(stats.loss(), None);
        assert_eq!(stats.accuracy(), None);
    }
}
