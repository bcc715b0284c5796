//! 機械学習モデルの共通定義
//!
//! 画像分類用のCNNモデルと画像の前処理を提供します。

use anyhow::Result;
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::{imageops::FilterType, DynamicImage};
use log::debug;
use std::path::Path;

use crate::error::ClassifierError;

/// 入力チャネル数（RGB）
pub const CHANNELS: usize = 3;

/// 受け付ける最小の入力サイズ（2段の畳み込み・プーリング後に1x1以上残るサイズ）
pub const MIN_IMAGE_SIZE: usize = 10;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 150)]
    pub image_size: usize,
    /// 全結合層の隠れユニット数
    #[config(default = 64)]
    pub hidden_size: usize,
}

impl ModelConfig {
    /// Flatten後の特徴次元
    ///
    /// Conv (3x3, no padding): size -> size - 2
    /// Pool (2x2, stride 2): size -> size / 2
    pub fn flattened_features(&self) -> Option<usize> {
        let after_conv1 = self.image_size.checked_sub(2)?;
        let after_pool1 = after_conv1 / 2;
        let after_conv2 = after_pool1.checked_sub(2)?;
        let after_pool2 = after_conv2 / 2;
        if after_pool2 == 0 {
            return None;
        }
        Some(64 * after_pool2 * after_pool2)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<FaceClassifier<B>> {
        if self.num_classes < 2 {
            anyhow::bail!("クラス数は2以上が必要です: {}", self.num_classes);
        }
        let d = self.flattened_features().ok_or_else(|| {
            anyhow::anyhow!(
                "入力サイズが小さすぎます: {} (最小{}x{}が必要)",
                self.image_size,
                MIN_IMAGE_SIZE,
                MIN_IMAGE_SIZE
            )
        })?;

        debug!("[Model] 入力サイズ: {}x{}", self.image_size, self.image_size);
        debug!("[Model] Flatten後の特徴次元 d: {}", d);
        debug!("[Model] FC1: {} -> {}", d, self.hidden_size);
        debug!("[Model] FC2: {} -> {}", self.hidden_size, self.num_classes);

        Ok(FaceClassifier {
            conv1: Conv2dConfig::new([CHANNELS, 32], [3, 3]).init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

/// 画像分類用CNNモデル
///
/// # アーキテクチャ
/// - Conv 3x3 (3 -> 32) + ReLU + MaxPool 2x2
/// - Conv 3x3 (32 -> 64) + ReLU + MaxPool 2x2
/// - Flatten
/// - FC: d -> 64 + ReLU
/// - FC: 64 -> num_classes
/// - Softmax (推論時)
#[derive(Module, Debug)]
pub struct FaceClassifier<B: Backend> {
    conv1: Conv2d<B>,  // 3 -> 32
    pool1: MaxPool2d,  // 2x2
    conv2: Conv2d<B>,  // 32 -> 64
    pool2: MaxPool2d,  // 2x2

    fc1: Linear<B>,    // d -> 64
    fc2: Linear<B>,    // 64 -> num_classes

    activation: Relu,
}

impl<B: Backend> FaceClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]、値域 [0, 1]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]（各行の合計は1）
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 出力クラス数
    pub fn num_classes(&self) -> usize {
        let [_, outputs] = self.fc2.weight.dims();
        outputs
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// 損失はロジットに対する交差エントロピー（Softmax + 多クラス交差エントロピーと等価）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// モデルの重みをバイト列に変換（f32精度）
pub fn model_to_bytes<B: Backend>(model: &FaceClassifier<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.clone().into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// バイト列から重みを復元したモデルを作成
///
/// 出力層の幅は保存された重みに従います（`config.num_classes` は使いません）。
/// ラベル数との照合は呼び出し側で `FaceClassifier::num_classes` を使って行います。
pub fn model_from_bytes<B: Backend>(
    config: &ModelConfig,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<FaceClassifier<B>> {
    let record: FaceClassifierRecord<B> = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(bytes, device)
        .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

    let [_, stored_outputs] = record.fc2.weight.dims();
    let model = ModelConfig::new(stored_outputs)
        .with_image_size(config.image_size)
        .with_hidden_size(config.hidden_size)
        .init::<B>(device)?;
    Ok(model.load_record(record))
}

/// 画像をリサイズして [0, 1] に正規化
///
/// # 戻り値
/// - RGB画像データ (C, H, W) の順で平坦化
pub fn image_to_chw(img: &DynamicImage, size: usize) -> Vec<f32> {
    let rgb = if img.width() == size as u32 && img.height() == size as u32 {
        img.to_rgb8()
    } else {
        img.resize_exact(size as u32, size as u32, FilterType::Nearest)
            .to_rgb8()
    };

    let mut data = Vec::with_capacity(CHANNELS * size * size);
    for channel in 0..CHANNELS {
        for pixel in rgb.pixels() {
            data.push(pixel[channel] as f32 / 255.0);
        }
    }
    data
}

/// 画像ファイルを読み込んで正規化
pub fn load_and_normalize_image_with_size(path: &Path, size: usize) -> Result<Vec<f32>, ClassifierError> {
    let img = image::open(path).map_err(|e| ClassifierError::from_image_error(path, e))?;
    Ok(image_to_chw(&img, size))
}
