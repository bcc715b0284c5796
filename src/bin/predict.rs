//! 学習済みモデルで画像1枚を分類

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use face_classifier_lib::ml::InferenceEngine;
use face_classifier_lib::model::{AppConfig, DeviceType};
use face_classifier_lib::ImageClassifier;

#[derive(Parser, Debug)]
#[command(name = "predict", about = "学習済みモデルで画像を分類")]
struct Args {
    /// 分類する画像ファイル
    image: PathBuf,

    /// 設定ファイルのパス
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// モデルバンドルのパス（設定ファイルより優先）
    #[arg(long)]
    model: Option<String>,

    /// 上位何件の候補を表示するか
    #[arg(long, default_value_t = 1)]
    top: usize,
}

fn print_ranking<B: burn::tensor::backend::Backend>(
    engine: &InferenceEngine<B>,
    args: &Args,
) -> anyhow::Result<()> {
    let prediction = engine.predict_image(&args.image)?;
    println!(
        "Prediction: {} with {}% confidence",
        prediction.label,
        prediction.confidence_text()
    );

    if args.top > 1 {
        for (rank, candidate) in engine.top_k(&args.image, args.top)?.iter().enumerate() {
            println!("  {}. {} ({}%)", rank + 1, candidate.label, candidate.confidence_text());
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    face_classifier_lib::init_logging();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default_from(&args.config);
    if let Some(model) = args.model.clone() {
        config.set_model_path(model);
    }
    let model_path = PathBuf::from(&config.model.model_path);

    match config.device_type {
        DeviceType::Cpu => {
            let engine = InferenceEngine::<burn_ndarray::NdArray>::load(&model_path, burn_ndarray::NdArrayDevice::Cpu)
                .with_context(|| format!("モデルを読み込めません: {}", model_path.display()))?;
            print_ranking(&engine, &args)
        }
        DeviceType::Wgpu => {
            let engine = InferenceEngine::<burn::backend::Wgpu>::load(&model_path, burn_wgpu::WgpuDevice::default())
                .with_context(|| format!("モデルを読み込めません: {}", model_path.display()))?;
            print_ranking(&engine, &args)
        }
    }
}
