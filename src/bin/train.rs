//! データセットからモデルを学習し、モデルバンドルを書き出す

use clap::Parser;
use log::info;
use std::path::PathBuf;

use face_classifier_lib::ml::{train_with_config, EpochMetrics};
use face_classifier_lib::model::{print_metadata_info, load_metadata, AppConfig, DeviceType};

#[derive(Parser, Debug)]
#[command(name = "train", about = "画像フォルダからCNN分類モデルを学習")]
struct Args {
    /// 設定ファイルのパス
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// データセットディレクトリ（サブフォルダ名がクラス名）
    #[arg(long)]
    dataset: Option<String>,

    /// 出力するモデルバンドルのパス
    #[arg(long)]
    output: Option<String>,

    /// エポック数
    #[arg(long)]
    epochs: Option<usize>,

    /// CPU (NdArray) で学習
    #[arg(long, conflicts_with = "gpu")]
    cpu: bool,

    /// GPU (WGPU) で学習
    #[arg(long)]
    gpu: bool,

    /// 上書きした設定を設定ファイルに保存
    #[arg(long)]
    save_config: bool,
}

fn main() -> anyhow::Result<()> {
    face_classifier_lib::init_logging();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default_from(&args.config);
    if let Some(dataset) = args.dataset {
        config.model.dataset_dir = dataset;
    }
    if let Some(output) = args.output {
        config.set_model_path(output);
    }
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if args.cpu {
        config.set_device_type(DeviceType::Cpu);
    } else if args.gpu {
        config.set_device_type(DeviceType::Wgpu);
    }
    config.display();

    if args.save_config {
        config.save(&args.config)?;
        info!("設定を保存しました: {}", args.config.display());
    }

    // エポックごとの進捗はログに出るので、最良の検証精度だけ控えておく
    let mut best_valid: Option<(usize, f64)> = None;
    let report = train_with_config(&config, |metrics: &EpochMetrics| {
        if let Some(acc) = metrics.valid_accuracy {
            if best_valid.map_or(true, |(_, best)| acc > best) {
                best_valid = Some((metrics.epoch, acc));
            }
        }
    })?;

    println!("\n学習が完了しました");
    println!("  モデル: {}", report.model_path.display());
    println!("  クラス: {}", report.class_labels.join(", "));
    println!("  学習 / 検証: {} / {} 枚", report.train_samples, report.valid_samples);
    if let Some((epoch, acc)) = best_valid {
        println!("  最良の検証精度: {:.4} (エポック {})", acc, epoch);
    }

    let metadata = load_metadata(&report.model_path)?;
    print_metadata_info(&metadata);

    Ok(())
}
