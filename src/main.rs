//! 顔画像分類Webサーバー

use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use face_classifier_lib::ml::load_classifier;
use face_classifier_lib::model::AppConfig;
use face_classifier_lib::web::{build_rocket, AppState};

#[derive(Parser, Debug)]
#[command(name = "face_classifier", about = "学習済みモデルで顔画像を分類するWebサーバー")]
struct Args {
    /// 設定ファイルのパス
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// 待ち受けアドレス（設定ファイルより優先）
    #[arg(long)]
    address: Option<String>,

    /// 待ち受けポート（設定ファイルより優先）
    #[arg(long)]
    port: Option<u16>,

    /// モデルバンドルのパス（設定ファイルより優先）
    #[arg(long)]
    model: Option<String>,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    face_classifier_lib::init_logging();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default_from(&args.config);
    if let Some(model) = args.model {
        config.set_model_path(model);
    }
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.display();

    // 学習後にデータセットのクラス構成が変わっていないかも確認する
    let model_path = PathBuf::from(&config.model.model_path);
    let dataset_dir = PathBuf::from(&config.model.dataset_dir);
    let classifier = load_classifier(&model_path, config.device_type, Some(&dataset_dir))
        .with_context(|| format!("モデルを読み込めません: {}", model_path.display()))?;

    let state = AppState::new(Arc::from(classifier), &config.server.upload_dir);
    let rocket = build_rocket(state, &config.server)?;

    info!(
        "サーバーを起動します: http://{}:{}",
        config.server.address, config.server.port
    );
    rocket.launch().await.context("サーバーの実行に失敗しました")?;
    Ok(())
}
