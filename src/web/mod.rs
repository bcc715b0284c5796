//! アップロード画面（Rocket）
//!
//! 画像を1枚アップロードすると、分類結果と信頼度を画像と一緒に表示します。

pub mod page;
pub mod routes;
pub mod upload;

use anyhow::Context;
use rocket::data::{Limits, ToByteUnit};
use rocket::{routes, Build, Config, Rocket};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classifier::ImageClassifier;
use crate::model::ServerSettings;

/// サーバーの共有状態
pub struct AppState {
    /// 起動時に一度だけ読み込んだ分類器
    pub classifier: Arc<dyn ImageClassifier>,
    /// アップロード画像の一時保存先
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(classifier: Arc<dyn ImageClassifier>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            classifier,
            upload_dir: upload_dir.into(),
        }
    }
}

/// Rocketインスタンスを構築
pub fn build_rocket(state: AppState, settings: &ServerSettings) -> anyhow::Result<Rocket<Build>> {
    let address: IpAddr = settings
        .address
        .parse()
        .with_context(|| format!("待ち受けアドレスが不正です: {}", settings.address))?;

    let limits = Limits::default()
        .limit("file", settings.max_upload_mib.mebibytes())
        .limit("data-form", (settings.max_upload_mib + 1).mebibytes());

    let config = Config {
        address,
        port: settings.port,
        limits,
        ..Config::default()
    };

    Ok(rocket::custom(config)
        .manage(state)
        .mount("/", routes![routes::index, routes::upload, routes::health]))
}
