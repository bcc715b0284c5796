//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデル、学習、Webサーバーの設定をJSON形式で保存・読み込みします。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Cpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// モデルバンドル（tar.gz）のパス
    pub model_path: String,
    /// 学習データセットのディレクトリ（サブフォルダ名がクラス名）
    pub dataset_dir: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "model/image_classifier.tar.gz".to_string(),
            dataset_dir: "dataset".to_string(),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード（データ分割とシャッフルに使用）
    pub seed: u64,
    /// トレーニングデータの割合
    pub train_ratio: f32,
    /// モデル入力画像サイズ（正方形）
    #[serde(default = "default_image_size")]
    pub image_size: usize,
}

fn default_image_size() -> usize {
    150
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 5,
            batch_size: 8,
            learning_rate: 1e-3,
            seed: 42,
            train_ratio: 0.8,
            image_size: default_image_size(),
        }
    }
}

/// Webサーバー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// 待ち受けアドレス
    pub address: String,
    /// 待ち受けポート
    pub port: u16,
    /// アップロード画像の一時保存ディレクトリ
    pub upload_dir: String,
    /// アップロードサイズ上限（MiB）
    pub max_upload_mib: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
            upload_dir: "uploads".to_string(),
            max_upload_mib: 10,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// Webサーバー設定
    #[serde(default)]
    pub server: ServerSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない・壊れている場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 計算デバイスを設定
    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
    }

    /// モデルパスを設定
    pub fn set_model_path(&mut self, path: String) {
        self.model.model_path = path;
    }

    /// 設定情報をログに出力
    pub fn display(&self) {
        info!("=== アプリケーション設定 ===");
        info!("計算デバイス: {}", self.device_type);
        info!("モデルパス: {}", self.model.model_path);
        info!("データセット: {}", self.model.dataset_dir);
        info!("--- トレーニング設定 ---");
        info!("エポック数: {}", self.training.num_epochs);
        info!("バッチサイズ: {}", self.training.batch_size);
        info!("学習率: {}", self.training.learning_rate);
        info!("シード: {}", self.training.seed);
        info!("学習データ割合: {}", self.training.train_ratio);
        info!("入力サイズ: {}x{}", self.training.image_size, self.training.image_size);
        info!("--- サーバー設定 ---");
        info!("アドレス: {}:{}", self.server.address, self.server.port);
        info!("アップロード先: {}", self.server.upload_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.training.num_epochs, 5);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.training.image_size, 150);
        assert_eq!(config.training.train_ratio, 0.8);
        assert_eq!(config.model.model_path, "model/image_classifier.tar.gz");
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.set_device_type(DeviceType::Wgpu);
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.device_type, DeviceType::Wgpu);
        assert_eq!(config.training.seed, deserialized.training.seed);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"device_type": "Wgpu", "training": {"num_epochs": 10, "batch_size": 4, "learning_rate": 0.01, "seed": 1, "train_ratio": 0.5}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.training.num_epochs, 10);
        assert_eq!(config.training.image_size, 150);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.model.dataset_dir, "dataset");
    }

    #[test]
    fn test_load_or_default_from_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_or_default_from(&path);
        assert_eq!(config.training.num_epochs, 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.set_model_path("other/model.tar.gz".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.model.model_path, "other/model.tar.gz");
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
