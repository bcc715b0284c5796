//! 分類処理のエラー定義

use std::path::PathBuf;
use thiserror::Error;

/// 予測・アップロード処理で発生するエラー
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// 画像ファイルを読み込めない
    #[error("画像ファイルを読み込めません {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 画像をデコードできない
    #[error("画像のデコードに失敗しました {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// モデルバンドルの読み込み失敗
    #[error("モデルの読み込みに失敗しました: {0}")]
    ModelLoad(String),

    /// モデル出力数とラベル数の不一致
    #[error("モデルの出力数 ({outputs}) とクラスラベル数 ({labels}) が一致しません")]
    LabelMismatch { outputs: usize, labels: usize },

    /// 推論結果のテンソル取得失敗
    #[error("推論に失敗しました: {0}")]
    Inference(String),

    /// 対応していないファイル形式
    #[error("対応していないファイル形式です: {0} (jpg, jpeg, png のみ)")]
    UnsupportedExtension(String),
}

impl ClassifierError {
    /// `image::open` のエラーを分類して変換
    pub fn from_image_error(path: &std::path::Path, err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(source) => ClassifierError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => ClassifierError::ImageDecode {
                path: path.to_path_buf(),
                source: other,
            },
        }
    }
}
