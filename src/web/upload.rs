//! アップロード画像の一時ファイル管理
//!
//! リクエストごとに一意な名前のファイルを割り当て、ガードの破棄時に削除します。

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// リクエスト単位のアップロードファイル
#[derive(Debug)]
pub struct UploadGuard {
    path: PathBuf,
}

impl UploadGuard {
    /// `<upload_dir>/<uuid>.<extension>` を割り当てる（ファイルはまだ作らない）
    pub fn new(upload_dir: &Path, extension: &str) -> io::Result<Self> {
        std::fs::create_dir_all(upload_dir)?;
        let path = upload_dir.join(format!("{}.{}", Uuid::new_v4(), extension));
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 画像の MIME タイプ（拡張子から判定）
    pub fn mime_type(&self) -> &'static str {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("png") => "image/png",
            _ => "image/jpeg",
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("アップロードファイルを削除しました: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("アップロードファイルの削除に失敗しました {}: {}", self.path.display(), e),
        }
    }
}
