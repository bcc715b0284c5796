//! HTTPハンドラ

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{error, info, warn};
use rocket::form::{Form, FromForm};
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::Serialize;
use std::sync::Arc;

use crate::classifier::supported_extension;
use crate::error::ClassifierError;
use crate::web::page::{self, PageResult};
use crate::web::upload::UploadGuard;
use crate::web::AppState;

/// アップロードフォーム
#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub image: TempFile<'r>,
}

/// ヘルスチェックのレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub labels: Vec<String>,
}

fn error_page(status: Status, message: &str) -> (Status, RawHtml<String>) {
    (status, RawHtml(page::render(Some(PageResult::Error(message)))))
}

/// アップロードフォーム
#[get("/")]
pub fn index() -> RawHtml<String> {
    RawHtml(page::render(None))
}

/// 画像をアップロードして分類結果を表示
#[post("/", data = "<form>")]
pub async fn upload(mut form: Form<UploadForm<'_>>, state: &State<AppState>) -> (Status, RawHtml<String>) {
    let raw_name = form
        .image
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default();

    // 拡張子チェックは分類器に渡す前に行う
    let extension = match supported_extension(&raw_name) {
        Some(ext) => ext,
        None => {
            warn!("対応していないファイルを拒否しました: {:?}", raw_name);
            let err = ClassifierError::UnsupportedExtension(raw_name);
            return error_page(Status::UnsupportedMediaType, &err.to_string());
        }
    };

    let guard = match UploadGuard::new(&state.upload_dir, &extension) {
        Ok(guard) => guard,
        Err(e) => {
            error!("アップロード先を準備できません: {}", e);
            return error_page(Status::InternalServerError, "アップロードの保存に失敗しました");
        }
    };

    if let Err(e) = form.image.copy_to(guard.path()).await {
        error!("アップロードの保存に失敗しました {}: {}", guard.path().display(), e);
        return error_page(Status::InternalServerError, "アップロードの保存に失敗しました");
    }

    let image_bytes = match tokio::fs::read(guard.path()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("アップロードの読み込みに失敗しました {}: {}", guard.path().display(), e);
            return error_page(Status::InternalServerError, "アップロードの読み込みに失敗しました");
        }
    };

    // 推論はブロッキング処理のため専用スレッドで実行
    let classifier = Arc::clone(&state.classifier);
    let path = guard.path().to_path_buf();
    let result = tokio::task::spawn_blocking(move || classifier.predict_image(&path)).await;

    match result {
        Ok(Ok(prediction)) => {
            info!(
                "予測: {} ({}%) - {}",
                prediction.label,
                prediction.confidence_text(),
                raw_name
            );
            let image_data_uri = format!("data:{};base64,{}", guard.mime_type(), STANDARD.encode(&image_bytes));
            let html = page::render(Some(PageResult::Prediction {
                image_data_uri: &image_data_uri,
                prediction: &prediction,
            }));
            (Status::Ok, RawHtml(html))
        }
        Ok(Err(e)) => {
            warn!("予測に失敗しました: {}", e);
            error_page(Status::UnprocessableEntity, &e.to_string())
        }
        Err(e) => {
            error!("推論スレッドエラー: {}", e);
            error_page(Status::InternalServerError, "推論処理が異常終了しました")
        }
    }
}

/// ヘルスチェック
#[get("/health")]
pub fn health(state: &State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        labels: state.classifier.class_labels().to_vec(),
    })
}
