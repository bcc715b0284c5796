//! HTMLページの描画

use crate::classifier::Prediction;

const TITLE: &str = "Human Face Classifier";

/// ページに表示する結果
pub enum PageResult<'a> {
    /// 予測成功: アップロード画像と予測結果
    Prediction {
        image_data_uri: &'a str,
        prediction: &'a Prediction,
    },
    /// エラーメッセージ
    Error(&'a str),
}

/// HTML特殊文字をエスケープ
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 予測結果の1行表示（例: "Prediction: cat with 87.50% confidence"）
pub fn prediction_line(prediction: &Prediction) -> String {
    format!(
        "Prediction: <strong>{}</strong> with {}% confidence",
        escape_html(&prediction.label),
        prediction.confidence_text()
    )
}

/// アップロードフォームと結果を含むページ全体を描画
pub fn render(result: Option<PageResult<'_>>) -> String {
    let body = match result {
        None => String::new(),
        Some(PageResult::Prediction {
            image_data_uri,
            prediction,
        }) => format!(
            r#"<figure><img src="{}" alt="Uploaded Image"><figcaption>Uploaded Image</figcaption></figure>
<p class="success">{}</p>"#,
            image_data_uri,
            prediction_line(prediction)
        ),
        Some(PageResult::Error(message)) => {
            format!(r#"<p class="error">{}</p>"#, escape_html(message))
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 640px; margin: 2rem auto; }}
img {{ max-width: 100%; }}
.success {{ background: #e6f4ea; padding: 0.75rem; }}
.error {{ background: #fce8e6; padding: 0.75rem; }}
</style>
</head>
<body>
<h1>{title}</h1>
<form method="post" action="/" enctype="multipart/form-data">
<label for="image">Upload a face image</label>
<input type="file" id="image" name="image" accept=".jpg,.jpeg,.png" required>
<button type="submit">Classify</button>
</form>
{body}
</body>
</html>
"#,
        title = TITLE,
        body = body
    )
}
