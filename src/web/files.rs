use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::{dotted_extension, sanitize_filename};

/// Accept a bare file name only; anything that could leave the directory is refused
pub fn safe_file_name(name: &str) -> Option<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.split('.').all(str::is_empty);
    (!invalid).then_some(name)
}

/// Content type guessed from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Store an upload as `<dir>/<id><ext>`, with the extension taken from the
/// sanitized client file name
pub async fn save_upload(dir: &Path, id: &str, client_name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    let ext = dotted_extension(&sanitize_filename(client_name));
    let path = dir.join(format!("{}{}", id, ext));
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, data).await?;
    debug!(path = %path.display(), bytes = data.len(), "stored upload");
    Ok(path)
}

/// Stream a stored file, optionally as a download. Missing files and unsafe
/// names are a plain 404.
pub async fn send_file(dir: &Path, name: &str, as_attachment: bool) -> Response {
    let Some(name) = safe_file_name(name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let path = dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = content_type_for(&path);
            if as_attachment {
                let disposition = format!("attachment; filename=\"{}\"", name);
                (
                    [(CONTENT_TYPE, content_type.to_string()), (CONTENT_DISPOSITION, disposition)],
                    bytes,
                )
                    .into_response()
            } else {
                ([(CONTENT_TYPE, content_type.to_string())], bytes).into_response()
            }
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
