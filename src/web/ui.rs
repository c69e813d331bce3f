use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use std::path::Path as FsPath;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::files::{safe_file_name, save_upload, send_file};
use super::form::FormData;
use super::{flash, pages, run_job, AppState, Job};
use crate::image_processing::{list_operations, OperationKind};
use crate::utils::is_allowed_image;

/// Upload form; pending flash messages are shown once and cleared
pub async fn index(headers: HeaderMap) -> Response {
    let messages = flash::take(&headers);
    let html = Html(pages::index(&list_operations(), &messages));
    if messages.is_empty() {
        html.into_response()
    } else {
        (AppendHeaders([(SET_COOKIE, flash::clear_cookie())]), html).into_response()
    }
}

/// Form submission: store the upload, run the operation, redirect to the result
pub async fn process(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let Ok(multipart) = multipart else {
        warn!("form submission without a multipart body");
        return flash::redirect("/", "No file part provided");
    };

    let form = match FormData::read(multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!(error = %e, "unreadable form submission");
            return flash::redirect("/", format!("Invalid upload: {}", e));
        }
    };

    let Some(image) = form.image.as_ref() else {
        return flash::redirect("/", "No file part provided");
    };
    if image.filename.is_empty() {
        return flash::redirect("/", "No selected file");
    }
    if !is_allowed_image(FsPath::new(&image.filename)) {
        warn!(filename = %image.filename, "rejected upload with unsupported extension");
        return flash::redirect("/", "Unsupported file type");
    }

    let id = Uuid::new_v4().to_string();
    let config = &state.config;
    let input = match save_upload(&config.upload_folder, &id, &image.filename, &image.data).await {
        Ok(path) => path,
        Err(e) => {
            error!(error = %e, "failed to store upload");
            return flash::redirect("/", format!("Processing failed: {}", e));
        }
    };

    let default_operation: &'static str = OperationKind::Grayscale.into();
    let job = Job {
        input,
        output: config.results_folder.join(format!("{}.png", id)),
        operation: form.field("operation").unwrap_or(default_operation).to_string(),
        params: form.params_except(&["operation"]),
    };
    info!(%id, operation = %job.operation, "processing form upload");

    match run_job(&state, job).await {
        Ok(_) => Redirect::to(&format!("/result/{}", id)).into_response(),
        Err(e) => {
            error!(%id, error = %e, "processing failed");
            flash::redirect("/", format!("Processing failed: {}", e))
        }
    }
}

pub async fn result(State(state): State<AppState>, Path(result_id): Path<String>) -> Response {
    let filename = format!("{}.png", result_id);
    let exists = safe_file_name(&filename)
        .map(|name| state.config.results_folder.join(name).is_file())
        .unwrap_or(false);

    if !exists {
        return flash::redirect("/", "Result not found");
    }
    Html(pages::result(&result_id, &format!("/results/{}", filename))).into_response()
}

pub async fn result_file(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    send_file(&state.config.results_folder, &filename, false).await
}

pub async fn upload_file(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    send_file(&state.config.upload_folder, &filename, false).await
}

pub async fn download(State(state): State<AppState>, Path(result_id): Path<String>) -> Response {
    send_file(&state.config.results_folder, &format!("{}.png", result_id), true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::*;
    use axum::body::Body;
    use axum::http::header::{CONTENT_DISPOSITION, COOKIE, LOCATION};
    use axum::http::{HeaderValue, Request, StatusCode};

    fn flash_of(response: &Response) -> Vec<String> {
        let mut headers = HeaderMap::new();
        let set = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        let pair = set.split(';').next().unwrap();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        flash::take(&headers)
    }

    fn location(response: &Response) -> &str {
        response.headers().get(LOCATION).unwrap().to_str().unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_index_renders_operations() {
        let (_dir, state) = test_state();
        let response = send(&state, get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("face_detect"));
        assert!(html.contains("action=\"/process\""));
    }

    #[tokio::test]
    async fn test_index_shows_and_clears_flash() {
        let (_dir, state) = test_state();
        let set = flash::set_cookie(&["Result not found".to_string()]);
        let request = Request::builder()
            .uri("/")
            .header(COOKIE, set.split(';').next().unwrap())
            .body(Body::empty())
            .unwrap();
        let response = send(&state, request).await;
        let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(cleared.contains("Max-Age=0"));
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("Result not found"));
    }

    #[tokio::test]
    async fn test_upload_redirects_to_result() {
        let (dir, state) = test_state();
        let png = png_bytes();
        let request = multipart_request(
            "/process",
            &[
                Part::File { name: "image", filename: "photo.png", data: &png },
                Part::Text("operation", "blur"),
                Part::Text("ksize", "4"),
            ],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let target = location(&response).to_string();
        let id = target.strip_prefix("/result/").unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(dir.path().join("uploads").join(format!("{}.png", id)).is_file());
        assert!(dir.path().join("results").join(format!("{}.png", id)).is_file());

        let page = send(&state, get(&target)).await;
        assert_eq!(page.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(page).await).unwrap();
        assert!(html.contains(&format!("/results/{}.png", id)));

        let download = send(&state, get(&format!("/download/{}", id))).await;
        assert_eq!(download.status(), StatusCode::OK);
        let disposition = download.headers().get(CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        assert!(disposition.starts_with("attachment"));

        let raw = send(&state, get(&format!("/results/{}.png", id))).await;
        assert_eq!(raw.headers().get("content-type").unwrap(), "image/png");
        let uploaded = send(&state, get(&format!("/uploads/{}.png", id))).await;
        assert_eq!(body_bytes(uploaded).await, png);
    }

    #[tokio::test]
    async fn test_same_upload_twice_gets_new_id_and_same_bytes() {
        let (dir, state) = test_state();
        let png = png_bytes();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let request = multipart_request(
                "/process",
                &[
                    Part::File { name: "image", filename: "photo.png", data: &png },
                    Part::Text("operation", "smooth_bilateral"),
                ],
            );
            let response = send(&state, request).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            ids.push(location(&response).trim_start_matches("/result/").to_string());
        }

        assert_ne!(ids[0], ids[1]);
        let result = |id: &str| std::fs::read(dir.path().join("results").join(format!("{}.png", id))).unwrap();
        assert_eq!(result(&ids[0]), result(&ids[1]));
    }

    #[tokio::test]
    async fn test_operation_defaults_to_grayscale() {
        let (dir, state) = test_state();
        let png = png_bytes();
        let request = multipart_request(
            "/process",
            &[Part::File { name: "image", filename: "photo.png", data: &png }],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let id = location(&response).trim_start_matches("/result/").to_string();

        let saved = image::open(dir.path().join("results").join(format!("{}.png", id))).unwrap().to_rgb8();
        assert!(saved.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }

    #[tokio::test]
    async fn test_form_rejections() {
        let (_dir, state) = test_state();
        let png = png_bytes();

        let cases: Vec<(Vec<Part<'_>>, &str)> = vec![
            (vec![Part::Text("operation", "blur")], "No file part provided"),
            (
                vec![Part::File { name: "image", filename: "", data: b"" }],
                "No selected file",
            ),
            (
                vec![Part::File { name: "image", filename: "anim.gif", data: &png }],
                "Unsupported file type",
            ),
        ];

        for (parts, expected) in cases {
            let response = send(&state, multipart_request("/process", &parts)).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/");
            assert_eq!(flash_of(&response), vec![expected.to_string()]);
        }
    }

    #[tokio::test]
    async fn test_failed_processing_flashes_error() {
        let (_dir, state) = test_state();
        let png = png_bytes();
        let request = multipart_request(
            "/process",
            &[
                Part::File { name: "image", filename: "photo.png", data: &png },
                Part::Text("operation", "sharpen"),
            ],
        );
        let response = send(&state, request).await;
        assert_eq!(location(&response), "/");
        assert_eq!(
            flash_of(&response),
            vec!["Processing failed: Unsupported operation: sharpen".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_result_and_missing_files() {
        let (_dir, state) = test_state();
        let response = send(&state, get("/result/does-not-exist")).await;
        assert_eq!(location(&response), "/");
        assert_eq!(flash_of(&response), vec!["Result not found".to_string()]);

        let response = send(&state, get("/results/nothing.png")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&state, get("/uploads/..%2Fsecret.png")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&state, get("/download/nothing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
