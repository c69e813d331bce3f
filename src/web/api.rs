use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::files::save_upload;
use super::form::FormData;
use super::{run_job, ApiError, AppState, Job};
use crate::image_processing::{list_operations, OperationDescriptor, RawParams};
use crate::utils::is_allowed_image;

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub result_path: String,
    pub local_result_filename: String,
}

/// What a request asked for, before anything is validated
#[derive(Debug, Default)]
struct ProcessRequest {
    image_path: Option<PathBuf>,
    operation: Option<String>,
    params: RawParams,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn operations() -> Json<Vec<OperationDescriptor>> {
    Json(list_operations())
}

/// Process an image given either as a multipart upload or as a server-side
/// path in a JSON body
pub async fn process(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ProcessResponse>, ApiError> {
    let base_url = base_url(&state, request.headers());

    let parsed = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        from_multipart(&state, multipart).await?
    } else {
        let limit = state.config.max_content_length;
        let body = axum::body::to_bytes(request.into_body(), limit)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;
        from_json(&body)?
    };

    let (Some(input), Some(operation)) = (parsed.image_path, parsed.operation) else {
        return Err(ApiError::BadRequest("image or operation missing".to_string()));
    };

    let filename = format!("{}.png", Uuid::new_v4());
    let job = Job {
        input,
        output: state.config.results_folder.join(&filename),
        operation,
        params: parsed.params,
    };
    info!(input = %job.input.display(), operation = %job.operation, "processing API request");
    run_job(&state, job).await?;

    Ok(Json(ProcessResponse {
        result_path: format!("{}/results/{}", base_url, filename),
        local_result_filename: filename,
    }))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Scheme and authority for absolute result URLs
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.public_base_url {
        return url.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.bind_address());
    format!("http://{}", host)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn params_from_object(object: Map<String, Value>) -> RawParams {
    object.into_iter().collect()
}

async fn from_multipart(state: &AppState, multipart: Multipart) -> Result<ProcessRequest, ApiError> {
    let form = FormData::read(multipart)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let params = match non_empty(form.field("params")) {
        Some(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(object)) => params_from_object(object),
            Ok(_) => RawParams::new(),
            Err(e) => return Err(ApiError::BadRequest(format!("Malformed params JSON: {}", e))),
        },
        None => RawParams::new(),
    };

    // Uploads with a disallowed name are ignored, as if no file had been sent
    let mut image_path = None;
    if let Some(image) = form.image.as_ref().filter(|i| is_allowed_image(Path::new(&i.filename))) {
        let id = Uuid::new_v4().to_string();
        let path = save_upload(&state.config.upload_folder, &id, &image.filename, &image.data)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;
        image_path = Some(path);
    } else if form.image.is_some() {
        warn!("ignoring API upload with an unsupported file name");
    }

    Ok(ProcessRequest {
        image_path,
        operation: non_empty(form.field("operation")),
        params,
    })
}

fn from_json(body: &[u8]) -> Result<ProcessRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProcessRequest::default());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed JSON body: {}", e)))?;
    let Value::Object(mut object) = value else {
        return Ok(ProcessRequest::default());
    };

    let params = match object.remove("params") {
        Some(Value::Object(params)) => params_from_object(params),
        _ => RawParams::new(),
    };
    Ok(ProcessRequest {
        image_path: non_empty(object.get("image_path").and_then(Value::as_str)).map(PathBuf::from),
        operation: non_empty(object.get("operation").and_then(Value::as_str)),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processing::face_detection::CASCADE_FILE_NAME;
    use crate::web::test_support::*;
    use axum::body::Body;
    use axum::http::StatusCode;

    fn json_request(body: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/process")
            .header(HOST, "localhost:5000")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_operations_endpoint() {
        let (_dir, state) = test_state();
        let request = axum::http::Request::builder()
            .uri("/api/operations")
            .body(Body::empty())
            .unwrap();
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let ops = body_json(response).await;
        let ops = ops.as_array().unwrap();
        assert_eq!(ops.len(), 17);
        assert_eq!(ops[0]["name"], "grayscale");
        assert_eq!(ops[1]["params"][0]["type"], "int");
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = test_state();
        let request = axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap();
        let body = body_json(send(&state, request).await).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_image_and_operation_is_bad_request() {
        let (_dir, state) = test_state();

        let response = send(&state, json_request("{}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "image or operation missing");

        let response = send(&state, multipart_request("/api/process", &[Part::Text("other", "1")])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await.get("error").is_some());

        let response = send(&state, json_request(r#"{"operation": "blur"}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let (_dir, state) = test_state();
        let response = send(&state, json_request("{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].as_str().unwrap().starts_with("Malformed JSON"));
    }

    #[tokio::test]
    async fn test_multipart_upload_succeeds() {
        let (dir, state) = test_state();
        let png = png_bytes();
        let request = multipart_request(
            "/api/process",
            &[
                Part::File { name: "image", filename: "in.png", data: &png },
                Part::Text("operation", "resize"),
                Part::Text("params", r#"{"scale": 0.5}"#),
            ],
        );
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let filename = body["local_result_filename"].as_str().unwrap();
        assert_eq!(
            body["result_path"],
            format!("http://example.test:5000/results/{}", filename)
        );
        let saved = image::open(dir.path().join("results").join(filename)).unwrap();
        assert_eq!((saved.width(), saved.height()), (16, 12));
    }

    #[tokio::test]
    async fn test_repeated_upload_returns_distinct_identical_results() {
        let (dir, state) = test_state();
        let png = png_bytes();
        let mut names = Vec::new();
        for _ in 0..2 {
            let request = multipart_request(
                "/api/process",
                &[
                    Part::File { name: "image", filename: "in.png", data: &png },
                    Part::Text("operation", "canny"),
                ],
            );
            let response = send(&state, request).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            names.push(body["local_result_filename"].as_str().unwrap().to_string());
        }

        assert_ne!(names[0], names[1]);
        let first = std::fs::read(dir.path().join("results").join(&names[0])).unwrap();
        let second = std::fs::read(dir.path().join("results").join(&names[1])).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_oversized_parameters_fail_and_server_keeps_serving() {
        let (dir, state) = test_state();
        let input = dir.path().join("local.png");
        std::fs::write(&input, png_bytes()).unwrap();

        let huge = json!({
            "image_path": input.to_string_lossy(),
            "operation": "resize",
            "params": {"scale": "100000"},
        });
        let response = send(&state, json_request(&huge.to_string())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("resize"));

        let normal = json!({"image_path": input.to_string_lossy(), "operation": "resize"});
        let response = send(&state, json_request(&normal.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_json_with_server_path() {
        let (dir, state) = test_state();
        let input = dir.path().join("local.png");
        std::fs::write(&input, png_bytes()).unwrap();

        let body = json!({
            "image_path": input.to_string_lossy(),
            "operation": "threshold",
            "params": {"thresh": 100, "maxval": "200"},
        });
        let response = send(&state, json_request(&body.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["result_path"].as_str().unwrap().starts_with("http://localhost:5000/results/"));
    }

    #[tokio::test]
    async fn test_dispatcher_failures_are_server_errors() {
        let (dir, state) = test_state();
        let input = dir.path().join("local.png");
        std::fs::write(&input, png_bytes()).unwrap();

        let unsupported = json!({"image_path": input.to_string_lossy(), "operation": "sharpen"});
        let response = send(&state, json_request(&unsupported.to_string())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Unsupported operation: sharpen");

        assert!(!dir.path().join(CASCADE_FILE_NAME).exists());
        let face = json!({"image_path": input.to_string_lossy(), "operation": "face_detect"});
        let response = send(&state, json_request(&face.to_string())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(message.contains("haar_face.xml"));

        let missing = json!({"image_path": dir.path().join("nope.png").to_string_lossy(), "operation": "blur"});
        let response = send(&state, json_request(&missing.to_string())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_public_base_url_overrides_host() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = crate::config::Config::with_base_dir(dir.path());
        config.public_base_url = Some("https://images.example.com".to_string());
        config.ensure_directories().unwrap();
        let state = AppState::new(config);

        let input = dir.path().join("local.png");
        std::fs::write(&input, png_bytes()).unwrap();
        let body = json!({"image_path": input.to_string_lossy(), "operation": "bitwise_not"});
        let response = send(&state, json_request(&body.to_string())).await;
        let body = body_json(response).await;
        assert!(body["result_path"]
            .as_str()
            .unwrap()
            .starts_with("https://images.example.com/results/"));
    }
}
