use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::settings;

use super::client::render_camera_page;
use super::models::{
    ErrorResponse, LanguagesResponse, OcrResponse, StartCameraQuery, StatusResponse,
    TranslateRequest, TranslateResponse,
};
use super::state::ServerState;
use super::translate::{OcrForm, ServerError, ocr_request, translate_request};
use super::util::origin_matches;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, addr: Option<String>) -> Result<()> {
    let pipeline = crate::build_pipeline(&settings)?;
    let camera = crate::build_camera(&settings, pipeline.clone(), None)?;
    let camera_page = render_camera_page(&settings.translation.target_lang)?;
    let addr = addr.unwrap_or_else(|| settings.server.addr.clone());
    let state = Arc::new(ServerState {
        settings,
        pipeline,
        camera,
        camera_page,
    });
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!("server: listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    let upload_limit = state.settings.server.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/ocr", post(ocr))
        .route("/ocr/", post(ocr))
        .route("/translate", post(translate))
        .route("/translate/", post(translate))
        .route("/start-camera", get(start_camera))
        .route("/stop-camera", get(stop_camera))
        .route("/camera-status", get(camera_status))
        .route("/camera", get(camera_page))
        .route("/camera/frame", get(camera_frame))
        .route("/languages", get(languages))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(
    State(state): State<Arc<ServerState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response<Body>, StatusCode> {
    let origin = req.headers().get(header::ORIGIN).cloned();
    let allowed = state.settings.server.allowed_origin.as_deref();
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut(), allowed, origin.as_ref());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut(), allowed, origin.as_ref());
    Ok(response)
}

/// Echoes the request origin when it is the configured one. Without a
/// configured origin any origin is allowed, without credentials.
fn apply_cors_headers(
    headers: &mut HeaderMap,
    allowed: Option<&str>,
    origin: Option<&HeaderValue>,
) {
    match allowed {
        Some(allowed) => {
            let Some(origin) = origin else {
                return;
            };
            let matches = origin
                .to_str()
                .map(|value| origin_matches(allowed, value))
                .unwrap_or(false);
            if !matches {
                return;
            }
            headers.insert("access-control-allow-origin", origin.clone());
            headers.insert(
                "access-control-allow-credentials",
                HeaderValue::from_static("true"),
            );
            headers.insert(header::VARY, HeaderValue::from_static("origin"));
        }
        None => {
            headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        }
    }
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

fn api_error(err: ServerError) -> ApiError {
    (err.status, Json(ErrorResponse { error: err.message }))
}

fn task_failed(err: tokio::task::JoinError) -> ApiError {
    api_error(ServerError::internal(format!(
        "server task failed: {}",
        err
    )))
}

fn multipart_error(err: MultipartError) -> ServerError {
    ServerError {
        status: err.status(),
        message: err.body_text(),
    }
}

async fn read_ocr_form(multipart: &mut Multipart) -> Result<OcrForm, ServerError> {
    let mut form = OcrForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
            "target_lang" => form.target_lang = Some(field.text().await.map_err(multipart_error)?),
            "src_lang" => form.src_lang = Some(field.text().await.map_err(multipart_error)?),
            "bbox_conf_threshold" => {
                form.bbox_conf_threshold = Some(field.text().await.map_err(multipart_error)?)
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn ocr(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let form = read_ocr_form(&mut multipart).await.map_err(api_error)?;
    let handle = tokio::runtime::Handle::current();
    let result =
        tokio::task::spawn_blocking(move || handle.block_on(ocr_request(state.as_ref(), form)))
            .await
            .map_err(task_failed)?;
    result.map(Json).map_err(api_error)
}

async fn translate(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        api_error(ServerError {
            status: rejection.status(),
            message: rejection.body_text(),
        })
    })?;
    translate_request(state.as_ref(), payload)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn start_camera(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<StartCameraQuery>,
) -> Json<StatusResponse> {
    let outcome = state.camera.start(query.target_lang.as_deref());
    Json(StatusResponse {
        status: outcome.status_message().to_string(),
    })
}

async fn stop_camera(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let status = if state.camera.request_stop() {
        "Camera stopping"
    } else {
        "Camera not running"
    };
    Json(StatusResponse {
        status: status.to_string(),
    })
}

async fn camera_status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.camera.status())
}

async fn camera_page(State(state): State<Arc<ServerState>>) -> Html<String> {
    Html(state.camera_page.clone())
}

async fn camera_frame(State(state): State<Arc<ServerState>>) -> Result<Response<Body>, ApiError> {
    let Some(frame) = state.camera.latest_frame() else {
        return Err(api_error(ServerError::not_found(
            "no camera frame available",
        )));
    };
    let mut response = Response::new(Body::from((*frame).clone()));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

async fn languages(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<LanguagesResponse>, ApiError> {
    let languages = tokio::task::spawn_blocking(move || state.pipeline.ocr_languages())
        .await
        .map_err(task_failed)?
        .map_err(|err| api_error(ServerError::internal(err.to_string())))?;
    Ok(Json(LanguagesResponse { languages }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::LoopState;
    use crate::server::{test_state, test_state_with_camera};
    use crate::test_util::{FakeCamera, StubProvider, StubRecognizer, png_bytes, token};
    use reqwest::multipart::{Form, Part};
    use std::time::Duration;

    const ALLOWED: &str = "https://image-livetranslator.netlify.app";

    fn state() -> Arc<ServerState> {
        Arc::new(test_state(
            StubRecognizer::with_tokens(vec![]),
            StubProvider::echo(),
        ))
    }

    #[test]
    fn configured_origin_is_echoed_ignoring_trailing_slash() {
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("https://image-livetranslator.netlify.app");
        apply_cors_headers(
            &mut headers,
            Some("https://image-livetranslator.netlify.app/"),
            Some(&origin),
        );
        assert_eq!(headers.get("access-control-allow-origin"), Some(&origin));
        assert_eq!(
            headers
                .get("access-control-allow-credentials")
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }

    #[test]
    fn other_origins_get_no_cors_headers() {
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("https://evil.example");
        apply_cors_headers(
            &mut headers,
            Some("https://image-livetranslator.netlify.app"),
            Some(&origin),
        );
        assert!(headers.is_empty());
    }

    #[test]
    fn unconfigured_origin_allows_any() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers, None, None);
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_camera_twice_reports_already_running() {
        let camera = FakeCamera::endless();
        let opens = camera.opens();
        let state = Arc::new(test_state_with_camera(
            StubRecognizer::with_tokens(vec![]),
            StubProvider::echo(),
            camera,
        ));
        let query = || {
            Query(StartCameraQuery {
                target_lang: Some("fr".to_string()),
            })
        };

        let Json(first) = start_camera(State(state.clone()), query()).await;
        assert!(first.status.starts_with("Camera started"));
        let Json(second) = start_camera(State(state.clone()), query()).await;
        assert_eq!(second.status, "Camera already running");

        for _ in 0..500 {
            if state.camera.status().frames > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(opens.count(), 1);

        let Json(stopped) = stop_camera(State(state.clone())).await;
        assert_eq!(stopped.status, "Camera stopping");
        for _ in 0..500 {
            if state.camera.state() == LoopState::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.camera.state(), LoopState::Idle);
        let Json(again) = stop_camera(State(state.clone())).await;
        assert_eq!(again.status, "Camera not running");
    }

    #[tokio::test]
    async fn frame_endpoint_is_404_without_a_frame() {
        let (status, Json(body)) = camera_frame(State(state())).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "no camera frame available");
    }

    #[tokio::test]
    async fn languages_come_from_the_recognizer() {
        let Json(body) = languages(State(state())).await.expect("languages");
        assert_eq!(body.languages, vec!["eng", "tam"]);
    }

    #[tokio::test]
    async fn translate_handler_maps_errors_to_json() {
        let result = translate(
            State(state()),
            Ok(Json(TranslateRequest {
                text: Some(String::new()),
                target_lang: None,
            })),
        )
        .await;
        let (status, Json(body)) = result.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "No text provided");
    }

    async fn serve(state: ServerState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(Arc::new(state))).await;
        });
        format!("http://{}", addr)
    }

    fn upload(file: Vec<u8>) -> Form {
        let part = Part::bytes(file)
            .file_name("frame.png")
            .mime_str("image/png")
            .expect("mime");
        Form::new().part("file", part)
    }

    fn header<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ocr_upload_over_http() {
        let recognizer =
            StubRecognizer::with_tokens(vec![token(0, "hello", 50.0), token(1, "dim", 20.0)]);
        let languages = recognizer.languages_seen();
        let provider = StubProvider::fixed("bonjour");
        let targets = provider.targets();
        let base = serve(test_state(recognizer, provider)).await;

        let form = upload(png_bytes(64, 32))
            .text("target_lang", "fr")
            .text("src_lang", "tam")
            .text("bbox_conf_threshold", "15");
        let response = reqwest::Client::new()
            .post(format!("{}/ocr/", base))
            .header("origin", ALLOWED)
            .multipart(form)
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            header(&response, "access-control-allow-origin"),
            Some(ALLOWED)
        );

        let body: serde_json::Value = response.json().await.expect("json");
        assert_eq!(body["width"], 64);
        assert_eq!(body["height"], 32);
        let boxes = body["boxes"].as_array().expect("boxes");
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0]["text"], "hello");
        assert_eq!(boxes[0]["translated"], "bonjour");
        assert_eq!(boxes[1]["text"], "dim");
        assert_eq!(languages.snapshot(), vec!["tam"]);
        assert_eq!(targets.snapshot(), vec!["fr", "fr"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ocr_upload_errors_are_json() {
        let mut state = test_state(StubRecognizer::with_tokens(vec![]), StubProvider::echo());
        state.settings.server.max_upload_bytes = 1024;
        let base = serve(state).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/ocr/", base))
            .multipart(upload(b"definitely not an image".to_vec()))
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json().await.expect("json");
        assert!(
            body.error.starts_with("Invalid image file"),
            "{}",
            body.error
        );

        let response = client
            .post(format!("{}/ocr/", base))
            .multipart(upload(vec![0u8; 4096]))
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
        let body: ErrorResponse = response.json().await.expect("json");
        assert!(!body.error.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preflight_is_no_content_with_cors_headers() {
        let base = serve(test_state(
            StubRecognizer::with_tokens(vec![]),
            StubProvider::echo(),
        ))
        .await;
        let response = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{}/ocr/", base))
            .header("origin", ALLOWED)
            .header("access-control-request-method", "POST")
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
        assert_eq!(
            header(&response, "access-control-allow-origin"),
            Some(ALLOWED)
        );
        let methods = header(&response, "access-control-allow-methods").unwrap_or_default();
        assert!(methods.contains("POST"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_translate_body_is_a_json_error() {
        let base = serve(test_state(
            StubRecognizer::with_tokens(vec![]),
            StubProvider::echo(),
        ))
        .await;
        let response = reqwest::Client::new()
            .post(format!("{}/translate/", base))
            .header("content-type", "application/json")
            .body(r#"{"text": 5}"#)
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorResponse = response.json().await.expect("json");
        assert!(body.error.contains("deserialize"), "{}", body.error);
    }
}
