//! HTTP surface over the workflow.
//!
//! - `POST  /streaming/upload-video`   multipart field `video`
//! - `PATCH /streaming/process-video`  JSON [`ProcessRequest`]
//! - `GET   /streaming/videos`         catalog listing
//! - `GET   {prefix}/{package}/{*path}` package files

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::{ReaderStream, StreamReader};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::catalog::Package;
use crate::error::{ErrorKind, PackagerError};
use crate::pipeline::{PackageOutcome, PackagingMode};
use crate::workflow::{ProcessRequest, Workflow};

/// Multipart field carrying the video payload
const VIDEO_FIELD: &str = "video";

/// Headroom for multipart framing on top of the payload limit
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorEntry {
    pub error_code: &'static str,
    pub message: String,
}

/// Structured error body
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub errors: Vec<ApiErrorEntry>,
}

pub struct ApiError(PackagerError);

impl From<PackagerError> for ApiError {
    fn from(e: PackagerError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ProbeFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::EngineFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            error!(status = %status, error = %self.0, "Request failed");
        }

        let body = ApiErrorBody {
            errors: vec![ApiErrorEntry {
                error_code: kind.code(),
                message: self.0.to_string(),
            }],
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    #[serde(default)]
    pub extract_audio_tracks: bool,
}

/// Build the application router
pub fn router(workflow: Arc<Workflow>) -> Router {
    let storage = &workflow.config().storage;
    let body_limit = storage.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let files_route = format!("{}/:package/*path", storage.public_prefix.trim_end_matches('/'));

    Router::new()
        .route(
            "/streaming/upload-video",
            post(upload_video).layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX))),
        )
        .route("/streaming/process-video", patch(process_video))
        .route("/streaming/videos", get(list_videos))
        .route(&files_route, get(serve_file))
        .layer(TraceLayer::new_for_http())
        .with_state(workflow)
}

/// Bind and serve until the process is stopped
pub async fn serve(workflow: Arc<Workflow>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(workflow)).await?;
    Ok(())
}

async fn upload_video(
    State(workflow): State<Arc<Workflow>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<PackageOutcome>, ApiError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        PackagerError::Validation(format!("Malformed upload: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| PackagerError::Validation("No file name received".to_string()))?;

        let body = Box::pin(StreamReader::new(field.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.body_text())
        })));
        let mode = PackagingMode::from_flag(params.extract_audio_tracks);
        let outcome = workflow.ingest_upload(&file_name, body, mode).await?;
        return Ok(Json(outcome));
    }

    Err(PackagerError::Validation("No file received".to_string()).into())
}

async fn process_video(
    State(workflow): State<Arc<Workflow>>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<PackageOutcome>, ApiError> {
    let Json(request) = payload.map_err(|e| PackagerError::Validation(e.body_text()))?;
    let outcome = workflow.process_existing(&request).await?;
    Ok(Json(outcome))
}

async fn list_videos(State(workflow): State<Arc<Workflow>>) -> Result<Json<Vec<Package>>, ApiError> {
    Ok(Json(workflow.list_packages().await?))
}

async fn serve_file(
    State(workflow): State<Arc<Workflow>>,
    Path((package, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let served = workflow.fetch(&package, &path).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, served.content_type)
        .header(header::CONTENT_LENGTH, served.len)
        .body(Body::from_stream(ReaderStream::new(served.file)))
        .map_err(|e| PackagerError::Io(std::io::Error::other(e)))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::media::MockMediaEngine;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> Router {
        app_with(dir, MockMediaEngine::new(), Config::default().storage.max_upload_bytes)
    }

    fn app_with(dir: &std::path::Path, engine: MockMediaEngine, max_upload_bytes: u64) -> Router {
        let mut config = Config::default();
        config.storage.content_root = dir.join("hls");
        config.storage.upload_dir = Some(dir.join("uploads"));
        config.storage.max_upload_bytes = max_upload_bytes;
        router(Arc::new(Workflow::with_engine(config, Arc::new(engine))))
    }

    /// Engine that accepts every run and writes the outputs it names
    fn writing_engine(audio_streams: usize) -> MockMediaEngine {
        let mut engine = MockMediaEngine::new();
        engine
            .expect_probe()
            .returning(move |_| Ok(crate::media::StreamProbe::with_audio_streams(audio_streams)));
        engine.expect_run().returning(|cmd| {
            for output in &cmd.outputs {
                std::fs::write(output, "#EXTM3U\n").unwrap();
            }
            Ok(())
        });
        engine
    }

    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, Vec<u8>)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(b"--XBOUNDARY\r\n");
            let disposition = match file_name {
                Some(file_name) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    name, file_name
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--XBOUNDARY--\r\n");

        Request::post(uri)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    fn uploads_left(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir.join("uploads")).map(|d| d.count()).unwrap_or(0)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::EngineFailure), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError(PackagerError::Conflict("Package 'movie' was already uploaded".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["errorCode"], "Conflict");
        assert!(body["errors"][0]["message"].as_str().unwrap().contains("movie"));
    }

    #[tokio::test]
    async fn test_list_videos_empty() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/streaming/videos").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_serve_file_with_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("hls/movie");
        std::fs::create_dir_all(package.join("audio_track_1")).unwrap();
        std::fs::write(package.join("playlist.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(package.join("audio_track_1/playlist0.ts"), "segment").unwrap();

        let response = app(dir.path())
            .oneshot(
                Request::get("/hls/movie/audio_track_1/playlist0.ts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-typescript"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"segment");
    }

    #[tokio::test]
    async fn test_serve_file_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hls/movie")).unwrap();
        std::fs::write(dir.path().join("hls/movie/playlist.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(dir.path().join("secret"), "secret").unwrap();

        let response = app(dir.path())
            .oneshot(
                Request::get("/hls/movie/%2E%2E/%2E%2E/secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_process_video_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(
                Request::patch("/streaming/process-video")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"extractAudioTracks": true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["errorCode"], "ValidationError");
    }

    #[tokio::test]
    async fn test_process_video_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("movie.mov");
        std::fs::write(&source, b"video").unwrap();

        let response = app(dir.path())
            .oneshot(
                Request::patch("/streaming/process-video")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "filePath": source }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("hls").exists());
    }

    #[tokio::test]
    async fn test_upload_without_video_field() {
        let dir = tempfile::tempdir().unwrap();
        let body = "--XBOUNDARY\r\n\
                    Content-Disposition: form-data; name=\"other\"\r\n\r\n\
                    value\r\n\
                    --XBOUNDARY--\r\n";

        let response = app(dir.path())
            .oneshot(
                Request::post("/streaming/upload-video")
                    .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_video_packages_copy_through() {
        let dir = tempfile::tempdir().unwrap();
        let request = multipart_request(
            "/streaming/upload-video",
            &[("video", Some("movie.mp4"), b"video bytes".to_vec())],
        );

        let response = app_with(dir.path(), writing_engine(2), 1024)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["name"], "movie");
        assert_eq!(body["mode"], "CopyThrough");
        assert_eq!(body["audioTracks"], 0);
        assert_eq!(body["sourceDeleted"], false);

        assert!(dir.path().join("hls/movie/playlist.m3u8").is_file());
        assert_eq!(uploads_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_video_extracts_audio_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let request = multipart_request(
            "/streaming/upload-video?extractAudioTracks=true",
            &[
                ("title", None, b"ignored".to_vec()),
                ("video", Some("show.mkv"), b"video bytes".to_vec()),
            ],
        );

        let response = app_with(dir.path(), writing_engine(2), 1024)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["mode"], "TrackSplit");
        assert_eq!(body["audioTracks"], 2);

        let package = dir.path().join("hls/show");
        assert!(package.join("audio_track_1/playlist.m3u8").is_file());
        assert!(package.join("audio_track_2/playlist.m3u8").is_file());
        assert!(!package.join("audio_track_1.mp3").exists());
    }

    #[tokio::test]
    async fn test_upload_video_over_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockMediaEngine::new();
        engine.expect_probe().never();
        engine.expect_run().never();

        let request = multipart_request(
            "/streaming/upload-video",
            &[("video", Some("movie.mp4"), vec![0u8; 64])],
        );
        let response = app_with(dir.path(), engine, 16).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("hls/movie").exists());
        assert_eq!(uploads_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_body_over_request_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockMediaEngine::new();
        engine.expect_probe().never();
        engine.expect_run().never();

        // The payload itself fits; the padding field pushes the request past
        // the route's body limit.
        let request = multipart_request(
            "/streaming/upload-video",
            &[
                ("padding", None, vec![b'x'; (MULTIPART_OVERHEAD as usize) + 1024]),
                ("video", Some("movie.mp4"), vec![0u8; 8]),
            ],
        );
        let response = app_with(dir.path(), engine, 16).oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
        assert!(!dir.path().join("hls/movie").exists());
        assert_eq!(uploads_left(dir.path()), 0);
    }
}
