use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use api::rate_limit::RateLimitConfig;
use api::{create_router, AppConfig, AppState, Detectors};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use face_auth::{FaceAuthError, FaceRegion, FaceRegionDetector};
use frame::{GrayImage, Region, VideoFrame};
use futures::StreamExt;
use gaze::pose::{CameraIntrinsics, Pose};
use image::{DynamicImage, ImageFormat, Luma};
use object_screen::{DetectedObject, ObjectDetector, ObjectScreenError};
use serde_json::{json, Value};
use sessions::{hash_password, TeacherAccount};
use tower::ServiceExt;

const PASSWORD: &str = "correct horse";

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit = RateLimitConfig::disabled();
    config.teachers = vec![TeacherAccount {
        username: "alice".into(),
        password_hash: hash_password(PASSWORD).unwrap(),
        display_name: Some("Dr. Alice".into()),
    }];
    config
}

async fn app_with(detectors: impl FnOnce(&AppConfig) -> Detectors) -> (Router, Arc<AppState>) {
    let config = test_config();
    let detectors = detectors(&config);
    let state = Arc::new(AppState::build_with(config, detectors).await.unwrap());
    (create_router(Arc::clone(&state)), state)
}

async fn app() -> (Router, Arc<AppState>) {
    app_with(Detectors::builtin).await
}

fn face_png(seed: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(200, 200, |x, y| Luma([((x * (seed + 2) + y * seed * 7) % 251) as u8]));
    png(img)
}

fn blank_png() -> Vec<u8> {
    png(GrayImage::from_pixel(120, 90, Luma([128])))
}

fn png(img: GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn landmarks(pitch: f64, yaw: f64, roll: f64) -> Vec<[f32; 2]> {
    let pose = Pose {
        pitch: pitch.to_radians(),
        yaw: yaw.to_radians(),
        roll: roll.to_radians(),
        translation: [0.0, 0.0, 1500.0],
    };
    pose.project_model(&CameraIntrinsics::for_frame(640, 480))
        .unwrap()
        .iter()
        .map(|p| [p[0] as f32, p[1] as f32])
        .collect()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_bytes(uri: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_token(mut request: Request<Body>, token: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
    request
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        post_json("/teacher/login", json!({"username": "alice", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn alerts(app: &Router, token: &str, query: &str) -> Vec<Value> {
    let (status, body) = send(app, get(&format!("/alerts{}", query), Some(token))).await;
    assert_eq!(status, StatusCode::OK);
    body["alerts"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app().await;
    let (status, body) = send(&app, get("/api/v1/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["counts"]["alerts"], 0);
    assert_eq!(body["counts"]["enrolled_students"], 0);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (app, _) = app().await;
    let response = app.clone().oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("proctor_audio_queue_depth"));
}

#[tokio::test]
async fn test_detect_head_without_landmark_model() {
    let (app, _) = app().await;
    let (status, body) = send(&app, post_bytes("/detect-head?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["direction"], "No face detected");
    assert_eq!(body["alert"], false);
    assert_eq!(body["yaw"], 0.0);
}

struct FixedLandmarks(Vec<(f32, f32)>);

impl gaze::LandmarkDetector for FixedLandmarks {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<gaze::Landmarks>, gaze::GazeError> {
        Ok(vec![self.0.clone()])
    }
}

#[tokio::test]
async fn test_detect_head_with_landmark_model() {
    let points = landmarks(0.0, 40.0, 0.0).into_iter().map(|[x, y]| (x, y)).collect();
    let (app, _) = app_with(move |config| Detectors {
        landmarks: Arc::new(FixedLandmarks(points)),
        ..Detectors::builtin(config)
    })
    .await;

    let img = GrayImage::from_fn(640, 480, |x, y| Luma([((x + y) % 256) as u8]));
    let (status, body) = send(&app, post_bytes("/detect-head", png(img))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["direction"], "ALERT: Looking Right");
    assert_eq!(body["alert"], true);
    // No session ids, nothing persisted
    assert_eq!(body["logged"], false);
}

#[tokio::test]
async fn test_detect_head_rejects_garbage() {
    let (app, _) = app().await;
    let (status, body) = send(&app, post_bytes("/detect-head", b"not an image".to_vec())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "invalid_image");

    let (status, body) = send(&app, post_bytes("/detect-head", Vec::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_image");
}

#[tokio::test]
async fn test_score_landmarks_logs_gaze_alert() {
    let (app, _) = app().await;
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        post_json(
            "/score-landmarks",
            json!({
                "landmarks": landmarks(0.0, 0.0, 0.0),
                "frame_width": 640,
                "frame_height": 480,
                "student_id": "s1",
                "exam_id": "math",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["direction"], "Looking Forward");
    assert_eq!(body["logged"], false);

    let (status, body) = send(
        &app,
        post_json(
            "/score-landmarks",
            json!({
                "landmarks": landmarks(28.0, 0.0, 0.0),
                "frame_width": 640,
                "frame_height": 480,
                "student_id": "s1",
                "exam_id": "math",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["direction"], "ALERT: Looking Down");
    assert_eq!(body["logged"], true);

    let listed = alerts(&app, &token, "?kind=gaze").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["reason"], json!(["looking_down"]));
    assert_eq!(listed[0]["student_id"], "s1");
}

#[tokio::test]
async fn test_score_landmarks_validation() {
    let (app, _) = app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/score-landmarks",
            json!({"landmarks": [[1.0, 2.0], [3.0, 4.0]], "frame_width": 640, "frame_height": 480}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_landmarks");

    let (status, body) = send(
        &app,
        post_json("/score-landmarks", json!({"landmarks": [], "frame_width": 640, "frame_height": 480})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["direction"], "No face detected");

    let (status, body) = send(&app, post_json("/score-landmarks", json!({"landmarks": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_json");
}

#[tokio::test]
async fn test_log_alert() {
    let (app, _) = app().await;
    let token = login(&app).await;

    let (status, body) = send(&app, post_json("/log-alert", json!({"direction": "ALERT: Looking Left"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_field");

    let (status, body) = send(
        &app,
        post_json(
            "/log-alert",
            json!({"student_id": "s1", "exam_id": "math", "direction": "Looking Sideways"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_direction");

    let (status, body) = send(
        &app,
        post_json(
            "/log-alert",
            json!({"student_id": "s1", "exam_id": "math", "direction": "ALERT: Looking Left", "time": "10:04"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logged"], true);

    let listed = alerts(&app, &token, "").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["kind"], "gaze");
    assert_eq!(listed[0]["raw_metrics"]["time"], "10:04");
}

#[tokio::test]
async fn test_register_and_verify_faces() {
    let (app, state) = app().await;
    let token = login(&app).await;

    let (status, body) = send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", blank_png())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_face");

    let (_, body) = send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(body["status"], "registered");
    assert_eq!(body["label"], 0);
    let (_, body) = send(&app, post_bytes("/register-face?student_id=s2&exam_id=math", face_png(5))).await;
    assert_eq!(body["label"], 1);

    let (_, body) = send(&app, get("/registered-faces", None)).await;
    assert_eq!(body["registered_faces"], json!(["s1", "s2"]));
    assert_eq!(state.faces.store().model().len(), 2);

    let (_, body) = send(&app, post_bytes("/verify-face?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(body["status"], "match");
    assert_eq!(body["logged"], false);

    let (_, body) = send(&app, post_bytes("/verify-face?student_id=s1&exam_id=math", face_png(5))).await;
    assert_eq!(body["status"], "mismatch");
    assert_eq!(body["predicted"], "s2");
    assert_eq!(body["logged"], true);

    let (_, body) = send(&app, post_bytes("/verify-face?student_id=ghost&exam_id=math", face_png(1))).await;
    assert_eq!(body["status"], "not_registered");

    let identity = alerts(&app, &token, "?kind=identity").await;
    assert_eq!(identity.len(), 2);
    assert_eq!(identity[0]["student_id"], "ghost");

    let (status, body) = send(&app, post_bytes("/register-face?exam_id=math", face_png(1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_field");
}

#[tokio::test]
async fn test_identify_faces() {
    let (app, _) = app().await;
    send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", face_png(1))).await;

    let (status, body) = send(&app, post_bytes("/identify-faces", face_png(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["faces"][0]["student"], "s1");

    let (_, body) = send(&app, post_bytes("/identify-faces", blank_png())).await;
    assert_eq!(body["count"], 0);
}

struct TwoFaces;

impl FaceRegionDetector for TwoFaces {
    fn detect(&self, image: &GrayImage) -> Result<Vec<FaceRegion>, FaceAuthError> {
        let half = image.width() as f32 / 2.0;
        let h = image.height() as f32;
        Ok(vec![
            FaceRegion::new(Region::new(0.0, 0.0, half, h), 0.9),
            FaceRegion::new(Region::new(half, 0.0, half, h), 0.8),
        ])
    }
}

#[tokio::test]
async fn test_multiple_faces_gate() {
    let (app, _) = app_with(|config| Detectors {
        faces: Arc::new(TwoFaces),
        ..Detectors::builtin(config)
    })
    .await;
    let token = login(&app).await;

    let (_, body) = send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(body["status"], "multiple_faces");

    let (_, body) = send(&app, post_bytes("/verify-face?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(body["status"], "multiple_faces");
    assert_eq!(body["logged"], true);

    let (_, body) = send(&app, post_bytes("/identify-faces", face_png(1))).await;
    assert_eq!(body["count"], 2);
    assert!(body["faces"][0]["student"].is_null());

    assert_eq!(alerts(&app, &token, "?kind=identity").await.len(), 1);
}

#[tokio::test]
async fn test_verify_after_exam_removal() {
    let (app, state) = app().await;
    send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", face_png(1))).await;
    state
        .faces
        .store()
        .remove_scope(&face_auth::RemovalScope::Exam("math".into()))
        .unwrap();

    let (_, body) = send(&app, post_bytes("/verify-face?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(body["status"], "not_registered");
}

struct Phone;

impl ObjectDetector for Phone {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<DetectedObject>, ObjectScreenError> {
        Ok(vec![
            DetectedObject::new("person", 0.95),
            DetectedObject::new("cell phone", 0.81),
        ])
    }
}

#[tokio::test]
async fn test_object_screening() {
    let (app, _) = app_with(|config| Detectors {
        objects: Arc::new(Phone),
        ..Detectors::builtin(config)
    })
    .await;
    let token = login(&app).await;

    let (status, body) = send(&app, post_bytes("/detect-object?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "forbidden_object");
    assert_eq!(body["objects"], json!(["cell phone"]));
    assert_eq!(body["logged"], true);

    let (_, body) = send(
        &app,
        post_json(
            "/screen-objects",
            json!({"detections": [{"name": "laptop", "confidence": 0.4}, {"label": "book", "confidence": 0.9}]}),
        ),
    )
    .await;
    assert_eq!(body["status"], "clear");

    let listed = alerts(&app, &token, "?kind=object").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["reason"], json!(["cell_phone"]));
}

#[tokio::test]
async fn test_audio_anomaly_pushes_and_logs() {
    let (app, state) = app().await;
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        post_json(
            "/detect-audio-anomaly",
            json!({
                "student_id": "s1",
                "exam_id": "math",
                "audio_features": {"volume_level": 0.60, "frequency_data": [0.1, 0.2], "duration": 1.0}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "anomaly_detected");
    assert_eq!(body["reasons"], json!(["very_high_volume"]));
    assert_eq!(body["logged"], true);

    let (_, body) = send(
        &app,
        post_json(
            "/detect-audio-anomaly",
            json!({"student_id": "s1", "exam_id": "math", "audio_features": {"volume_level": 0.20}}),
        ),
    )
    .await;
    assert_eq!(body["status"], "clear");
    assert_eq!(body["logged"], false);

    assert_eq!(state.audio_events.len(), 2);
    assert_eq!(alerts(&app, &token, "?kind=audio").await.len(), 1);

    let (status, body) = send(
        &app,
        post_json(
            "/detect-audio-anomaly",
            json!({"student_id": "s1", "exam_id": "math", "audio_features": {"volume_level": 2.0}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_audio_features");

    let (status, _) = send(
        &app,
        post_json("/detect-audio-anomaly", json!({"audio_features": {"volume_level": 0.2}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.audio_events.len(), 2);
}

#[tokio::test]
async fn test_audio_stream_delivers_events() {
    let (app, state) = app().await;
    send(
        &app,
        post_json(
            "/detect-audio-anomaly",
            json!({"student_id": "s7", "exam_id": "math", "audio_features": {"volume_level": 0.02}}),
        ),
    )
    .await;

    let response = app.clone().oneshot(get("/api/stream/audio", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/event-stream"
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("event: audio"));
    assert!(text.contains("\"student_id\":\"s7\""));
    assert!(text.contains("low_volume"));
    assert!(state.audio_events.is_empty());
}

#[tokio::test]
async fn test_teacher_sessions() {
    let (app, _) = app().await;

    let (status, body) = send(
        &app,
        post_json("/teacher/login", json!({"username": "alice", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let token = login(&app).await;
    assert_eq!(token.len(), 64);

    let (_, body) = send(&app, get(&format!("/teacher/validate?token={}", token), None)).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["teacher"]["display_name"], "Dr. Alice");

    let (_, body) = send(&app, get("/teacher/validate?token=bogus", None)).await;
    assert_eq!(body["valid"], false);

    let (status, _) = send(&app, with_token(post_json("/teacher/logout", json!({})), &token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/alerts", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_privileged_routes_require_token() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/alerts", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send(&app, get("/alerts", Some("0123abcd"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, post_json("/api/exam/reset", json!({"exam_id": "math"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json("/api/students/flag", json!({"student_id": "s1", "exam_id": "math"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_flag_terminate_and_reset() {
    let (app, state) = app().await;
    let token = login(&app).await;

    send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", face_png(1))).await;
    send(&app, post_bytes("/register-face?student_id=s9&exam_id=bio", face_png(3))).await;
    send(
        &app,
        post_json(
            "/detect-audio-anomaly",
            json!({"student_id": "s1", "exam_id": "math", "audio_features": {"volume_level": 0.9}}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        with_token(
            post_json(
                "/api/students/flag",
                json!({"student_id": "s1", "exam_id": "math", "reason": "talking"}),
            ),
            &token,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logged"], true);

    let (status, _) = send(
        &app,
        with_token(
            post_json("/api/students/terminate", json!({"student_id": "s1", "exam_id": "math"})),
            &token,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let listed = alerts(&app, &token, "?exam_id=math").await;
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0]["kind"], "termination");
    assert_eq!(listed[1]["kind"], "manual_flag");
    assert_eq!(listed[1]["raw_metrics"]["teacher"], "alice");
    assert_eq!(listed[1]["raw_metrics"]["note"], "talking");
    assert_eq!(alerts(&app, &token, "?limit=1").await.len(), 1);

    let (status, body) = send(&app, with_token(post_json("/api/exam/reset", json!({})), &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_field");

    let (status, body) = send(
        &app,
        with_token(post_json("/api/exam/reset", json!({"exam_id": "math"})), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alerts_deleted"], 3);
    assert_eq!(body["faces_removed"], 1);
    assert_eq!(body["audio_events_cleared"], 1);

    assert!(alerts(&app, &token, "?exam_id=math").await.is_empty());
    assert_eq!(state.faces.store().registered(), vec!["s9".to_string()]);
    assert!(state.audio_events.is_empty());

    // Labels are never reissued
    let (_, body) = send(&app, post_bytes("/register-face?student_id=s1&exam_id=math", face_png(1))).await;
    assert_eq!(body["label"], 2);
}

#[tokio::test]
async fn test_rate_limit_config_builds_router() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig::default();
    let state = Arc::new(AppState::build(config).await.unwrap());
    let app = create_router(state);
    // Routes outside the governed group need no peer address
    let (status, _) = send(&app, get("/api/v1/health", None)).await;
    assert_eq!(status, StatusCode::OK);
}
