//! Router-level integration tests
//!
//! Drive the full stack (API -> service -> store -> worker pool -> engine)
//! against a temporary storage root and a file-backed SQLite store, using
//! `tower::ServiceExt::oneshot` with hand-built multipart bodies.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use statcomp_broker::config::Config;
use statcomp_broker::state::AppState;
use statcomp_broker::{api, db, worker};
use statcomp_engine::context::ExecutionContext;
use statcomp_engine::engine::{AnalysisEngine, AnalysisRequest};
use statcomp_engine::error::EngineError;
use statcomp_engine::report::ResultDocument;
use statcomp_engine::{StatEngine, report};

const BOUNDARY: &str = "statcomp-test-boundary";

struct TestApp {
    state: AppState,
    router: Router,
    _tmp: tempfile::TempDir,
}

async fn setup(adjust: impl FnOnce(&mut Config)) -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut config = Config {
        storage_root: tmp.path().join("storage"),
        database_url: format!("sqlite://{}?mode=rwc", tmp.path().join("jobs.db").display()),
        max_upload_mb: 10,
        job_timeout: Duration::from_secs(30),
        max_concurrent_jobs: 2,
        max_queue_depth: 16,
        worker_poll_interval: Duration::from_millis(100),
        checkpoint_every: 1,
        ..Config::default()
    };
    adjust(&mut config);

    std::fs::create_dir_all(&config.storage_root).expect("storage root");
    let pool = db::create_pool(&config.database_url).await.expect("pool");
    db::run_migrations(&pool).await.expect("migrations");

    let state = AppState::new(pool, config);
    let router = api::create_router(state.clone());
    TestApp {
        state,
        router,
        _tmp: tmp,
    }
}

fn start_workers(app: &TestApp) {
    worker::spawn_workers(app.state.clone(), Arc::new(StatEngine::new()));
}

// =============================================================================
// Request helpers
// =============================================================================

fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
    )
    .into_bytes()
}

fn file_part(name: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(bytes);
    part.extend_from_slice(b"\r\n");
    part
}

fn multipart_body(parts: Vec<Vec<u8>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(&part);
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, json)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).expect("request"),
    )
    .await
}

async fn post(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    )
    .await
}

async fn submit(
    router: &Router,
    job_type: &str,
    config_json: Option<&str>,
    files: Vec<(&str, &str, Vec<u8>)>,
) -> (StatusCode, Value) {
    let mut parts = vec![text_part("job_type", job_type)];
    if let Some(config) = config_json {
        parts.push(text_part("config", config));
    }
    for (field, filename, bytes) in files {
        parts.push(file_part(field, filename, &bytes));
    }
    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request");
    send(router, request).await
}

fn job_id_of(body: &Value) -> String {
    body["job_id"].as_str().expect("job_id in response").to_string()
}

async fn wait_for_status(router: &Router, job_id: &str, wanted: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let (status, body) = get(router, &format!("/jobs/{job_id}")).await;
        assert_eq!(status, StatusCode::OK, "job lookup failed: {body}");
        if body["status"] == wanted {
            return body;
        }
        let current = body["status"].as_str().unwrap_or("").to_string();
        assert!(
            !(current == "Failed" && wanted != "Failed"),
            "job failed unexpectedly: {body}"
        );
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for status {wanted}, last snapshot: {body}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn numeric_csv(rows: usize, offset: u32) -> Vec<u8> {
    let mut out = String::from("duration\n");
    for i in 0..rows {
        out.push_str(&format!("{}\n", offset + (i as u32 % 61)));
    }
    out.into_bytes()
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).expect("zip entry");
        writer.write_all(content).expect("zip write");
    }
    writer.finish().expect("zip finish").into_inner()
}

/// Engine that spins at checkpoints until interrupted; used to exercise the
/// cancellation and timeout paths deterministically.
struct StallingEngine;

impl AnalysisEngine for StallingEngine {
    fn run(
        &self,
        request: &AnalysisRequest,
        ctx: &ExecutionContext,
    ) -> Result<ResultDocument, EngineError> {
        std::fs::create_dir_all(&request.workspace.output_dir)?;
        for index in 0..4000u32 {
            ctx.loop_checkpoint("stall", index, 4000, 0.0, 90.0)?;
            std::thread::sleep(Duration::from_millis(5));
        }
        let document = ResultDocument {
            job_id: request.job_id,
            job_type: request.job_type,
            decision: None,
            metrics: None,
            descriptive: None,
            descriptive_2: None,
            omnibus: None,
            groups: None,
            plots: Vec::new(),
            warnings: Vec::new(),
        };
        report::write_results(&request.workspace.output_dir, &document)?;
        Ok(document)
    }
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[tokio::test]
async fn test_bootstrap_single_end_to_end() {
    let app = setup(|_| {}).await;
    start_workers(&app);

    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        Some(r#"{"alpha": 0.05, "bootstrapIterations": 150, "threshold": 40.0}"#),
        vec![("file1", "data.csv", numeric_csv(1000, 10))],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let job_id = job_id_of(&body);

    let snapshot = wait_for_status(&app.router, &job_id, "Completed").await;
    assert_eq!(snapshot["progress"]["percent"], 100.0);
    assert!(snapshot["started_at"].is_string());
    assert!(snapshot["finished_at"].is_string());

    let (status, results) = get(&app.router, &format!("/jobs/{job_id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["decision"]["alpha"], 0.05);
    let p_value = results["decision"]["pValue"].as_f64().expect("numeric pValue");
    assert!((0.0..=1.0).contains(&p_value));
    assert!(results["metrics"]["p95"].is_number());
    assert!(results["descriptive"]["sampleSize"].is_number());

    let (status, listing) = get(&app.router, &format!("/jobs/{job_id}/artifacts")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = listing["artifacts"]
        .as_array()
        .expect("artifact array")
        .iter()
        .map(|artifact| artifact["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"results.json"), "{names:?}");
    assert!(names.contains(&"file1_cleaned.csv"), "{names:?}");

    let (status, _) = get(&app.router, &format!("/jobs/{job_id}/artifacts/results.json")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_kw_permutation_end_to_end() {
    let app = setup(|_| {}).await;
    start_workers(&app);

    let bundle = build_zip(&[
        ("Control.csv", numeric_csv(80, 10).as_slice()),
        ("Variant.csv", numeric_csv(80, 200).as_slice()),
        ("Treatment.csv", numeric_csv(80, 500).as_slice()),
    ]);
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        Some(r#"{"permutationCount": 150}"#),
        vec![("kw_bundle", "bundle.zip", bundle)],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let job_id = job_id_of(&body);

    let snapshot = wait_for_status(&app.router, &job_id, "Completed").await;
    let groups: Vec<&str> = snapshot["kw_groups"]
        .as_array()
        .expect("kw_groups")
        .iter()
        .map(|group| group.as_str().unwrap())
        .collect();
    assert_eq!(groups, vec!["Control", "Treatment", "Variant"]);

    let (status, results) = get(&app.router, &format!("/jobs/{job_id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(results["omnibus"]["hStatistic"].is_number());
    assert_eq!(results["groups"].as_array().expect("groups").len(), 3);
    let p_value = results["decision"]["pValue"].as_f64().expect("numeric pValue");
    assert!((0.0..=1.0).contains(&p_value));

    let (status, _) = get(
        &app.router,
        &format!("/jobs/{job_id}/artifacts/kw_summary.csv"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_mixed_bundle_rejected_synchronously() {
    let app = setup(|_| {}).await;

    let bundle = build_zip(&[
        ("A/a1.csv", numeric_csv(10, 1).as_slice()),
        ("root.csv", numeric_csv(10, 1).as_slice()),
    ]);
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        None,
        vec![("kw_bundle", "bundle.zip", bundle)],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MIXED_KW_ZIP_LAYOUT");
}

// =============================================================================
// Request-time validation
// =============================================================================

#[tokio::test]
async fn test_submission_validation_errors() {
    let app = setup(|_| {}).await;

    // Missing required upload
    let (status, body) = submit(&app.router, "BootstrapSingle", None, vec![]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_FILE");

    // Malformed config JSON
    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        Some("{not json"),
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CONFIG");

    // Unknown override field
    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        Some(r#"{"alhpa": 0.1}"#),
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CONFIG");

    // Out-of-range override value
    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        Some(r#"{"alpha": 2.0}"#),
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CONFIG");

    // Unknown job type
    let (status, body) = submit(
        &app.router,
        "BOOTSTRAP_SINGLE",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_JOB_TYPE");

    // Non-numeric CSV
    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", b"just,text\nrows,only\n".to_vec())],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CSV");
    assert_eq!(body["error"]["details"]["file"], "file1");

    // Bundle for a non-KW job type
    let bundle = build_zip(&[("A.csv", numeric_csv(10, 1).as_slice())]);
    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![
            ("file1", "data.csv", numeric_csv(10, 1)),
            ("kw_bundle", "bundle.zip", bundle),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FILE");
}

#[tokio::test]
async fn test_bundle_classification_errors() {
    let app = setup(|_| {}).await;

    // Garbage bytes
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        None,
        vec![("kw_bundle", "bundle.zip", b"not a zip".to_vec())],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ZIP");

    // Single group
    let bundle = build_zip(&[("Only.csv", numeric_csv(10, 1).as_slice())]);
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        None,
        vec![("kw_bundle", "bundle.zip", bundle)],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_GROUPS");

    // Only noise entries
    let bundle = build_zip(&[
        ("__MACOSX/x.csv", numeric_csv(5, 1).as_slice()),
        ("notes.txt", b"hi".as_slice()),
    ]);
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        None,
        vec![("kw_bundle", "bundle.zip", bundle)],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "EMPTY_ARCHIVE");

    // Colliding group names
    let bundle = build_zip(&[
        ("Group A/a.csv", numeric_csv(5, 1).as_slice()),
        ("Group_A/b.csv", numeric_csv(5, 1).as_slice()),
        ("Other/c.csv", numeric_csv(5, 1).as_slice()),
    ]);
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        None,
        vec![("kw_bundle", "bundle.zip", bundle)],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "DUPLICATE_GROUP_NAME");

    // Non-numeric member file, scoped to the offender
    let bundle = build_zip(&[
        ("A/bad.csv", b"words,only\n".as_slice()),
        ("B/good.csv", numeric_csv(5, 1).as_slice()),
    ]);
    let (status, body) = submit(
        &app.router,
        "KwPermutation",
        None,
        vec![("kw_bundle", "bundle.zip", bundle)],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_CSV");
    assert_eq!(body["error"]["details"]["file"], "A/bad.csv");
}

#[tokio::test]
async fn test_queue_depth_admission_control() {
    // No workers: submissions stay queued.
    let app = setup(|config| config.max_queue_depth = 1).await;

    let (status, _) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "QUEUE_FULL");
}

// =============================================================================
// Lifecycle: polling, cancellation, timeout
// =============================================================================

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = setup(|_| {}).await;
    let id = Uuid::new_v4();

    for uri in [
        format!("/jobs/{id}"),
        format!("/jobs/{id}/results"),
        format!("/jobs/{id}/artifacts"),
        format!("/jobs/{id}/artifacts/results.json"),
    ] {
        let (status, body) = get(&app.router, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    let (status, body) = post(&app.router, &format!("/jobs/{id}/cancel")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_results_not_ready_before_completion() {
    // No workers, so the job stays queued.
    let app = setup(|_| {}).await;
    let (_, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    let job_id = job_id_of(&body);

    let (status, body) = get(&app.router, &format!("/jobs/{job_id}/results")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "NOT_READY");
}

#[tokio::test]
async fn test_cancel_queued_job() {
    // No workers, so the cancel wins the queue race deterministically.
    let app = setup(|_| {}).await;
    let (_, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    let job_id = job_id_of(&body);
    let storage_dir = app.state.config.storage_root.join(&job_id);
    assert!(storage_dir.exists());

    let (status, body) = post(&app.router, &format!("/jobs/{job_id}/cancel")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "Cancelled");
    assert!(!storage_dir.exists(), "working storage must be removed");

    // Terminal jobs reject further cancellation.
    let (status, body) = post(&app.router, &format!("/jobs/{job_id}/cancel")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    // And the record did not change.
    let (_, body) = get(&app.router, &format!("/jobs/{job_id}")).await;
    assert_eq!(body["status"], "Cancelled");
}

#[tokio::test]
async fn test_cancel_running_job_converges() {
    let app = setup(|_| {}).await;
    worker::spawn_workers(app.state.clone(), Arc::new(StallingEngine));

    let (_, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    let job_id = job_id_of(&body);

    wait_for_status(&app.router, &job_id, "Running").await;

    let (status, body) = post(&app.router, &format!("/jobs/{job_id}/cancel")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["cancel_requested"], true);

    let snapshot = wait_for_status(&app.router, &job_id, "Cancelled").await;
    assert!(snapshot["finished_at"].is_string());

    let storage_dir = app.state.config.storage_root.join(&job_id);
    assert!(!storage_dir.exists(), "working storage must be removed");
}

#[tokio::test]
async fn test_timeout_fails_the_job() {
    let app = setup(|config| config.job_timeout = Duration::from_millis(300)).await;
    worker::spawn_workers(app.state.clone(), Arc::new(StallingEngine));

    let (_, body) = submit(
        &app.router,
        "BootstrapSingle",
        None,
        vec![("file1", "data.csv", numeric_csv(10, 1))],
    )
    .await;
    let job_id = job_id_of(&body);

    let snapshot = wait_for_status(&app.router, &job_id, "Failed").await;
    assert_eq!(snapshot["error"]["code"], "TIMEOUT");

    let storage_dir = app.state.config.storage_root.join(&job_id);
    assert!(!storage_dir.exists(), "working storage must be removed");
}

// =============================================================================
// Artifacts and ancillary routes
// =============================================================================

#[tokio::test]
async fn test_artifact_download_is_traversal_safe() {
    let app = setup(|_| {}).await;
    start_workers(&app);

    let (_, body) = submit(
        &app.router,
        "BootstrapSingle",
        Some(r#"{"bootstrapIterations": 50}"#),
        vec![("file1", "data.csv", numeric_csv(50, 1))],
    )
    .await;
    let job_id = job_id_of(&body);
    wait_for_status(&app.router, &job_id, "Completed").await;

    let (status, body) = get(
        &app.router,
        &format!("/jobs/{job_id}/artifacts/..%2Finput%2Fconfig.json"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, _) = get(&app.router, &format!("/jobs/{job_id}/artifacts/missing.csv")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_defaults_route() {
    let app = setup(|_| {}).await;
    let (status, body) = get(&app.router, "/config/defaults").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alpha"], 0.05);
    assert_eq!(body["bootstrapIterations"], 1000);
    assert_eq!(body["descriptiveEnabled"], true);
}

#[tokio::test]
async fn test_health_route() {
    let app = setup(|_| {}).await;
    let (status, _) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
}
