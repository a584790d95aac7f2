//! HTTP trigger surface: shared-secret auth, run responses, and probes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use alpharank_batch::config::BatchConfig;
use alpharank_batch::constants::JobType;
use alpharank_batch::web::{build_router, AppState};

use common::Harness;

const SECRET: &str = "test-scheduler-secret";

fn app(harness: &Harness) -> axum::Router {
    let mut config = BatchConfig::default();
    config.auth.scheduler_secret = SECRET.to_string();
    build_router(AppState::new(harness.executor.clone(), Arc::new(config)))
}

fn run_request(job: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/jobs/{job}/run"));
    if let Some(secret) = auth {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {secret}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_run_rejected_without_secret() {
    let harness = Harness::report_generation(Duration::ZERO);
    let response = app(&harness)
        .oneshot(run_request("report_generation", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_run_rejected_with_wrong_secret() {
    let harness = Harness::report_generation(Duration::ZERO);
    let response = app(&harness)
        .oneshot(run_request("report_generation", Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_run_accepts_dedicated_secret_header() {
    let harness = Harness::report_generation(Duration::ZERO);
    let request = Request::builder()
        .method("POST")
        .uri("/jobs/report_generation/run")
        .header("x-scheduler-secret", SECRET)
        .body(Body::empty())
        .unwrap();
    let response = app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_run_reports_batch_summary() {
    let harness = Harness::report_generation(Duration::ZERO);
    harness.seed_item(JobType::ReportGeneration, "AAPL", 10);

    let response = app(&harness)
        .oneshot(run_request("report_generation", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["finalized"], 1);
    assert_eq!(body["has_more"], false);
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn test_unknown_job_type_is_bad_request() {
    let harness = Harness::report_generation(Duration::ZERO);
    let response = app(&harness)
        .oneshot(run_request("nonsense", Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_is_unauthenticated() {
    let harness = Harness::report_generation(Duration::ZERO);
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reset_requeues_failed_items() {
    let harness = Harness::report_generation(Duration::ZERO);
    harness.seed_item(JobType::ReportGeneration, "AAPL", 10);
    harness.steps.fail(
        "AAPL",
        alpharank_batch::constants::steps::RESEARCH,
        common::FailureMode::Permanent,
    );
    let app = app(&harness);

    let run = app
        .clone()
        .oneshot(run_request("report_generation", Some(SECRET)))
        .await
        .unwrap();
    // Partial failure still answers 200; the body carries the error.
    assert_eq!(run.status(), StatusCode::OK);
    let body = json_body(run).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);

    let reset = Request::builder()
        .method("POST")
        .uri("/jobs/report_generation/reset")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(reset).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["reset"], 1);
}
