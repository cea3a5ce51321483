use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::{SweepReport, SweepTrigger};
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub service_name: Arc<str>,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>, service_name: &str) -> Self {
        Self {
            supervisor,
            service_name: Arc::from(service_name),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Liveness {
    pub ok: bool,
    pub service: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    pub check: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub ok: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unhealthy: Option<usize>,
}

pub async fn home(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        ok: true,
        service: state.service_name.to_string(),
        status: "running".into(),
    })
}

/// Manual sweep. Only an explicit `{"check": true}` runs anything; probe
/// failures still answer `ok: true` since they are reported through alerts.
pub async fn debug_check(State(state): State<AppState>, body: Bytes) -> Json<CheckResponse> {
    let requested = serde_json::from_slice::<CheckRequest>(&body)
        .unwrap_or_default()
        .check
        .unwrap_or(false);

    if !requested {
        return Json(CheckResponse {
            ok: false,
            msg: "Missing flag 'check': true".into(),
            checked: None,
            unhealthy: None,
        });
    }

    info!("manual check requested");
    // Detached so a client that hangs up cannot cancel the sweep halfway.
    let supervisor = Arc::clone(&state.supervisor);
    let sweep = tokio::spawn(async move { supervisor.sweep(SweepTrigger::Manual).await });

    match sweep.await {
        Ok(report) => Json(CheckResponse {
            ok: true,
            msg: "Manual check executed".into(),
            checked: Some(report.results.len()),
            unhealthy: Some(report.unhealthy_count()),
        }),
        Err(e) => {
            error!(error = %e, "manual sweep task failed");
            Json(CheckResponse {
                ok: false,
                msg: "Manual check failed".into(),
                checked: None,
                unhealthy: None,
            })
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub sweeps_completed: u64,
    pub last_report: Option<SweepReport>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        sweeps_completed: state.supervisor.sweeps_completed(),
        last_report: state.supervisor.last_report().await,
    })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/debug/check", post(debug_check))
        .route("/api/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Target;
    use crate::notifier::Notifier;
    use crate::prober::Prober;
    use crate::testutil::{serve, target_router, RecordingTransport};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    async fn app(transport: Arc<RecordingTransport>) -> (Router, Arc<Supervisor>) {
        let addr = serve(target_router()).await;
        let supervisor = Arc::new(Supervisor::new(
            vec![
                Target { name: "up".into(), url: format!("http://{}/ok", addr) },
                Target { name: "down".into(), url: format!("http://{}/down", addr) },
            ],
            Prober::new(Duration::from_secs(2)).unwrap(),
            Notifier::new(transport),
        ));
        let router = create_router(AppState::new(supervisor.clone(), "Sentinel"));
        (router, supervisor)
    }

    async fn get_json(router: Router, uri: &str) -> serde_json::Value {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn post_check(router: Router, body: &'static str) -> serde_json::Value {
        let req = Request::builder()
            .method("POST")
            .uri("/debug/check")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn liveness_identifies_service() {
        let (router, _) = app(Arc::new(RecordingTransport::default())).await;
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Liveness = serde_json::from_slice(&bytes).unwrap();
        assert!(body.ok);
        assert_eq!(body.service, "Sentinel");
        assert_eq!(body.status, "running");
    }

    #[tokio::test]
    async fn check_true_runs_a_sweep() {
        let transport = Arc::new(RecordingTransport::default());
        let (router, supervisor) = app(transport.clone()).await;

        let body = post_check(router, r#"{"check": true}"#).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["checked"], 2);
        assert_eq!(body["unhealthy"], 1);
        assert_eq!(supervisor.sweeps_completed(), 1);
        assert_eq!(transport.messages().len(), 1);
    }

    #[tokio::test]
    async fn check_twice_runs_two_sweeps() {
        let transport = Arc::new(RecordingTransport::default());
        let (router, supervisor) = app(transport.clone()).await;

        let first = post_check(router.clone(), r#"{"check": true}"#).await;
        let second = post_check(router, r#"{"check": true}"#).await;
        assert_eq!(first, second);
        assert_eq!(supervisor.sweeps_completed(), 2);
        assert_eq!(transport.messages().len(), 2);
    }

    #[tokio::test]
    async fn check_without_flag_is_rejected() {
        let transport = Arc::new(RecordingTransport::default());
        let (router, supervisor) = app(transport.clone()).await;

        for body in [r#"{"check": false}"#, "{}", r#"{"check": "yes"}"#, "", "not json"] {
            let resp = post_check(router.clone(), body).await;
            assert_eq!(resp["ok"], false, "body {:?}", body);
            assert_eq!(resp["msg"], "Missing flag 'check': true");
            assert!(resp.get("checked").is_none());
        }
        assert_eq!(supervisor.sweeps_completed(), 0);
        assert!(transport.messages().is_empty());
    }

    #[tokio::test]
    async fn status_reports_last_sweep() {
        let (router, _) = app(Arc::new(RecordingTransport::default())).await;

        let status = get_json(router.clone(), "/api/status").await;
        assert_eq!(status["sweeps_completed"], 0);
        assert!(status["last_report"].is_null());

        post_check(router.clone(), r#"{"check": true}"#).await;

        let status = get_json(router, "/api/status").await;
        assert_eq!(status["sweeps_completed"], 1);
        let report: SweepReport = serde_json::from_value(status["last_report"].clone()).unwrap();
        assert_eq!(report.trigger, SweepTrigger::Manual);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[1].target.name, "down");
    }

    #[tokio::test]
    async fn client_hangup_does_not_cancel_manual_sweep() {
        let transport = Arc::new(RecordingTransport::default());
        let addr = serve(target_router()).await;
        let supervisor = Arc::new(Supervisor::new(
            vec![
                Target { name: "down".into(), url: format!("http://{}/down", addr) },
                Target { name: "slow".into(), url: format!("http://{}/slow", addr) },
            ],
            Prober::new(Duration::from_millis(500)).unwrap(),
            Notifier::new(transport.clone()),
        ));
        let api = serve(create_router(AppState::new(supervisor.clone(), "Sentinel"))).await;

        let body = r#"{"check": true}"#;
        let mut stream = TcpStream::connect(api).await.unwrap();
        let request = format!(
            "POST /debug/check HTTP/1.1\r\nhost: {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            api,
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(stream);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(supervisor.sweeps_completed(), 1);
        let report = supervisor.last_report().await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(transport.delivered().len(), 2);
    }
}
