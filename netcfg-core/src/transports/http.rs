use crate::config::HttpConfig;
use crate::credentials::{CredentialIntake, ProvisioningCredentials, SecurityType};
use crate::traits::{ProvisioningTransport, STATUS_BYTE_FAILURE, STATUS_BYTE_SUCCESS};
use crate::{Error, Result};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub type WebServerState = State<Arc<AppState>>;

/// Per-session state shared by the route handlers.
pub struct AppState {
    intake: CredentialIntake,
    last_status: Arc<Mutex<Option<u8>>>,
    greeted: AtomicBool,
}

impl AppState {
    /// 第一次请求即视为手机已连上配网通道
    fn greet(&self) {
        if self.greeted.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.intake.device_connected() {
            tracing::warn!(error = %e, "Failed to report connected device");
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/credentials", post(api_credentials))
        // 兼容旧版前端
        .route("/api/connect", post(api_credentials))
        .route("/api/status", get(api_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    ssid: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    security: Option<SecurityType>,
    #[serde(default)]
    hidden: bool,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status_byte: Option<u8>,
    result: &'static str,
}

fn error_response(code: StatusCode, message: String) -> Response {
    (code, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn api_credentials(
    State(state): WebServerState,
    Json(payload): Json<CredentialsRequest>,
) -> Response {
    state.greet();
    let security = payload
        .security
        .unwrap_or_else(|| SecurityType::infer(&payload.password));
    let credentials = match ProvisioningCredentials::new(
        payload.ssid,
        payload.password,
        security,
        payload.hidden,
    ) {
        Ok(credentials) => credentials,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    // 新一轮尝试，清掉上次的结果
    state
        .last_status
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();

    match state.intake.submit(credentials) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "accepted" })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn api_status(State(state): WebServerState) -> Json<StatusResponse> {
    state.greet();
    let status_byte = *state.last_status.lock().unwrap_or_else(|e| e.into_inner());
    let result = match status_byte {
        None => "pending",
        Some(STATUS_BYTE_SUCCESS) => "success",
        Some(STATUS_BYTE_FAILURE) => "failure",
        Some(_) => "unknown",
    };
    Json(StatusResponse {
        status_byte,
        result,
    })
}

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<Result<()>>,
}

/// Provisioning over plain HTTP/JSON.
///
/// The phone posts the credential set and polls `/api/status` for the
/// single-byte result.
pub struct HttpTransport {
    config: HttpConfig,
    last_status: Arc<Mutex<Option<u8>>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            last_status: Arc::default(),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Address actually bound, useful when configured with port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    pub fn last_status_byte(&self) -> Option<u8> {
        *self.last_status.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn start(&self, intake: CredentialIntake) -> Result<()> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            tracing::debug!("Web server already running, restarting it");
            Self::shutdown(previous).await?;
        }
        self.last_status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let app = router(Arc::new(AppState {
            intake,
            last_status: self.last_status.clone(),
            greeted: AtomicBool::new(false),
        }));
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .map_err(|e| Error::WebServer(e.into()))
        });

        tracing::info!(%local_addr, "Web server listening");
        *running = Some(Running {
            local_addr,
            shutdown,
            server,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        match self.running.lock().await.take() {
            Some(running) => Self::shutdown(running).await,
            None => Ok(()),
        }
    }

    async fn shutdown(running: Running) -> Result<()> {
        let _ = running.shutdown.send(());
        match running.server.await {
            Ok(result) => result,
            Err(e) => Err(Error::Transport(format!("web server task failed: {e}"))),
        }?;
        tracing::info!(addr = %running.local_addr, "Web server stopped");
        Ok(())
    }
}

#[async_trait]
impl ProvisioningTransport for HttpTransport {
    async fn open(&self, intake: CredentialIntake) -> Result<()> {
        self.start(intake).await
    }

    async fn close(&self) -> Result<()> {
        self.stop().await
    }

    async fn send_status_byte(&self, code: u8) -> Result<()> {
        tracing::debug!(code, "Publishing status byte");
        *self.last_status.lock().unwrap_or_else(|e| e.into_inner()) = Some(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::IntakeEvent;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn local_config() -> HttpConfig {
        HttpConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }

    async fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let raw = format!(
            "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        let code = response
            .split_whitespace()
            .nth(1)
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (code, body)
    }

    #[tokio::test]
    async fn posted_credentials_reach_the_intake() {
        let transport = HttpTransport::new(local_config());
        let (intake, mut rx) = CredentialIntake::channel();
        transport.open(intake).await.unwrap();
        let addr = transport.local_addr().await.unwrap();

        let (code, _) = request(
            addr,
            "POST",
            "/api/credentials",
            r#"{"ssid":"HomeNet","password":"secret99","hidden":true}"#,
        )
        .await;
        assert_eq!(code, 202);

        assert!(matches!(rx.recv().await, Some(IntakeEvent::DeviceConnected)));
        match rx.recv().await {
            Some(IntakeEvent::Credentials(c)) => {
                assert_eq!(c.ssid, "HomeNet");
                assert_eq!(c.security, SecurityType::WpaPsk);
                assert!(c.hidden);
            }
            other => panic!("unexpected event {other:?}"),
        }

        transport.close().await.unwrap();
        assert!(transport.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn empty_ssid_is_rejected() {
        let transport = HttpTransport::new(local_config());
        let (intake, mut rx) = CredentialIntake::channel();
        transport.open(intake).await.unwrap();
        let addr = transport.local_addr().await.unwrap();

        let (code, body) = request(addr, "POST", "/api/connect", r#"{"ssid":"","password":""}"#).await;
        assert_eq!(code, 400);
        assert!(body.contains("ssid"));

        assert!(matches!(rx.recv().await, Some(IntakeEvent::DeviceConnected)));
        assert!(rx.try_recv().is_err());
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_endpoint_reports_last_byte() {
        let transport = HttpTransport::new(local_config());
        let (intake, _rx) = CredentialIntake::channel();
        transport.open(intake).await.unwrap();
        let addr = transport.local_addr().await.unwrap();

        let (_, body) = request(addr, "GET", "/api/status", "").await;
        assert!(body.contains("\"pending\""));

        transport.send_status_byte(STATUS_BYTE_FAILURE).await.unwrap();
        let (code, body) = request(addr, "GET", "/api/status", "").await;
        assert_eq!(code, 200);
        assert!(body.contains("\"status_byte\":2"));
        assert!(body.contains("\"failure\""));
        assert_eq!(transport.last_status_byte(), Some(2));

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_without_open_is_fine() {
        let transport = HttpTransport::new(local_config());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }
}
