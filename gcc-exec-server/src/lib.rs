use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gcc_exec::{
    CellExecutionService, CompileMode, ExecutionRequest, ExecutorConfig, MagicRegistry, Metadata,
    ProcessStats,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid compile mode: {0}")]
    InvalidMode(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Execution error: {0}")]
    ExecutionError(#[from] gcc_exec::Error),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::InvalidMode(_) | ServerError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::ExecutionError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::ServerError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecuteRequest {
    pub cell: String,
    pub mode: Option<String>,
    pub timeout: Option<u64>,
    pub env_vars: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    pub compiler_stdout: String,
    pub compiler_stderr: String,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub signal: Option<i32>,
    pub metadata: Metadata,
    pub process_stats: ProcessStats,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MagicRequest {
    #[serde(default)]
    pub line: String,
    pub cell: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MagicResponse {
    pub output: String,
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<CellExecutionService>,
    magics: Arc<MagicRegistry>,
}

pub fn create_app(config: ExecutorConfig) -> Result<Router, ServerError> {
    let service = CellExecutionService::new(config).map_err(ServerError::ExecutionError)?;

    let state = AppState {
        magics: Arc::new(MagicRegistry::with_defaults(service.clone())),
        service: Arc::new(service),
    };

    let cors = CorsLayer::permissive();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(execute))
        .route("/magic/:name", post(run_magic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(app)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting cell execution server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::ServerError(e.to_string()))?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ServerError> {
    let mode: CompileMode = match payload.mode {
        Some(mode) => mode.parse().map_err(|_| ServerError::InvalidMode(mode))?,
        None => CompileMode::default(),
    };

    let timeout = match payload.timeout {
        Some(0) => {
            return Err(ServerError::InvalidRequest(
                "timeout must be positive".to_string(),
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => state.service.config().timeout(),
    };

    let request = ExecutionRequest {
        cell: payload.cell,
        mode,
        timeout,
        env_vars: payload.env_vars.unwrap_or_default(),
    };

    let result = state.service.execute(request).await.map_err(|e| {
        error!("Execution error: {}", e);
        ServerError::ExecutionError(e)
    })?;

    Ok(Json(ExecuteResponse {
        status: result.status.to_string(),
        stdout: result.stdout,
        stderr: result.stderr,
        compiler_stdout: result.compiler.stdout,
        compiler_stderr: result.compiler.stderr,
        exit_code: result.exit_code,
        signal: result.signal,
        metadata: result.metadata,
        process_stats: result.process_stats,
    }))
}

async fn run_magic(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<MagicRequest>,
) -> Result<Json<MagicResponse>, ServerError> {
    if state.magics.get(&name).is_none() {
        return Err(ServerError::InvalidRequest(format!(
            "unknown magic: {}",
            name
        )));
    }
    let output = state
        .magics
        .run_cell(&name, &payload.line, &payload.cell)
        .await;
    Ok(Json(MagicResponse { output }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use which::which;

    fn gcc_missing() -> bool {
        if which("gcc").is_err() {
            eprintln!("Skipping test: gcc not available");
            return true;
        }
        false
    }

    fn app() -> Router {
        create_app(ExecutorConfig::default()).expect("Failed to create app")
    }

    async fn post_json<T: Serialize>(app: Router, uri: &str, body: &T) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json<T: for<'de> Deserialize<'de>>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = create_app(ExecutorConfig::default().with_max_concurrent_executions(0));
        assert!(matches!(result, Err(ServerError::ExecutionError(_))));
    }

    #[tokio::test]
    async fn test_execute() {
        if gcc_missing() {
            return;
        }

        let request = ExecuteRequest {
            cell: "//| stdin: 5\nint x;\nscanf(\"%d\", &x);".to_string(),
            mode: None,
            timeout: Some(5),
            env_vars: None,
        };

        let response = post_json(app(), "/execute", &request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let result: ExecuteResponse = body_json(response).await;
        assert_eq!(result.status, "success");
        assert_eq!(result.stdout, "5\n");
        assert_eq!(result.metadata.stdin(), Some("5"));
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_execute_compilation_error() {
        if gcc_missing() {
            return;
        }

        let request = ExecuteRequest {
            cell: "int x = ;".to_string(),
            mode: Some("gcc".to_string()),
            timeout: None,
            env_vars: None,
        };

        let response = post_json(app(), "/execute", &request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let result: ExecuteResponse = body_json(response).await;
        assert_eq!(result.status, "compilation_error");
        assert!(!result.compiler_stderr.is_empty());
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_requests() {
        let request = ExecuteRequest {
            cell: "int x;".to_string(),
            mode: Some("clang".to_string()),
            timeout: None,
            env_vars: None,
        };
        let response = post_json(app(), "/execute", &request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = ExecuteRequest {
            cell: "   ".to_string(),
            mode: None,
            timeout: None,
            env_vars: None,
        };
        let response = post_json(app(), "/execute", &request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(
            body["error"],
            "Execution error: Cell contains no code to compile"
        );
    }

    #[tokio::test]
    async fn test_magic_endpoint() {
        if gcc_missing() {
            return;
        }

        let request = MagicRequest {
            line: String::new(),
            cell: "#include <stdio.h>\nint main(){printf(\"hi\");return 0;}".to_string(),
        };
        let response = post_json(app(), "/magic/gcc", &request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let result: MagicResponse = body_json(response).await;
        assert_eq!(result.output, "hi\n");
    }

    #[tokio::test]
    async fn test_unknown_magic() {
        let request = MagicRequest {
            line: String::new(),
            cell: "int x;".to_string(),
        };
        let response = post_json(app(), "/magic/fortran", &request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_served_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app()).await.unwrap();
        });

        let body = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");
    }
}
