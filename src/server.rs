use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path as UrlPath, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    results_root: Arc<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunEntry {
    pub name: String,
    pub has_performance_report: bool,
    pub has_hybrid_report: bool,
    pub has_summary: bool,
}

/// Router serving the results tree: JSON listing under `/api`, files everywhere else.
pub fn router(results_root: impl Into<PathBuf>) -> Router {
    let root = results_root.into();
    let state = AppState {
        results_root: Arc::new(root.clone()),
    };

    let api = Router::new()
        .route("/runs", get(get_runs))
        .route("/runs/{run}/summary", get(get_summary))
        .with_state(state);

    let static_svc = ServeDir::new(root).append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
}

pub async fn spawn_server(bind: &str, results_root: impl Into<PathBuf>) -> Result<()> {
    let app = router(results_root);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving reports");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run directories under `root`, newest first.
pub fn list_runs(root: &Path) -> std::io::Result<Vec<RunEntry>> {
    let mut runs = Vec::new();
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let dir = entry.path();
        runs.push(RunEntry {
            has_performance_report: dir.join(crate::runner::PERFORMANCE_REPORT_FILE).is_file(),
            has_hybrid_report: dir.join(crate::runner::HYBRID_REPORT_FILE).is_file(),
            has_summary: dir.join("summary.json").is_file(),
            name,
        });
    }
    runs.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(runs)
}

fn valid_run_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

async fn get_runs(State(app): State<AppState>) -> impl IntoResponse {
    match list_runs(&app.results_root) {
        Ok(runs) => (StatusCode::OK, Json(runs)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to list runs: {e}"),
        )
            .into_response(),
    }
}

async fn get_summary(
    State(app): State<AppState>,
    UrlPath(run): UrlPath<String>,
) -> impl IntoResponse {
    if !valid_run_name(&run) {
        return (StatusCode::BAD_REQUEST, "invalid run name").into_response();
    }
    let path = app.results_root.join(&run).join("summary.json");
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(r) => r,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(v) => (StatusCode::OK, Json(v)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("corrupt summary: {e}"),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_names_reject_traversal() {
        assert!(valid_run_name("run_20240101_000000"));
        assert!(!valid_run_name(".."));
        assert!(!valid_run_name("a/b"));
        assert!(!valid_run_name(""));
    }

    #[test]
    fn lists_run_dirs_newest_first() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("run_20240101_000000")).unwrap();
        std::fs::create_dir(root.path().join("run_20240201_000000")).unwrap();
        std::fs::write(root.path().join("run_20240201_000000/summary.json"), "{}").unwrap();
        std::fs::write(root.path().join("stray.txt"), "x").unwrap();

        let runs = list_runs(root.path()).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, "run_20240201_000000");
        assert!(runs[0].has_summary);
        assert!(!runs[1].has_summary);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let root = tempfile::tempdir().unwrap();
        assert!(list_runs(&root.path().join("nope")).unwrap().is_empty());
    }
}
