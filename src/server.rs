//! HTTP interface.
//!
//! - `GET /codes` - every indexed code, sorted
//! - `POST /search` - per-term matches, newest first
//! - `POST /rebuild` - full rebuild, persisted and swapped in
//! - `GET <link prefix>/*` - the indexed PDFs themselves

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::{
    Json,
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::Settings,
    error::{self, Error},
    index::IndexStore,
    ingestion::{self, BuildReport},
    search,
    snapshot::SharedIndex,
};

pub type AppState = Arc<ServerState>;

pub struct ServerState {
    index: SharedIndex,
    store: IndexStore,
    documents: PathBuf,
    settings: Settings,
    rebuilding: AtomicBool,
    cancel: AtomicBool,
}

impl ServerState {
    pub fn new(
        index: SharedIndex,
        store: IndexStore,
        documents: PathBuf,
        settings: Settings,
    ) -> AppState {
        Arc::new(Self {
            index,
            store,
            documents,
            settings,
            rebuilding: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        })
    }

    /// Build from the documents directory, persist, then publish.
    fn rebuild(&self) -> error::Result<BuildReport> {
        let (index, report) = ingestion::build_from_dir(
            &self.documents,
            &self.settings,
            &self.cancel,
        )?;
        self.store.save(&index)?;
        self.index.replace(index);
        Ok(report)
    }
}

/// Clears the rebuild flag when the rebuild ends, however it ends.
struct RebuildGuard(AppState);

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        self.0.rebuilding.store(false, Ordering::Release);
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/codes", get(list_codes))
        .route("/search", post(search_codes))
        .route("/rebuild", post(rebuild));

    let prefix = state.settings.link_prefix.trim_end_matches('/');
    if prefix.starts_with('/') {
        router = router
            .nest_service(prefix, ServeDir::new(state.documents.clone()));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn list_codes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(search::list_codes(&state.index.snapshot()))
}

/// Malformed bodies are treated as a query with no terms.
async fn search_codes(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<search::SearchResults> {
    let terms = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => search::parse_terms(&payload),
        Err(e) => {
            warn!(error = %e, "unreadable search payload");
            Vec::new()
        }
    };
    let results = search::search(&state.index.snapshot(), &terms);
    info!(
        terms = results.len(),
        matches = results.iter().map(|t| t.entries.len()).sum::<usize>(),
        "search"
    );
    Json(results)
}

async fn rebuild(State(state): State<AppState>) -> Response {
    if state.rebuilding.swap(true, Ordering::AcqRel) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a rebuild is already running" })),
        )
            .into_response();
    }

    let guard = RebuildGuard(Arc::clone(&state));
    let outcome = tokio::task::spawn_blocking(move || {
        let guard = guard;
        guard.0.rebuild()
    })
    .await;

    match outcome {
        Ok(Ok(report)) => Json(json!({
            "documents": report.documents,
            "skipped": report.skipped,
            "codes": report.codes,
            "entries": report.entries,
        }))
        .into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "rebuild failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "rebuild task died");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "rebuild task failed" })),
            )
                .into_response()
        }
    }
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    state.cancel.store(true, Ordering::Relaxed);
}

/// Serve `state` on `addr` until Ctrl-C.
pub fn run_server(addr: SocketAddr, state: AppState) -> error::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "listening");
        axum::serve(listener, build_router(Arc::clone(&state)))
            .with_graceful_shutdown(shutdown_signal(state))
            .await?;
        Ok(())
    })
}
