use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::get, routing::put, Json, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

pub mod audit;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod namespace;
pub mod policy;
pub mod service;
pub mod sqlite;
pub mod store;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::config::Config;
use crate::service::FileShare;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::whoami,
        handlers::list_files,
        handlers::upload_many_from_form,
        handlers::upload_file,
        handlers::download_file,
        handlers::delete_file,
        handlers::get_history,
        handlers::purge_history,
        handlers::purge_history_entry,
        handlers::get_accounts,
        handlers::create_account,
        handlers::delete_account,
        handlers::change_password,
    ),
    components(schemas(
        kernel::Account,
        kernel::Role,
        kernel::FileEntry,
        kernel::AuditRecord,
        kernel::Action,
        kernel::ScopeRequest,
        kernel::ErrorKind,
        kernel::Problem,
        kernel::NewAccount,
        kernel::PasswordChange,
        kernel::DeleteResult,
        kernel::PurgeResult,
    )),
    tags(
        (name = "files", description = "Private and shared file areas"),
        (name = "history", description = "Upload, download and delete history"),
        (name = "accounts", description = "Account management")
    )
)]
pub struct ApiDoc;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fshare=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Serves the REST API until a shutdown signal arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let share = FileShare::open(&config)?;
    if let Some(password) = config.admin_password.as_deref() {
        for username in share.bootstrap(password)? {
            tracing::info!("admin {username} created");
        }
    }

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(socket).await?;
    tracing::debug!("listening on {}", listener.local_addr()?);

    let app = create_routes(Arc::new(share), config.max_upload);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn create_routes(share: Arc<FileShare>, upload_limit: usize) -> Router {
    Router::new()
        .route("/api/whoami", get(handlers::whoami))
        .route(
            "/api/files/:scope",
            get(handlers::list_files).post(handlers::upload_many_from_form),
        )
        .route(
            "/api/files/:scope/*file_name",
            get(handlers::download_file)
                .post(handlers::upload_file)
                .delete(handlers::delete_file),
        )
        .route(
            "/api/history",
            get(handlers::get_history).delete(handlers::purge_history),
        )
        .route(
            "/api/history/:index",
            axum::routing::delete(handlers::purge_history_entry),
        )
        .route(
            "/api/accounts",
            get(handlers::get_accounts).post(handlers::create_account),
        )
        .route(
            "/api/accounts/:username",
            axum::routing::delete(handlers::delete_account),
        )
        .route("/api/password", put(handlers::change_password))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(upload_limit))
                .into_inner(),
        )
        .with_state(share)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
