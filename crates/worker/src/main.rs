//! `runbridge-worker` -- serverless adapter in front of a local ComfyUI.
//!
//! Waits for ComfyUI to come up, then either runs a single job from
//! `TEST_INPUT` and prints the response, or serves `POST /runsync` for
//! the invocation runtime. See [`WorkerConfig::from_env`] for the
//! environment variables.

use std::net::SocketAddr;
use std::sync::Arc;

use runbridge_comfyui::api::ComfyUIApi;
use runbridge_comfyui::readiness::{wait_until_ready, ReadinessConfig};
use runbridge_core::config::WorkerConfig;
use runbridge_worker::handler::handle;
use runbridge_worker::pipeline::JobPipeline;
use runbridge_worker::server::{self, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "runbridge_worker=info,runbridge_comfyui=info,runbridge_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        engine_url = %config.engine_url,
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        "Starting runbridge worker",
    );

    let cancel = CancellationToken::new();
    let api = ComfyUIApi::new(config.engine_url.clone());

    let readiness = ReadinessConfig::fixed(config.startup_timeout, config.readiness_interval);
    if !wait_until_ready(&api, &readiness, &cancel).await {
        tracing::error!("FATAL: ComfyUI did not start");
        std::process::exit(1);
    }

    let pipeline = Arc::new(JobPipeline::new(Arc::clone(&config), api).with_cancel(cancel.clone()));

    if let Some(path) = config.test_input.clone() {
        std::process::exit(run_test_input(pipeline, &path).await);
    }

    serve(pipeline, &config, cancel).await;
}

/// Run the job stored in `path` once and print the response.
async fn run_test_input(pipeline: Arc<JobPipeline>, path: &std::path::Path) -> i32 {
    tracing::info!(path = %path.display(), "Running test input");

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read test input");
            return 1;
        }
    };
    let event: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Test input is not valid JSON");
            return 1;
        }
    };

    let response = handle(pipeline, event).await;
    match serde_json::to_string_pretty(&response) {
        Ok(body) => {
            println!("{body}");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            1
        }
    }
}

async fn serve(pipeline: Arc<JobPipeline>, config: &WorkerConfig, cancel: CancellationToken) {
    let app = server::router(AppState::new(pipeline));

    let addr = match config.host.parse() {
        Ok(ip) => SocketAddr::new(ip, config.port),
        Err(e) => {
            tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "Serving job invocations");

    let shutdown = async move {
        shutdown_signal().await;
        // Abandon any in-flight poll; the engine keeps running the prompt.
        cancel.cancel();
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
