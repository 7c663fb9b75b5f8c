//! # Whisper Notes Backend - Main Application Entry Point
//!
//! Actix-web server exposing:
//! - `GET /ws/transcribe` - the streaming transcription WebSocket
//! - `/api/transcriptions` - CRUD, soft delete/restore, history, one-shot
//!   file transcription
//! - `/api/review` - AI text review
//! - `/api/audio/{file}` - finalized WAV artifacts
//! - `/api/models`, `/api/config`, `/health`, `/api/metrics`
//!
//! ## Application Architecture:
//! - **config**: TOML + environment configuration
//! - **state**: shared state (engine, store, review gateway, metrics)
//! - **stream**: per-connection recording state machine
//! - **audio**: chunk accumulation and WAV artifacts
//! - **transcription**: the process-wide Whisper engine
//! - **persistence**: SQLite store with edit history and soft delete
//! - **websocket**: the session controller actor

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod persistence;
mod review;
mod state;
mod stream;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing_actix_web::TracingLogger;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting whisper-notes-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    // Artifacts directory must exist before the first session finalizes
    std::fs::create_dir_all(&config.storage.audio_dir)?;

    let app_state = AppState::new(config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to initialize application state: {}", e))?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            // Streaming session endpoint
            .route("/ws/transcribe", web::get().to(websocket::transcribe_websocket))
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/transcriptions")
                            // Fixed paths before the {id} matchers
                            .route("/summaries", web::get().to(handlers::list_summaries))
                            .route("/deleted", web::get().to(handlers::list_deleted))
                            .route("/transcribe", web::post().to(handlers::transcribe_file))
                            .route("", web::get().to(handlers::list_transcriptions))
                            .route("", web::post().to(handlers::create_transcription))
                            .route("/{id}", web::get().to(handlers::get_transcription))
                            .route("/{id}", web::patch().to(handlers::update_transcription))
                            .route("/{id}", web::delete().to(handlers::delete_transcription))
                            .route("/{id}/restore", web::post().to(handlers::restore_transcription))
                            .route("/{id}/history", web::get().to(handlers::get_history)),
                    )
                    .route("/review", web::post().to(handlers::review_text))
                    .route("/audio/{filename}", web::get().to(handlers::serve_audio))
                    .route("/models/whisper", web::get().to(handlers::list_whisper_models))
                    .route("/models/whisper/load", web::post().to(handlers::load_whisper_model))
                    .route("/models/whisper/unload", web::post().to(handlers::unload_whisper_model))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/metrics", web::get().to(health::detailed_metrics)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging via tracing; `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_notes_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set the shutdown flag on SIGTERM or SIGINT so in-flight requests can
/// finish before the server stops.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
