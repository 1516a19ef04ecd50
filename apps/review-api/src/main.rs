//! Review API Server - Backend for AI-assisted text review
//!
//! Provides REST endpoints for:
//! - Submitting text for analysis (normalization, upstream LLM call,
//!   position reconciliation)
//! - Retrieving stored assessments
//!
//! The verification logic lives in the `review-engine` crate; this binary
//! wires it to the Gemini gateway and SQLite storage.

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod auth;
mod error;
mod gateway;
mod handlers;
mod models;
mod state;

use state::AppState;

/// Command-line arguments for the review API server
#[derive(Parser, Debug)]
#[command(name = "review-api")]
#[command(about = "Backend API server for AI-assisted text review")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("review_api={}", log_level).parse()?)
                .add_directive(format!("review_engine={}", log_level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Initialize application state
    info!("Initializing review API...");
    let state = AppState::new().await?;
    let state = Arc::new(state);

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting review API on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the service router around shared state.
fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Review endpoints sit behind the API key; health stays open.
    let review = Router::new()
        .route("/review/analyze", post(handlers::analyze))
        .route("/review/:id", get(handlers::get_assessment))
        .route("/review/", get(handlers::list_assessments))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(review)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
