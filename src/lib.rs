//! # Aventon
//!
//! Carpool matching around a university hub.
//!
//! Riders queue a trip between the hub and one of a fixed set of stops.
//! Drivers heading to a stop ask which queues to look at, the destination's
//! queue first and then the stops one short detour away.
//!
//!
//!
//! # Layout
//! - [`stops`]: static stop graph and its distance table
//! - [`queue`]: live per-stop request queues
//! - [`lifecycle`]: submit, cancel, status toggles and matches
//! - [`recommend`]: detour ranking for a destination
//! - [`identity`]: best effort rider profile lookups
//! - [`routes`]: HTTP surface
//!
//!
//!
//! # Limits
//! - Queues live in memory only, a restart empties them
//! - Distances are constants, there is no road routing
//!
//!
//!
//! # Environment
//!
//! | variable | default |
//! |---|---|
//! | `CARPOOL_PORT` | `3030` |
//! | `CARPOOL_HUB` | `USB` |
//! | `CARPOOL_EDGES` | reference graph |
//! | `CARPOOL_DIRECTORY` | none |
//! | `CARPOOL_IDENTITY_URL` | none |
//!
//! Logging follows `RUST_LOG`.
//! ```sh
//! RUST_LOG=aventon=debug cargo run
//! ```
use tokio::{net::TcpListener, signal::ctrl_c};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod queue;
pub mod recommend;
pub mod request;
pub mod routes;
pub mod state;
pub mod stops;

use routes::build_router;
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    info!("Server shutting down...");
}

/// resolves on the first interrupt or SIGTERM so `axum::serve` can drain
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("SIGTERM listener unavailable ({e}), only interrupts stop the server");
                return interrupted().await;
            }
        };

        tokio::select! {
            _ = interrupted() => {}
            _ = terminate.recv() => info!("SIGTERM received, draining open requests"),
        }
    }

    #[cfg(not(unix))]
    interrupted().await;
}

async fn interrupted() {
    match ctrl_c().await {
        Ok(()) => info!("Interrupt received, draining open requests"),
        // without a listener the server only stops with its process
        Err(e) => {
            warn!("Interrupt listener unavailable: {e}");
            std::future::pending::<()>().await
        }
    }
}
