//! Taxishift server.
//!
//! # API Endpoints
//!
//! - `POST /drivers/:driver_id/shift/{start,pause,continue,stop}` - Shift signals
//! - `GET /drivers/:driver_id/shift` - Shift status
//! - `POST /rides/evaluate` - Score a prospective trip
//! - `GET /drivers/:driver_id/rides` - Whether a ride may start
//! - `POST /drivers/:driver_id/rides` - Start a ride
//! - `GET /drivers/:driver_id/rides/active` - Progress of the open ride
//! - `POST /rides/:ride_id/end` - End a ride
//! - `DELETE /rides/:ride_id` - Soft-delete a ride
//! - `GET /shifts/:shift_id/rides` - Rides of a shift
//! - `POST /drivers/:driver_id/sweep` - Clean up abandoned state (login hook)
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use taxishift::api::{AppState, router};
use taxishift::app::App;
use taxishift::config::CoreConfig;
use taxishift::scoring::scorer_from_config;
use taxishift::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("taxishift=info".parse()?))
        .init();

    let config = CoreConfig::from_env();

    info!(port = config.port, db_url = %config.database_url, "Starting taxishift server");

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let scorer = scorer_from_config(&config.scoring);
    let state = AppState {
        app: App::new(storage, &config, scorer),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Taxishift is listening");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
