//! Periodic cleanup of abandoned checkouts
//!
//! Deletes bookings still `pending` after `STALE_BOOKING_HOURS`, once at start
//! and then every `SWEEP_INTERVAL_SECS`. Pass `--once` to sweep a single time
//! and exit.

use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use travel_graph::config::Config;
use travel_graph::notify::TracingNotifier;
use travel_graph::service::BookingService;
use travel_graph::sweeper::Sweeper;
use travel_graph::types::TimeStamp;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,travel_graph=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path,
        stale_hours = config.stale_booking_hours,
        interval_secs = config.sweep_interval_secs,
        "configuration loaded"
    );

    let db = Arc::new(sled::open(&config.db_path)?);
    // the sweeper never verifies payments
    let reject_all = |_: &str, _: &str, _: &str| false;
    let service = Arc::new(BookingService::new(
        db,
        Arc::new(TracingNotifier),
        Arc::new(reject_all),
        &config,
    )?);

    if std::env::args().any(|a| a == "--once") {
        let deleted = service.sweep_stale_pending(&TimeStamp::new())?;
        service.flush()?;
        tracing::info!(deleted, "single sweep finished");
        return Ok(());
    }

    let handle = Sweeper::spawn(service, config.sweep_interval())?;
    handle.wait();
    Ok(())
}
