//! Locator server
//!
//! Serves `UpdateLocation`, `FindNearestDriver`, and `RegisterUserLogin` as newline-delimited
//! JSON over TCP, backed by the in-memory location store and user directory.
//!
//! ```bash
//! locator_server --listen 0.0.0.0:9999 --search-radius-m 50000
//! printf '%s\n' '{"method":"FindNearestDriver","source_longitude":13.4,"source_latitude":52.5}' \
//!   | nc localhost 9999
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use locator_core::config::{
    DEFAULT_GRID_DISK_CACHE_CAPACITY, DEFAULT_H3_RESOLUTION, DEFAULT_SEARCH_RADIUS_M,
};
use locator_core::{
    InMemoryLocationStore, InMemoryUserDirectory, Locator, LocatorConfig, ProfileMissPolicy,
    UpdateOrdering,
};
use locator_service::logging::init_tracing;
use locator_service::{LocatorServer, LocatorService};
use tracing::info;

/// Nearest-driver locator server
#[derive(Parser, Debug)]
#[command(name = "locator_server")]
#[command(about = "Newline-delimited JSON server for nearest-driver lookups")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:9999", env = "LOCATOR_LISTEN")]
    listen: String,

    /// Per-request deadline in milliseconds
    #[arg(long, default_value_t = 2_000, env = "LOCATOR_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: u64,

    /// Default search radius in metres
    #[arg(long, default_value_t = DEFAULT_SEARCH_RADIUS_M, env = "LOCATOR_SEARCH_RADIUS_M")]
    search_radius_m: f64,

    /// H3 resolution of the spatial index (0-15)
    #[arg(long, default_value_t = DEFAULT_H3_RESOLUTION, env = "LOCATOR_H3_RESOLUTION")]
    h3_resolution: u8,

    /// Fall through to the next-nearest registered driver when the winner has no profile
    #[arg(long, env = "LOCATOR_SKIP_UNREGISTERED")]
    skip_unregistered: bool,

    /// Ranked candidates considered with --skip-unregistered
    #[arg(long, default_value_t = 8, env = "LOCATOR_CANDIDATE_POOL")]
    candidate_pool: usize,

    /// Ignore updates older than the stored timestamp
    #[arg(long, env = "LOCATOR_REJECT_STALE")]
    reject_stale: bool,

    /// Hide locations older than this from queries
    #[arg(long, env = "LOCATOR_MAX_LOCATION_AGE_MS")]
    max_location_age_ms: Option<u64>,

    /// Grid disks kept in the LRU cache
    #[arg(
        long,
        default_value_t = DEFAULT_GRID_DISK_CACHE_CAPACITY,
        env = "LOCATOR_GRID_DISK_CACHE"
    )]
    grid_disk_cache_capacity: usize,
}

impl Args {
    fn locator_config(&self) -> LocatorConfig {
        let mut config = LocatorConfig::default()
            .with_search_radius_m(self.search_radius_m)
            .with_h3_resolution(self.h3_resolution)
            .with_grid_disk_cache_capacity(self.grid_disk_cache_capacity);
        if self.skip_unregistered {
            config = config
                .with_profile_miss_policy(ProfileMissPolicy::SkipUnregistered)
                .with_candidate_pool(self.candidate_pool);
        }
        if self.reject_stale {
            config = config.with_update_ordering(UpdateOrdering::RejectStale);
        }
        if let Some(max_age_ms) = self.max_location_age_ms {
            config = config.with_max_location_age_ms(max_age_ms);
        }
        config
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler the server runs until killed.
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let config = args.locator_config();
    config.validate().context("invalid locator configuration")?;
    let store = Arc::new(InMemoryLocationStore::new(&config)?);
    let directory = Arc::new(InMemoryUserDirectory::new());
    let locator = Arc::new(Locator::new(store, directory, config.clone())?);
    let service = Arc::new(LocatorService::new(
        locator,
        Duration::from_millis(args.request_timeout_ms),
    ));

    info!(
        component = "server",
        listen = %args.listen,
        search_radius_m = config.search_radius_m,
        h3_resolution = config.h3_resolution,
        request_timeout_ms = args.request_timeout_ms,
        profile_miss_policy = ?config.profile_miss_policy,
        update_ordering = ?config.update_ordering,
        "locator_server_starting"
    );

    let server = LocatorServer::bind(&args.listen, service).await?;
    server.serve_until(shutdown_signal()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_configuration() {
        let args = Args::try_parse_from(["locator_server"]).expect("defaults parse");
        assert_eq!(args.listen, "0.0.0.0:9999");
        assert_eq!(args.request_timeout_ms, 2_000);
        assert_eq!(args.locator_config(), LocatorConfig::default());
    }

    #[test]
    fn flags_map_onto_locator_config() {
        let args = Args::try_parse_from([
            "locator_server",
            "--search-radius-m",
            "10000",
            "--skip-unregistered",
            "--candidate-pool",
            "4",
            "--reject-stale",
            "--max-location-age-ms",
            "60000",
        ])
        .expect("flags parse");

        let config = args.locator_config();
        assert_eq!(config.search_radius_m, 10_000.0);
        assert_eq!(config.profile_miss_policy, ProfileMissPolicy::SkipUnregistered);
        assert_eq!(config.candidate_pool, 4);
        assert_eq!(config.update_ordering, UpdateOrdering::RejectStale);
        assert_eq!(config.max_location_age_ms, Some(60_000));
    }
}
