//! Fare estimate binary
//!
//! Prices a single trip against an in-memory pricing store and prints the
//! estimate as JSON.
//!
//! ```text
//! fare-estimate <pickup_lat> <pickup_lng> <dropoff_lat> <dropoff_lng> [rows.json]
//! ```
//!
//! When a rows file is given its policy rows are loaded into one version,
//! which is then activated. Without it the built-in defaults apply.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ridefare_common::{FareRequest, GeoPoint, NewVersion};
use ridefare_engine::{
    collaborators::{
        StaticGeoResolver, StaticRideTypeCatalog, StaticTelemetry, SymbolCurrencyFormatter,
        UnavailableTelemetry,
    },
    Collaborators, ConfigStore, EngineConfig, InMemoryConfigStore, PolicyRow, RideFare,
    Telemetry,
};

const OPERATOR: &str = "fare-estimate";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting RideFare fare estimate v{}", ridefare_common::VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        bail!("usage: fare-estimate <pickup_lat> <pickup_lng> <dropoff_lat> <dropoff_lng> [rows.json]");
    }
    let coord = |i: usize| -> Result<f64> {
        args[i]
            .parse::<f64>()
            .with_context(|| format!("invalid coordinate {:?}", args[i]))
    };
    let pickup = GeoPoint::new(coord(0)?, coord(1)?);
    let dropoff = GeoPoint::new(coord(2)?, coord(3)?);

    // Load configuration
    let config = EngineConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let store = Arc::new(InMemoryConfigStore::new());
    let telemetry: Arc<dyn Telemetry> = match std::env::var("RIDEFARE_DEMAND_RATIO") {
        Ok(raw) => {
            let ratio: f64 = raw.parse().context("RIDEFARE_DEMAND_RATIO")?;
            Arc::new(StaticTelemetry::new(ratio, 0))
        }
        Err(_) => Arc::new(UnavailableTelemetry),
    };
    let collaborators = Collaborators {
        geo: Arc::new(StaticGeoResolver::new(config.default_currency.clone())),
        formatter: Arc::new(SymbolCurrencyFormatter),
        catalog: Arc::new(StaticRideTypeCatalog::default()),
        telemetry,
    };
    let ridefare = RideFare::new(config, store.clone(), collaborators)?;

    if let Some(path) = args.get(4) {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let rows: Vec<PolicyRow> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

        let version = ridefare
            .versions
            .create(NewVersion::new(path.as_str(), OPERATOR))
            .await?;
        let count = rows.len();
        for row in rows {
            let row = row.with_ids(0, version.id);
            ridefare.versions.add_row(row, OPERATOR).await?;
        }
        ridefare
            .versions
            .activate(version.id, OPERATOR, Some("loaded from file"))
            .await?;
        info!(version_id = version.id, rows = count, "Loaded pricing rows");
    }

    let active = store.active_version(chrono::Utc::now()).await?;
    info!(active = ?active.map(|v| v.version_number), "Pricing version in force");

    let request = FareRequest::new(pickup, dropoff);
    let estimate = ridefare.service.get_estimate(&request).await?;
    println!("{}", serde_json::to_string_pretty(&estimate)?);

    Ok(())
}
