pub mod config;
pub mod error;
pub mod crypto;
pub mod db;
pub mod models;
pub mod residents;
pub mod medications; // Medication catalog
pub mod orders; // Non-medication orders
pub mod ledger; // Administration ledger
pub mod resolver; // Due-today view
pub mod audit;
pub mod chart; // Monthly eMAR chart
pub mod adl;
pub mod accounts;
pub mod backup;
pub mod core_state;

pub use core_state::CoreState;
pub use error::CareError;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
