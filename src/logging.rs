//! Logging setup
//!
//! Posture warnings and install events go through `tracing`. This module
//! installs the subscriber that prints them:
//!
//! ```text
//! tracing::warn!/info!/debug! → EnvFilter → fmt layer (plain or JSON) → stderr
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,sandbox_filter=debug";

/// Initialize the global subscriber
///
/// # Arguments
/// * `json` - emit one JSON object per event instead of plain text
///
/// # Example
/// ```ignore
/// init_logging(false)?;
/// ```
pub fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    tracing::debug!(json, "Logging initialized");

    Ok(())
}
