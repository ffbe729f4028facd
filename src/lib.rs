//! Modbus TCP register poller.
//!
//! Polls coils and holding registers on a remote industrial device,
//! translating PLC documentation addressing (holding registers numbered
//! from 400001, coils from 100001) to the zero-based offsets the wire
//! protocol uses:
//!
//! - [`addressing`] - logical address to wire offset translation
//! - [`config`] - configuration loading (JSON5 format)
//! - [`link`] - lazily connected Modbus TCP device link
//! - [`ops`] - one-shot register and coil read/write operations
//! - [`poller`] - continuous polling with fixed success/retry delays

pub mod addressing;
pub mod config;
pub mod link;
pub mod ops;
pub mod poller;

// Re-export commonly used types at the crate root
pub use config::{ConfigError, LoggingConfig, PollerConfig};
pub use link::{DeviceLink, LinkError, ModbusLink};
pub use poller::{PollSample, Poller, SampleValue};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(())
}
