//! `tracing` subscriber setup with a runtime-adjustable filter, so
//! `logging/setLevel` can change verbosity without a restart.
//!
//! On the stdio transport stdout is the JSON-RPC wire, so the subscriber is
//! pinned to stderr regardless of transport, keeping diagnostics away from
//! the framed-message stream.

use crate::cli::LogLevel;
use tracing_subscriber::{fmt, reload, EnvFilter};

pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

pub struct LoggingHandle {
    filter_handle: ReloadHandle,
}

impl LoggingHandle {
    /// Updates the active filter to the level named by an MCP
    /// `logging/setLevel` request.
    pub fn set_level(&self, level: LogLevel) -> crate::error::Result<()> {
        let directive = level.as_tracing_level().to_string().to_lowercase();
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::error::Error::internal(format!("invalid log filter: {e}")))?;
        self.filter_handle
            .reload(filter)
            .map_err(crate::error::Error::internal)
    }
}

pub fn init(initial: LogLevel) -> LoggingHandle {
    use tracing_subscriber::prelude::*;

    let directive = initial.as_tracing_level().to_string().to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let (filter_layer, filter_handle) = reload::Layer::new(filter);

    let fmt_layer = fmt::layer().with_writer(std::io::stderr).compact();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    LoggingHandle { filter_handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_level_accepts_known_levels() {
        // Building a throwaway registry here (rather than calling `init`,
        // which installs a process-global subscriber) keeps this test
        // independent of test execution order.
        let filter = EnvFilter::new("info");
        let (_layer, handle) = reload::Layer::<EnvFilter, tracing_subscriber::Registry>::new(filter);
        let logging = LoggingHandle { filter_handle: handle };
        assert!(logging.set_level(LogLevel::Debug).is_ok());
        assert!(logging.set_level(LogLevel::Warning).is_ok());
    }
}
