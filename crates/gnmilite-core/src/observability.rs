//! Observability: tracing init.
//!
//! Uses [`ObservabilityConfig`](crate::config::ObservabilityConfig) for
//! GNMILITE_QUIET, GNMILITE_LOG_LEVEL and GNMILITE_LOG_JSON. Output goes to
//! stderr; stdout belongs to the stdio transport.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{prelude::*, reload, EnvFilter, Registry};

/// Filter used while debug logging is switched on.
pub const DEBUG_FILTER: &str = "gnmilite=debug";

/// Switches debug logging of a running process.
#[derive(Debug)]
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    base: String,
    debug: AtomicBool,
}

impl LogControl {
    /// Control that only tracks the flag; used when another subscriber owns
    /// the process.
    pub fn detached(base: impl Into<String>) -> Self {
        Self {
            handle: None,
            base: base.into(),
            debug: AtomicBool::new(false),
        }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    /// Filter directives in effect for the given debug state.
    pub fn directives(&self, on: bool) -> &str {
        if on {
            DEBUG_FILTER
        } else {
            &self.base
        }
    }

    pub fn set_debug(&self, on: bool) -> Result<(), String> {
        if let Some(handle) = &self.handle {
            let filter = EnvFilter::try_new(self.directives(on)).map_err(|e| e.to_string())?;
            handle.reload(filter).map_err(|e| e.to_string())?;
        }
        self.debug.store(on, Ordering::SeqCst);
        tracing::info!(debug = on, "log filter switched");
        Ok(())
    }
}

/// Initialize tracing. Call once at process startup; later calls return a
/// detached control. With GNMILITE_QUIET=1 only WARN and above are logged.
pub fn init_tracing() -> LogControl {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "gnmilite=warn".to_string()
    } else {
        cfg.log_level.clone()
    };
    let base = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(level);

    let filter = EnvFilter::try_new(&base).unwrap_or_else(|_| EnvFilter::new("gnmilite=info"));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };

    match installed {
        Ok(()) => LogControl {
            handle: Some(handle),
            base,
            debug: AtomicBool::new(false),
        },
        Err(_) => LogControl::detached(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_control_tracks_flag() {
        let log = LogControl::detached("gnmilite=warn");
        assert!(!log.debug_enabled());
        log.set_debug(true).unwrap();
        assert!(log.debug_enabled());
        assert_eq!(log.directives(true), DEBUG_FILTER);
        log.set_debug(false).unwrap();
        assert_eq!(log.directives(false), "gnmilite=warn");
        assert!(!log.debug_enabled());
    }
}
