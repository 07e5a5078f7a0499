//! Structured logging for ct-core.
//!
//! Two output modes share one event vocabulary:
//! - Human-readable console output for interactive use
//! - JSONL for pipelines and audit capture
//!
//! # Usage
//!
//! ```ignore
//! use ct_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//!
//! let ctx = LogContext::for_current_run().with_stream_id("ct-20260115-143022-a7xq");
//! ct_core::log_event!(ctx, INFO, event_names::ROUND_SELECTED, Stage::Select,
//!     "arm selected", round_id = 3u64, arm = 1u64);
//! ```
//!
//! stdout is reserved for command payloads; all log output goes to stderr.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, LogEvent, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call is a no-op (the global subscriber
/// is already set), which keeps tests that share a process safe.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.filter_directive())
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_ansi(std::io::stderr().is_terminal());

            let registry = tracing_subscriber::registry().with(filter);
            let _ = if config.timestamps {
                registry.with(fmt_layer).try_init()
            } else {
                registry.with(fmt_layer.without_time()).try_init()
            };
        }
        LogFormat::Jsonl => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(JsonlLayer::stderr())
                .try_init();
        }
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Get the host ID for logging.
///
/// Prefers `/etc/machine-id`; falls back to a hash of `HOSTNAME`, then to a
/// random suffix.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 && id.is_ascii() {
            return format!("host-{}", &id[..8]);
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        use sha2::{Digest, Sha256};
        let digest = hex::encode(Sha256::digest(hostname.as_bytes()));
        return format!("host-{}", &digest[..8]);
    }

    format!("host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Emit a tracing event carrying the correlation IDs of a [`LogContext`].
///
/// Usage:
/// ```ignore
/// log_event!(ctx, INFO, event_names::ROUND_SELECTED, Stage::Select, "arm selected");
/// log_event!(ctx, WARN, event_names::OUTCOME_REJECTED, Stage::Observe, "bad reward",
///     round_id = 12u64, reward = 1.5);
/// ```
#[macro_export]
macro_rules! log_event {
    (@emit $lvl:ident, $ctx:expr, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::$lvl!(
            target: $event,
            run_id = %$ctx.run_id,
            stream_id = %$ctx.stream(),
            host_id = %$ctx.host_id,
            stage = %$stage,
            $($key = $val,)*
            message = %$msg
        )
    };
    ($ctx:expr, INFO, $($rest:tt)*) => { $crate::log_event!(@emit info, $ctx, $($rest)*) };
    ($ctx:expr, DEBUG, $($rest:tt)*) => { $crate::log_event!(@emit debug, $ctx, $($rest)*) };
    ($ctx:expr, WARN, $($rest:tt)*) => { $crate::log_event!(@emit warn, $ctx, $($rest)*) };
    ($ctx:expr, ERROR, $($rest:tt)*) => { $crate::log_event!(@emit error, $ctx, $($rest)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert!(id1.starts_with("run-"));
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 16);
        assert!(id1[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_get_host_id() {
        let host_id = get_host_id();
        assert!(host_id.starts_with("host-"));
        assert_eq!(host_id.len(), 13);
    }

    #[test]
    fn test_log_event_macro_compiles_for_all_levels() {
        let ctx = LogContext::new("run-000000000000", "host-00000000");
        crate::log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "start");
        crate::log_event!(ctx, DEBUG, event_names::ROUND_SELECTED, Stage::Select, "sel", round_id = 1u64);
        crate::log_event!(ctx, WARN, event_names::OUTCOME_REJECTED, Stage::Observe, "rej", reward = 1.5);
        crate::log_event!(ctx, ERROR, event_names::POLICY_HALTED, Stage::Update, "halt");
    }
}
