//! Structured logging setup for the ring-pipeline binary.
//!
//! - `RUST_LOG` environment filter, default `ring_pipeline=info`
//! - JSON output when `RUST_LOG_FORMAT=json`
//! - Always written to stderr so stdout stays reserved for emitted values

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `verbose` lowers the default level to debug when `RUST_LOG` is unset.
/// Subsequent calls are no-ops.
pub fn init(verbose: bool) {
    let default = if verbose {
        "ring_pipeline=debug"
    } else {
        "ring_pipeline=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let is_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true);

    if is_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
