//! JSON log output for the aggregator binaries.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when it parses. Otherwise the configured level is used,
/// and `info` when that does not parse either.
pub fn filter_for(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.to_ascii_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls keep the first subscriber.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(default_level))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        // Module path lets sync, store and client lines be filtered apart.
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        init("debug");
        init("warn");
        ::tracing::info!("still logging after double init");
    }

    #[test]
    fn garbage_level_does_not_panic() {
        let _ = filter_for("definitely=not=a=level[");
    }

    #[test]
    fn level_is_case_insensitive() {
        let filter = filter_for("DEBUG");
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(filter.to_string(), "debug");
        }
    }
}
