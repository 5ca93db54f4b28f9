//! `tracing` subscriber setup for the relay binary.
//!
//! Both formats write to stderr. `RUST_LOG`, when set, overrides the
//! configured level. Installing twice is harmless; the first subscriber wins.

use tracing_subscriber::EnvFilter;

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a compact, human-readable subscriber.
pub fn init_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Install a JSON-lines subscriber for log shippers.
pub fn init_json_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_ignored() {
        init_subscriber("warn");
        init_json_subscriber("debug");
        tracing::warn!(conn_id = "test", "subscriber still usable");
    }

    #[test]
    fn explicit_level_builds_filter() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(filter_for("skyrelay_server=trace").to_string(), "skyrelay_server=trace");
        }
    }
}
