//! Purpose: Opt-in `tracing` output for a plugin running inside the dnf5 process.
//! Exports: `ENV_LOG_FILTER`, `init_from_env`.
//! Role: Installs a stderr subscriber once, only when the user asks for it.
//! Invariants: Without `PREZ_PKGLOG_LOG`, no subscriber is installed and stderr stays untouched.
//! Invariants: Never replaces a subscriber the host process already installed.
use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FILTER: &str = "PREZ_PKGLOG_LOG";

static INIT: Once = Once::new();

pub fn init_from_env() {
    INIT.call_once(|| {
        let Some(env_filter) = filter_from(std::env::var(ENV_LOG_FILTER).ok()) else {
            return;
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn filter_from(directive: Option<String>) -> Option<EnvFilter> {
    let directive = directive?;
    let directive = directive.trim();
    if directive.is_empty() {
        return None;
    }
    Some(EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")))
}

#[cfg(test)]
mod tests {
    use super::filter_from;

    #[test]
    fn unset_or_blank_disables_output() {
        assert!(filter_from(None).is_none());
        assert!(filter_from(Some("  ".to_string())).is_none());
    }

    #[test]
    fn directive_builds_filter() {
        let filter = filter_from(Some("prez_pkglog=debug".to_string())).expect("filter");
        assert!(filter.to_string().contains("prez_pkglog=debug"));
    }
}
