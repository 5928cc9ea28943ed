//! Log setup
//!
//! Everything logs through `tracing`. The filter comes from `RELFORGE_LOG`
//! when set, otherwise `relforge=info` (`relforge=warn` with `--quiet`).

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "RELFORGE_LOG";

/// Default filter directive
pub fn default_directive(quiet: bool) -> &'static str {
    if quiet {
        "relforge=warn"
    } else {
        "relforge=info"
    }
}

/// Install the global subscriber writing to stderr. Safe to call twice;
/// only the first call takes effect.
pub fn init(quiet: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default_directive(quiet).into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "relforge=info");
        assert_eq!(default_directive(true), "relforge=warn");
    }

    #[test]
    fn test_init_twice() {
        init(true);
        init(false);
    }
}
