use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "VOUCH_LOG";

/// Installs the global fmt subscriber writing to stderr.
///
/// `filter` falls back to `VOUCH_LOG`, then `info`. Returns false when a
/// subscriber was already installed, so test harnesses may call this freely.
pub fn init_logging(filter: Option<&str>, json: bool) -> bool {
    let directive = filter
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_logging(Some("not a ==valid filter"), false);
        assert!(!init_logging(Some("debug"), true));
    }
}
