use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used. Unknown
/// levels fall back to `info`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(default_level)));

    // try_init: tests call this more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Normalizes a configured level into an `EnvFilter` directive.
pub(crate) fn level_directive(level: &str) -> String {
    let level = level.trim().to_lowercase();
    match level.as_str() {
        "warning" => "warn".to_string(),
        l if LEVELS.contains(&l) => l.to_string(),
        _ => "info".to_string(),
    }
}
