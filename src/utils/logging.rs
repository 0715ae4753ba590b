use tracing::Level;

/// Initialize tracing for the process.
///
/// `default_level` is typically the `log.level` value from
/// [`load_config`](crate::config::load_config); anything that does not parse
/// as a level falls back to `info`.
pub fn init(default_level: &str) {
    let lvl: Level = default_level.parse().unwrap_or(Level::INFO);

    // try_init so tests and embedding applications can call this more than once
    let _ = tracing_subscriber::fmt()
        .with_max_level(lvl)
        .with_target(false)
        .try_init();
}
