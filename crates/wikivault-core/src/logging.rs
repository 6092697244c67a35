use tracing_subscriber::EnvFilter;
use wikivault_config::LoggingConfig;

/// Install a global `tracing` subscriber honoring `config` and `RUST_LOG`
/// (when set, `RUST_LOG` wins over `config.level`). Called once, at process
/// startup, by whichever binary embeds `wikivault-core` — library crates in
/// this workspace only ever emit events, never install a subscriber
/// themselves.
///
/// Returns `Err` if a global subscriber is already installed; callers that
/// only ever call this once (the normal case) can ignore the result.
pub fn install_tracing(config: &LoggingConfig) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if config.quiet {
            tracing::Level::WARN
        } else {
            config.level.as_tracing_level()
        };
        EnvFilter::new(level.to_string())
    });

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
}
