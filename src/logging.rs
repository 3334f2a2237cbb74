//! Diagnostic output setup.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Pick the default level from the CLI flags. `debug` wins over `verbose`.
pub fn level_for(verbose: bool, debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

/// Install the global subscriber writing to stderr.
///
/// `RUST_LOG` directives take precedence over `level`. In daemon mode
/// timestamps are left out since the supervisor adds its own.
pub fn init(level: Level, daemon: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if daemon {
        builder.without_time().init();
    } else {
        builder.init();
    }
}
