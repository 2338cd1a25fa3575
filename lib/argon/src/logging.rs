pub use slog::{crit, debug, error, info, o, trace, warn};
pub use slog::{Discard, Drain, Logger};

use sloggers::{Config, LoggerConfig};

/// Builds the root terminal logger used by the daemons and demo drivers.
pub fn init() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("Error parsing logger configuration");

    config.build_logger().expect("Error building logger")
}

/// A logger that throws everything away. Components take this when the
/// caller passes no parent logger.
#[inline]
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

/// Resolves the optional parent logger convention used throughout the
/// stack: scope a child off the parent, or discard.
#[inline]
pub fn child<'a, L: Into<Option<&'a Logger>>>(parent: L) -> Logger {
    match parent.into() {
        Some(log) => log.new(o!()),
        None => discard(),
    }
}
