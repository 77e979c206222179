pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::{Config, LoggerConfig};

/// Builds the default terminal logger. Used by binaries; libraries take a
/// parent logger and derive children from it.
pub fn init() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("Malformed logger config");

    config.build_logger().expect("Error building logger")
}

/// Derives a child of the supplied logger, or a discard logger when no parent
/// is given.
pub fn child_or_discard<'a, L: Into<Option<&'a Logger>>>(log: L) -> Logger {
    match log.into() {
        Some(log) => log.new(o!()),
        _ => Logger::root(Discard, o!()),
    }
}
