use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Initialize the stderr logger with a timestamped format
pub fn init_logger(level: LevelFilter) {
    Builder::new()
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .init();
}

/// Get log level from string
pub fn get_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Effective level once `--quiet` / `--verbose` are applied; quiet wins
pub fn effective_level(requested: &str, quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug.max(get_log_level(requested))
    } else {
        get_log_level(requested)
    }
}
